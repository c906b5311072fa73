//! Data layer: MAT container model, codec, mask location, filtering and
//! write-back.
//!
//! Architecture:
//! ```text
//!      .mat file
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  matio    │  bytes ⇄ Container (ordered variables, header)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ locator   │  Container → Mask + SourcePath
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  Mask × KeepSet → Mask
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ writeback │  Container × SourcePath × Mask → Container → matio
//!   └──────────┘
//! ```
//! `loader` runs matio + locator on a worker thread; `session` holds one
//! opened file and drives filter and writeback.

pub mod error;
pub mod filter;
pub mod loader;
pub mod locator;
pub mod matio;
pub mod model;
pub mod session;
pub mod writeback;
