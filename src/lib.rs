pub mod app;
pub mod color;
pub mod config;
pub mod data;
pub mod preview;
pub mod state;
pub mod ui;
