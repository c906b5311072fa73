use std::path::Path;

use anyhow::{Context, Result};
use eframe::egui::{Color32, ColorImage};
use ndarray::Axis;

use crate::color::LabelColors;
use crate::data::model::Mask;

// ---------------------------------------------------------------------------
// Mask → image
// ---------------------------------------------------------------------------

/// Number of selectable slices: the third dimension of a 3-D mask, else 1.
pub fn slice_count(mask: &Mask) -> usize {
    if mask.ndim() == 3 {
        mask.shape()[2]
    } else {
        1
    }
}

/// Render one plane of the mask (rows × columns) as colours. `slice` picks
/// the plane of a 3-D mask and is clamped to the valid range.
pub fn render_slice(mask: &Mask, slice: usize, colors: &LabelColors) -> ColorImage {
    let plane = if mask.ndim() == 3 {
        let last = slice_count(mask).saturating_sub(1);
        mask.labels.index_axis(Axis(2), slice.min(last))
    } else {
        mask.labels.view()
    };
    let (rows, cols) = (plane.shape()[0], plane.shape()[1]);

    let mut image = ColorImage::new([cols, rows], Color32::BLACK);
    for (pixel, &label) in image.pixels.iter_mut().zip(plane.iter()) {
        *pixel = colors.color_for(label);
    }
    image
}

/// Write a rendered preview to a PNG file.
pub fn save_png(image: &ColorImage, path: &Path) -> Result<()> {
    let [width, height] = image.size;
    let rgba: Vec<u8> = image.pixels.iter().flat_map(|c| c.to_array()).collect();
    let buffer = image::RgbaImage::from_raw(width as u32, height as u32, rgba)
        .context("preview buffer does not match its size")?;
    buffer
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("Exported preview to {}", path.display());
    Ok(())
}
