use std::collections::BTreeMap;

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Color mapping: category label → Color32
// ---------------------------------------------------------------------------

/// Maps the categories of a mask to distinct colours. Background (0) is
/// black; labels outside the category set are grey.
#[derive(Debug, Clone)]
pub struct LabelColors {
    mapping: BTreeMap<i64, Color32>,
    background: Color32,
    default_color: Color32,
}

impl LabelColors {
    pub fn new(categories: &[i64]) -> Self {
        let palette = generate_palette(categories.len());
        let mapping = categories.iter().copied().zip(palette).collect();

        LabelColors {
            mapping,
            background: Color32::BLACK,
            default_color: Color32::GRAY,
        }
    }

    pub fn color_for(&self, label: i64) -> Color32 {
        if label == 0 {
            return self.background;
        }
        self.mapping
            .get(&label)
            .copied()
            .unwrap_or(self.default_color)
    }
}
