use eframe::egui::{self, Context, TextureHandle, TextureOptions, Ui};
use egui_plot::{Plot, PlotImage, PlotPoint};

use crate::color::LabelColors;
use crate::preview::render_slice;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Mask textures
// ---------------------------------------------------------------------------

/// GPU copies of the original and working mask, re-uploaded when
/// `AppState::revision` moves.
#[derive(Default)]
pub struct MaskTextures {
    revision: Option<u64>,
    original: Option<TextureHandle>,
    working: Option<TextureHandle>,
}

impl MaskTextures {
    pub fn sync(&mut self, ctx: &Context, state: &AppState) {
        if self.revision == Some(state.revision) {
            return;
        }
        self.revision = Some(state.revision);

        let Some(session) = &state.session else {
            self.original = None;
            self.working = None;
            return;
        };

        // Colours are keyed on the full category set so both views agree.
        let colors = LabelColors::new(&session.categories);
        let original = render_slice(&session.original, state.slice, &colors);
        let working = render_slice(&session.working, state.slice, &colors);
        upload(ctx, &mut self.original, "mask_original", original);
        upload(ctx, &mut self.working, "mask_working", working);
    }
}

fn upload(ctx: &Context, slot: &mut Option<TextureHandle>, name: &str, image: egui::ColorImage) {
    match slot {
        Some(handle) => handle.set(image, TextureOptions::NEAREST),
        None => *slot = Some(ctx.load_texture(name, image, TextureOptions::NEAREST)),
    }
}

// ---------------------------------------------------------------------------
// Before / after views (central panel)
// ---------------------------------------------------------------------------

pub fn mask_views(ui: &mut Ui, state: &AppState, textures: &MaskTextures) {
    let (Some(_), Some(original), Some(working)) =
        (&state.session, &textures.original, &textures.working)
    else {
        ui.centered_and_justified(|ui: &mut Ui| {
            if state.is_loading() {
                ui.spinner();
            } else {
                ui.heading("Open a MAT file to edit its mask  (File → Open…)");
            }
        });
        return;
    };

    ui.columns(2, |columns| {
        mask_plot(&mut columns[0], "original_view", "Original", original);
        mask_plot(&mut columns[1], "filtered_view", "Filtered", working);
    });
}

fn mask_plot(ui: &mut Ui, id: &str, title: &str, texture: &TextureHandle) {
    ui.vertical_centered(|ui: &mut Ui| ui.strong(title));

    let size = texture.size_vec2();
    let image = PlotImage::new(
        texture.id(),
        PlotPoint::new(size.x as f64 / 2.0, size.y as f64 / 2.0),
        size,
    );

    Plot::new(id)
        .data_aspect(1.0)
        .show_axes(false)
        .show_grid(false)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            plot_ui.image(image);
        });
}
