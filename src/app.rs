use eframe::egui;

use crate::config::EditorConfig;
use crate::state::AppState;
use crate::ui::plot::MaskTextures;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct MaskPandaApp {
    pub state: AppState,
    textures: MaskTextures,
}

impl Default for MaskPandaApp {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl MaskPandaApp {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            state: AppState::new(config),
            textures: MaskTextures::default(),
        }
    }
}

impl eframe::App for MaskPandaApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.state.poll_load();
        if let Some(alert) = self.state.take_alert() {
            panels::show_alert(&alert);
        }

        // ---- Top panel: menu bar and status ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: categories ----
        egui::SidePanel::left("category_panel")
            .default_width(280.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: before / after views ----
        egui::CentralPanel::default().show(ctx, |ui| {
            self.textures.sync(ctx, &self.state);
            plot::mask_views(ui, &self.state, &self.textures);
        });

        // The worker also wakes us, but keep the spinner moving.
        if self.state.is_loading() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}
