use eframe::egui;
use mask_panda::app::MaskPandaApp;
use mask_panda::config::EditorConfig;

fn main() -> eframe::Result {
    env_logger::init();

    let config = EditorConfig::load();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(config.window_size)
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Mask Panda – Segmentation Mask Editor",
        options,
        Box::new(|_cc| Ok(Box::new(MaskPandaApp::new(config)))),
    )
}
