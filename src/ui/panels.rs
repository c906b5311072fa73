use std::path::PathBuf;

use eframe::egui::{self, Color32, RichText, Ui};
use egui_extras::{Column, TableBuilder};

use crate::color::LabelColors;
use crate::data::filter::{category_name, kept_count};
use crate::data::session::Session;
use crate::preview::render_slice;
use crate::state::{AppState, Status};

// ---------------------------------------------------------------------------
// Left side panel – categories
// ---------------------------------------------------------------------------

/// Render the category list, the selection controls and the mask info box.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Categories");
    ui.separator();

    if state.session.is_none() {
        ui.label(if state.is_loading() {
            "Loading…"
        } else {
            "No file loaded."
        });
        return;
    }

    ui.horizontal(|ui: &mut Ui| {
        if ui.small_button("All").clicked() {
            state.select_all();
        }
        if ui.small_button("None").clicked() {
            state.select_none();
        }
    });

    // Toggles are collected and applied once the table is drawn.
    let mut toggled = Vec::new();
    if let Some(session) = &state.session {
        category_table(ui, session, &mut toggled);
    }

    for id in toggled {
        state.toggle_category(id);
    }

    ui.separator();
    ui.horizontal(|ui: &mut Ui| {
        if ui.button("Apply").clicked() {
            state.apply_selection();
        }
        if ui.button("Reset").clicked() {
            state.reset_selection();
        }
    });
    if let Some(session) = &state.session {
        if session.has_pending_changes() {
            ui.label(RichText::new("Selection not applied yet").color(Color32::YELLOW));
        }
    }

    let slices = state.slice_count();
    if slices > 1 {
        ui.separator();
        let mut slice = state.slice;
        ui.add(egui::Slider::new(&mut slice, 0..=slices - 1).text("Slice"));
        state.set_slice(slice);
    }

    ui.separator();
    mask_info(ui, state);
}

fn category_table(ui: &mut Ui, session: &Session, toggled: &mut Vec<i64>) {
    let colors = LabelColors::new(&session.categories);

    TableBuilder::new(ui)
        .striped(true)
        .max_scroll_height(360.0)
        .column(Column::auto())
        .column(Column::remainder())
        .column(Column::auto())
        .header(20.0, |mut header| {
            header.col(|ui| {
                ui.strong("Keep");
            });
            header.col(|ui| {
                ui.strong("Category");
            });
            header.col(|ui| {
                ui.strong("Pixels");
            });
        })
        .body(|mut body| {
            for &id in &session.categories {
                body.row(20.0, |mut row| {
                    row.col(|ui| {
                        let mut checked = session.is_kept(id);
                        if ui.checkbox(&mut checked, "").changed() {
                            toggled.push(id);
                        }
                    });
                    row.col(|ui| {
                        let text = format!("ID {id}: {}", category_name(id));
                        ui.label(RichText::new(text).color(colors.color_for(id)));
                    });
                    row.col(|ui| {
                        let n = session.counts.get(&id).copied().unwrap_or(0);
                        ui.label(n.to_string());
                    });
                });
            }
        });
}

fn mask_info(ui: &mut Ui, state: &AppState) {
    let Some(session) = &state.session else {
        return;
    };
    let file = session
        .path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy();
    let shape = session
        .original
        .shape()
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(" × ");

    egui::Grid::new("mask_info").num_columns(2).show(ui, |ui: &mut Ui| {
        ui.label("File");
        ui.label(file.to_string());
        ui.end_row();
        ui.label("Source");
        ui.label(session.source.to_string());
        ui.end_row();
        ui.label("Shape");
        ui.label(shape);
        ui.end_row();
        ui.label("Class");
        ui.label(session.original.class.name());
        ui.end_row();
        ui.label("Categories");
        ui.label(format!(
            "{} ({} kept)",
            session.categories.len(),
            kept_count(&session.keep)
        ));
        ui.end_row();
    });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu and the status line.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui
                .add_enabled(!state.is_loading(), egui::Button::new("Open…"))
                .clicked()
            {
                ui.close_menu();
                open_file_dialog(ui.ctx(), state);
            }
            let has_session = state.session.is_some();
            if ui
                .add_enabled(has_session, egui::Button::new("Save edited copy…"))
                .clicked()
            {
                ui.close_menu();
                save_with_confirmation(state);
            }
            if ui
                .add_enabled(has_session, egui::Button::new("Export preview PNG…"))
                .clicked()
            {
                ui.close_menu();
                export_preview_dialog(state);
            }
        });

        ui.separator();

        if let Some(session) = &state.session {
            let name = session.path.file_name().unwrap_or_default().to_string_lossy();
            let marker = if session.is_modified() { " (modified)" } else { "" };
            ui.label(format!("{name}{marker}"));
            ui.separator();
        }

        if state.is_loading() {
            ui.spinner();
        }
        let text = RichText::new(state.status.text());
        ui.label(match state.status {
            Status::Error(_) => text.color(Color32::RED),
            Status::Info(_) => text,
        });
    });
}

// ---------------------------------------------------------------------------
// Dialogs
// ---------------------------------------------------------------------------

pub fn open_file_dialog(ctx: &egui::Context, state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open segmentation mask")
        .add_filter("MAT files", &["mat"])
        .pick_file();

    if let Some(path) = file {
        let ctx = ctx.clone();
        state.start_load(path, move || ctx.request_repaint());
    }
}

/// Pop up a blocking message box for an operation outcome.
pub fn show_alert(alert: &Status) {
    let (level, title) = match alert {
        Status::Error(_) => (rfd::MessageLevel::Error, "Error"),
        Status::Info(_) => (rfd::MessageLevel::Info, "Mask Panda"),
    };
    rfd::MessageDialog::new()
        .set_level(level)
        .set_title(title)
        .set_description(alert.text())
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

fn save_with_confirmation(state: &mut AppState) {
    let Some(out) = state.output_path() else {
        return;
    };
    let name = out.file_name().unwrap_or_default().to_string_lossy().into_owned();

    let mut description = format!("Write the filtered mask to {name}?");
    if out.exists() {
        description.push_str(&format!("\n\n{name} already exists and will be replaced."));
    }
    if state.session.as_ref().is_some_and(|s| s.has_pending_changes()) {
        description.push_str("\n\nThe current selection has not been applied and will not be saved.");
    }

    let answer = rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Info)
        .set_title("Save edited copy")
        .set_description(description)
        .set_buttons(rfd::MessageButtons::YesNo)
        .show();

    if answer == rfd::MessageDialogResult::Yes {
        state.save_to(&out);
    } else {
        log::info!("Save to {} cancelled", out.display());
    }
}

fn export_preview_dialog(state: &mut AppState) {
    let Some(session) = &state.session else {
        return;
    };
    let default_name = format!(
        "{}_preview.png",
        session.path.file_stem().unwrap_or_default().to_string_lossy()
    );
    let mut dialog = rfd::FileDialog::new()
        .set_title("Export preview")
        .set_file_name(default_name)
        .add_filter("PNG", &["png"]);
    if let Some(dir) = session.path.parent() {
        dialog = dialog.set_directory(dir);
    }
    let Some(path): Option<PathBuf> = dialog.save_file() else {
        return;
    };

    let colors = LabelColors::new(&session.categories);
    let image = render_slice(&session.working, state.slice, &colors);
    state.status = match crate::preview::save_png(&image, &path) {
        Ok(()) => Status::Info(format!("Exported preview to {}", path.display())),
        Err(e) => {
            log::error!("Preview export failed: {e:#}");
            Status::Error(format!("Export failed: {e:#}"))
        }
    };
}
