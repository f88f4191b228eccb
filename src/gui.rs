use std::time::Duration;

use egui::{Color32, RichText};
use log::debug;

use crate::monitor::{decoder::EventKind, recorder::LIVE_LOG_LENGTH, MonitorDataModel};

pub fn render_gui(model: &mut MonitorDataModel, ui: &mut egui::Ui) {
    ui.heading("MIDI Monitor");
    render_input_selector(model, ui);
    ui.separator();

    ui.heading("Recording");
    render_recording_controls(model, ui);
    ui.separator();

    if let Some(latest) = model.recorder.latest_event() {
        if latest.kind.is_note() {
            let color = if latest.kind == EventKind::NoteOn {
                Color32::GREEN
            } else {
                Color32::GRAY
            };
            ui.label(RichText::new(latest.note.to_string()).size(48.0).color(color));
            ui.separator();
        }
    }

    ui.heading(&format!(
        "Last {} (max) messages received",
        LIVE_LOG_LENGTH
    ));
    render_live_log(model, ui);
}

fn render_input_selector(model: &mut MonitorDataModel, ui: &mut egui::Ui) {
    let mut chosen = None;
    ui.horizontal(|ui| {
        ui.label("Input Device:");
        if model.available_ports.is_empty() {
            ui.add_enabled(false, egui::Label::new("No MIDI inputs detected"));
        } else {
            let selected_text = model
                .input
                .active_port()
                .map(|p| p.name.clone())
                .unwrap_or_else(|| String::from("None"));
            egui::ComboBox::from_id_source("midi_input")
                .selected_text(selected_text)
                .show_ui(ui, |ui| {
                    for port in model.available_ports.iter() {
                        let is_active = model.input.active_port() == Some(port);
                        let clicked = ui.selectable_label(is_active, port.name.as_str()).clicked();
                        if clicked && !is_active {
                            chosen = Some(port.clone());
                        }
                    }
                });
        }
        if ui.button("Rescan").clicked() {
            model.refresh_ports();
        }
    });
    if let Some(port) = chosen {
        model.select_port(&port);
    }

    if model.input.active_port().is_some() {
        match model.last_received.map(|t| t.elapsed()) {
            Some(Ok(elapsed)) => {
                let color = if elapsed > Duration::from_secs(5) {
                    Color32::RED
                } else if elapsed > Duration::from_secs(1) {
                    Color32::LIGHT_YELLOW
                } else {
                    Color32::GREEN
                };
                ui.label(
                    RichText::new(format!("last message {:.0}s ago", elapsed.as_secs_f32()))
                        .color(color),
                );
            }
            _ => {
                ui.label("Waiting for MIDI data...");
            }
        }
    }
}

fn render_recording_controls(model: &mut MonitorDataModel, ui: &mut egui::Ui) {
    ui.horizontal(|ui| {
        if model.recorder.is_recording() {
            ui.label(RichText::new("● Recording").color(Color32::RED));
            ui.label(format!("{} events", model.recorder.captured_len()));
            if ui.button("Stop").clicked() {
                model.stop_recording();
            }
        } else {
            if ui.button("Record").clicked() {
                model.start_recording();
            }
            if let Some(session) = model.recorder.session() {
                let exported = if session.is_exported() { " (exported)" } else { "" };
                ui.label(format!(
                    "{} events captured{}",
                    session.captured_events.len(),
                    exported
                ));
            }
            if ui.button("Export log").clicked() {
                // the outcome is shown through the notice
                if let Err(e) = model.export_to_disk() {
                    debug!("Export from GUI failed: {}", e);
                }
            }
        }
    });
    if let Some(notice) = &model.notice {
        ui.label(RichText::new(notice).color(Color32::LIGHT_YELLOW));
    }
}

fn render_live_log(model: &MonitorDataModel, ui: &mut egui::Ui) {
    if model.recorder.live_len() == 0 {
        ui.label("Waiting for MIDI data...");
        return;
    }
    egui::ScrollArea::vertical()
        .auto_shrink([true; 2])
        .show(ui, |ui| {
            egui::Grid::new("live_log").striped(true).show(ui, |ui| {
                ui.strong("Time");
                ui.strong("Type");
                ui.strong("Channel");
                ui.strong("Data / Note");
                ui.strong("Velocity / Value");
                ui.end_row();
                for event in model.recorder.live_events() {
                    ui.monospace(format!("{:.0} ms", event.timestamp_ms));
                    ui.label(event.kind.label());
                    ui.label(event.channel.to_string());
                    ui.label(event.note.to_string());
                    ui.label(event.velocity.to_string());
                    ui.end_row();
                }
            });
        });
}
