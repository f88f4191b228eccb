use std::{
    sync::mpsc,
    time::{Duration, Instant},
};

use clap::Parser;
use eframe::egui;
use env_logger::Env;
use gui::render_gui;
use log::{error, info, warn};
use midi_interface::list_input_ports;
use monitor::{export::ExportError, MonitorDataModel, MonitorPreferences};
use settings::Cli;

mod gui;
mod midi_interface;
mod monitor;
mod settings;

fn list_midi_ports() -> anyhow::Result<()> {
    for port in list_input_ports()? {
        println!("{}: {}", port.index, port.name);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level))
        .filter_module("egui_glow", log::LevelFilter::Warn)
        .filter_module("egui_winit", log::LevelFilter::Warn)
        .filter_module("eframe", log::LevelFilter::Warn)
        .init();

    if cli.list_ports {
        list_midi_ports().expect("failed to list MIDI ports");
        return;
    }

    let (midi_tx, midi_rx) = mpsc::channel();
    let mut model = MonitorDataModel::new(
        midi_tx,
        midi_rx,
        cli.export_dir.clone(),
        Duration::from_secs(cli.rescan_secs),
    );

    if let Some(index) = cli.midi_port {
        match list_input_ports() {
            Ok(ports) => match ports.into_iter().find(|p| p.index == index) {
                Some(port) => model.preferences.preferred_port = Some(port.name),
                None => warn!("No MIDI input port #{}; using the first available", index),
            },
            Err(e) => error!("Failed to list MIDI input ports: {}", e),
        }
    }

    if cli.headless_mode {
        if let Err(e) = run_headless(model, &cli) {
            error!("{:#}", e);
            std::process::exit(1);
        }
    } else {
        info!("Running graphics mode; close the window to quit");
        let use_stored_preferences = cli.midi_port.is_none();
        let options = eframe::NativeOptions::default();
        eframe::run_native(
            "MIDI Monitor",
            options,
            Box::new(move |cc| {
                if use_stored_preferences {
                    if let Some(preferences) = cc
                        .storage
                        .and_then(|s| eframe::get_value::<MonitorPreferences>(s, eframe::APP_KEY))
                    {
                        model.preferences = preferences;
                    }
                }
                model.refresh_ports();
                Box::new(model)
            }),
        )
        .expect("Failed to launch GUI");
        info!("GUI ended; exit now...");
    }
}

fn run_headless(mut model: MonitorDataModel, cli: &Cli) -> anyhow::Result<()> {
    info!("Running in headless mode; Ctrl+C to quit");
    model.refresh_ports();
    if model.input.active_port().is_none() {
        warn!("No MIDI input available yet; waiting for one to appear");
    }
    if cli.record {
        model.start_recording();
    }

    let started = Instant::now();
    let run_for = cli.duration_secs.map(Duration::from_secs);
    loop {
        for event in model.drain_incoming() {
            if cli.json_output {
                println!("{}", serde_json::to_string(&event)?);
            } else {
                info!(
                    "{:>10.0} ms  {:<14}  ch {:02}  {:>3} {:>3}",
                    event.timestamp_ms, event.kind, event.channel, event.note, event.velocity
                );
            }
        }
        model.refresh_ports_if_due();

        if let Some(run_for) = run_for {
            if started.elapsed() >= run_for {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    if model.recorder.session().is_some() {
        model.stop_recording();
        match model.export_to_disk() {
            Ok(path) => println!("{}", path.display()),
            Err(ExportError::NoData) => warn!("Nothing was recorded; no log written"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

impl eframe::App for MonitorDataModel {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // keep polling the MIDI receiver even without user input
        ctx.request_repaint_after(Duration::from_millis(10));

        self.drain_incoming();
        self.refresh_ports_if_due();

        egui::CentralPanel::default().show(ctx, |ui| {
            render_gui(self, ui);
        });
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, &self.preferences);
    }
}
