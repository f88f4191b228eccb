use std::{
    path::PathBuf,
    sync::mpsc::{Receiver, Sender},
    time::{Duration, Instant, SystemTime},
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::midi_interface::{
    auto_select_port, list_input_ports, FrameReceiverPayload, InputSelection, PortDescriptor,
};

pub mod decoder;
pub mod export;
pub mod recorder;

use self::{
    decoder::{FrameDecoder, MidiEvent, RawFrame},
    export::ExportError,
    recorder::SessionRecorder,
};

/// Remembered between GUI runs.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct MonitorPreferences {
    pub preferred_port: Option<String>,
}

pub struct MonitorDataModel {
    pub midi_rx: Receiver<FrameReceiverPayload>,
    pub input: InputSelection,
    pub available_ports: Vec<PortDescriptor>,
    pub last_received: Option<SystemTime>,
    pub recorder: SessionRecorder,
    pub export_dir: PathBuf,
    /// Message for the user, e.g. when there is nothing to export
    pub notice: Option<String>,
    pub preferences: MonitorPreferences,
    pub rescan_interval: Duration,
    last_scan: Option<Instant>,
    /// Port that failed to open; not retried until the port list changes
    failed_port: Option<String>,
    decoder: FrameDecoder,
}

impl MonitorDataModel {
    pub fn new(
        midi_tx: Sender<FrameReceiverPayload>,
        midi_rx: Receiver<FrameReceiverPayload>,
        export_dir: PathBuf,
        rescan_interval: Duration,
    ) -> Self {
        MonitorDataModel {
            midi_rx,
            input: InputSelection::new(midi_tx),
            available_ports: Vec::new(),
            last_received: None,
            recorder: SessionRecorder::new(),
            export_dir,
            notice: None,
            preferences: MonitorPreferences::default(),
            rescan_interval,
            last_scan: None,
            failed_port: None,
            decoder: FrameDecoder::new(),
        }
    }

    /// Decodes and records a frame from the given input generation. Frames
    /// from a previous input and frames too short to decode are dropped.
    pub fn handle_incoming_frame(
        &mut self,
        generation: u64,
        frame: &RawFrame,
    ) -> Option<&MidiEvent> {
        if !self.input.accepts(generation) {
            debug!("Dropping frame from a previous input: {:?}", frame.bytes);
            return None;
        }
        let Some(event) = self.decoder.decode(frame) else {
            debug!("Ignoring short frame: {:?}", frame.bytes);
            return None;
        };
        debug!(
            "{} {} ch {} {} {}",
            event.id, event.kind, event.channel, event.note, event.velocity
        );
        self.last_received = Some(SystemTime::now());
        self.recorder.ingest(event);
        self.recorder.latest_event()
    }

    /// Handles every frame currently queued, returning the decoded events.
    pub fn drain_incoming(&mut self) -> Vec<MidiEvent> {
        let mut decoded = Vec::new();
        while let Ok((generation, frame)) = self.midi_rx.try_recv() {
            if let Some(event) = self.handle_incoming_frame(generation, &frame) {
                decoded.push(event.clone());
            }
        }
        decoded
    }

    /// Re-enumerates ports and applies the auto-selection policy.
    pub fn refresh_ports(&mut self) {
        self.last_scan = Some(Instant::now());
        let ports = match list_input_ports() {
            Ok(ports) => ports,
            Err(e) => {
                error!("Failed to list MIDI input ports: {}", e);
                Vec::new()
            }
        };
        self.apply_port_list(ports);
    }

    /// Applies the auto-selection policy to a freshly enumerated port list.
    pub fn apply_port_list(&mut self, ports: Vec<PortDescriptor>) {
        if ports != self.available_ports {
            self.failed_port = None;
        }
        self.available_ports = ports;

        let current = self
            .input
            .active_port()
            .map(|p| p.name.clone())
            .or_else(|| self.preferences.preferred_port.clone());
        match auto_select_port(&self.available_ports, current.as_deref()).cloned() {
            Some(port) => {
                let failed_before = self.failed_port.as_deref() == Some(port.name.as_str());
                if self.input.active_port() != Some(&port) && !failed_before {
                    self.select_port(&port);
                }
            }
            None => {
                if self.input.active_port().is_some() {
                    warn!("No MIDI inputs available any more");
                    self.input.deselect();
                }
            }
        }
    }

    pub fn refresh_ports_if_due(&mut self) {
        let due = match self.last_scan {
            Some(at) => at.elapsed() >= self.rescan_interval,
            None => true,
        };
        if due {
            self.refresh_ports();
        }
    }

    pub fn select_port(&mut self, port: &PortDescriptor) {
        match self.input.select(port) {
            Ok(()) => {
                self.preferences.preferred_port = Some(port.name.clone());
                self.last_received = None;
                self.failed_port = None;
            }
            Err(e) => {
                error!("Failed to open MIDI input \"{}\": {}", port.name, e);
                self.notice = Some(format!("Could not open \"{}\"", port.name));
                self.failed_port = Some(port.name.clone());
            }
        }
    }

    pub fn start_recording(&mut self) {
        self.notice = None;
        self.recorder.start_recording();
    }

    pub fn stop_recording(&mut self) {
        self.recorder.stop_recording();
    }

    /// Exports the current session into the export directory.
    pub fn export_to_disk(&mut self) -> Result<PathBuf, ExportError> {
        let result = self
            .recorder
            .export_session()
            .and_then(|log| log.write_to(&self.export_dir));
        match &result {
            Ok(path) => {
                info!("Exported session to {}", path.display());
                self.notice = Some(format!("Saved {}", path.display()));
            }
            Err(ExportError::NoData) => {
                warn!("Export requested without recorded data");
                self.notice = Some(String::from("No recorded data to export."));
            }
            Err(e) => {
                error!("{}", e);
                self.notice = Some(e.to_string());
            }
        }
        result
    }
}
