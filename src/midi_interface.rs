use std::{sync::mpsc::Sender, time::Instant};

use anyhow::anyhow;
use log::{debug, info};
use midir::{Ignore, MidiInput, MidiInputConnection};

use crate::monitor::decoder::RawFrame;

const CLIENT_NAME: &str = "midi-monitor";

/// Generation of the input that produced the frame, and the frame itself
pub type FrameReceiverPayload = (u64, RawFrame);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub index: usize,
    pub name: String,
}

fn new_midi_input() -> anyhow::Result<MidiInput> {
    let mut midi_input = MidiInput::new(CLIENT_NAME)?;
    // SysEx is not decoded, so don't let the driver deliver it
    midi_input.ignore(Ignore::Sysex);
    Ok(midi_input)
}

pub fn list_input_ports() -> anyhow::Result<Vec<PortDescriptor>> {
    let midi_input = new_midi_input()?;
    let mut ports = Vec::new();
    for (index, port) in midi_input.ports().iter().enumerate() {
        ports.push(PortDescriptor {
            index,
            name: midi_input.port_name(port)?,
        });
    }
    Ok(ports)
}

/// Decides which input to listen to after the available ports change: keep
/// the current one if it is still there, otherwise fall back to the first.
pub fn auto_select_port<'a>(
    available: &'a [PortDescriptor],
    current: Option<&str>,
) -> Option<&'a PortDescriptor> {
    if let Some(name) = current {
        if let Some(port) = available.iter().find(|p| p.name == name) {
            return Some(port);
        }
    }
    available.first()
}

/// Tracks which input generation is allowed to deliver frames.
#[derive(Debug, Default)]
pub struct SourceGate {
    current: u64,
}

impl SourceGate {
    /// Invalidates every frame from earlier generations and returns the new one.
    pub fn begin_handoff(&mut self) -> u64 {
        self.current += 1;
        self.current
    }

    pub fn accepts(&self, generation: u64) -> bool {
        generation == self.current
    }

    pub fn current(&self) -> u64 {
        self.current
    }
}

/// Stamps a frame in milliseconds since `origin`. midir's own stamps restart
/// from an arbitrary point on every connection, so they are not used.
pub fn stamp_frame(origin: Instant, midi_bytes: &[u8]) -> RawFrame {
    RawFrame::new(midi_bytes.to_vec(), origin.elapsed().as_secs_f64() * 1000.0)
}

/// The single live MIDI input connection.
pub struct InputSelection {
    connection: Option<MidiInputConnection<()>>,
    active: Option<PortDescriptor>,
    gate: SourceGate,
    tx: Sender<FrameReceiverPayload>,
    /// Shared by every connection, so timestamps stay monotonic across handoffs
    origin: Instant,
}

impl InputSelection {
    pub fn new(tx: Sender<FrameReceiverPayload>) -> Self {
        InputSelection {
            connection: None,
            active: None,
            gate: SourceGate::default(),
            tx,
            origin: Instant::now(),
        }
    }

    /// Detaches the current input, then attaches `port`. Frames still queued
    /// from the old input carry a stale generation and get dropped.
    pub fn select(&mut self, port: &PortDescriptor) -> anyhow::Result<()> {
        self.deselect();
        let generation = self.gate.current();

        let midi_input = new_midi_input()?;
        let in_ports = midi_input.ports();
        let in_port = in_ports
            .get(port.index)
            .ok_or_else(|| anyhow!("no MIDI input port at index {}", port.index))?;
        let in_port_name = midi_input.port_name(in_port)?;
        if in_port_name != port.name {
            return Err(anyhow!(
                "MIDI input port {} is now \"{}\", expected \"{}\"",
                port.index,
                in_port_name,
                port.name
            ));
        }

        let tx = self.tx.clone();
        let origin = self.origin;
        let connection = midi_input
            .connect(
                in_port,
                "midi-monitor-input",
                move |_stamp, midi_bytes, _| {
                    if tx.send((generation, stamp_frame(origin, midi_bytes))).is_err() {
                        debug!("Frame receiver gone; dropping frame");
                    }
                },
                (),
            )
            .map_err(|e| anyhow!("failed to connect to \"{}\": {}", port.name, e))?;

        info!(
            "MIDI connection open, reading input from '{}'.",
            in_port_name
        );
        self.connection = Some(connection);
        self.active = Some(port.clone());
        Ok(())
    }

    /// Closes the current input, if any. Used when the device disappears.
    pub fn deselect(&mut self) {
        self.gate.begin_handoff();
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        if let Some(previous) = self.active.take() {
            info!("Closed MIDI input '{}'", previous.name);
        }
    }

    pub fn accepts(&self, generation: u64) -> bool {
        self.gate.accepts(generation)
    }

    pub fn active_port(&self) -> Option<&PortDescriptor> {
        self.active.as_ref()
    }

    /// Frame as the current connection would deliver it.
    pub fn stamp(&self, midi_bytes: &[u8]) -> RawFrame {
        stamp_frame(self.origin, midi_bytes)
    }

    pub fn generation(&self) -> u64 {
        self.gate.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(names: &[&str]) -> Vec<PortDescriptor> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| PortDescriptor {
                index,
                name: name.to_string(),
            })
            .collect()
    }

    #[test]
    fn auto_select_picks_first_without_selection() {
        let available = ports(&["Keys", "Pads"]);
        assert_eq!(auto_select_port(&available, None).unwrap().name, "Keys");
    }

    #[test]
    fn auto_select_keeps_current_port() {
        let available = ports(&["Keys", "Pads"]);
        let chosen = auto_select_port(&available, Some("Pads")).unwrap();
        assert_eq!(chosen.index, 1);
    }

    #[test]
    fn auto_select_replaces_vanished_port() {
        let available = ports(&["Pads"]);
        let chosen = auto_select_port(&available, Some("Keys")).unwrap();
        assert_eq!(chosen.name, "Pads");
        assert_eq!(chosen.index, 0);
    }

    #[test]
    fn auto_select_with_no_ports() {
        assert!(auto_select_port(&[], Some("Keys")).is_none());
        assert!(auto_select_port(&[], None).is_none());
    }

    #[test]
    fn gate_rejects_previous_generations() {
        let mut gate = SourceGate::default();
        assert!(gate.accepts(0));
        let first = gate.begin_handoff();
        assert!(gate.accepts(first));
        assert!(!gate.accepts(0));
        let second = gate.begin_handoff();
        assert!(gate.accepts(second));
        assert!(!gate.accepts(first));
    }

    #[test]
    fn deselect_without_connection_advances_generation() {
        let (tx, _rx) = std::sync::mpsc::channel();
        let mut selection = InputSelection::new(tx);
        assert!(selection.accepts(0));
        selection.deselect();
        assert!(!selection.accepts(0));
        assert!(selection.active_port().is_none());
    }

    #[test]
    fn stamps_keep_increasing_across_handoff() {
        let (tx, _rx) = std::sync::mpsc::channel();
        let mut selection = InputSelection::new(tx);
        let before = selection.stamp(&[0x90, 0x3C, 0x40]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        selection.deselect();
        let after = selection.stamp(&[0x80, 0x3C, 0x00]);
        assert!(after.timestamp_ms > before.timestamp_ms);
        assert_eq!(after.bytes, vec![0x80, 0x3C, 0x00]);
    }
}
