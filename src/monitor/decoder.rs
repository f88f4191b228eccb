use std::fmt;

use serde::Serialize;

pub const NOTE_OFF: u8 = 0x8;
pub const NOTE_ON: u8 = 0x9;
pub const CONTROL_CHANGE: u8 = 0xB;
pub const PITCH_BEND: u8 = 0xE;

/// One message as delivered by the input device, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub bytes: Vec<u8>,
    /// Milliseconds since the input layer's origin, monotonic within a session
    pub timestamp_ms: f64,
}

impl RawFrame {
    pub fn new(bytes: Vec<u8>, timestamp_ms: f64) -> Self {
        RawFrame {
            bytes,
            timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    ControlChange,
    PitchBend,
    Unknown,
}

impl EventKind {
    /// Human-readable name, as shown in the live log.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::NoteOn => "Note On",
            EventKind::NoteOff => "Note Off",
            EventKind::ControlChange => "Control Change",
            EventKind::PitchBend => "Pitch Bend",
            EventKind::Unknown => "Unknown",
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, EventKind::NoteOn | EventKind::NoteOff)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// A decoded, channel-aware MIDI message.
///
/// `note` and `velocity` carry the raw data bytes; their meaning depends on
/// `kind` (controller number and value for Control Change, LSB and MSB for
/// Pitch Bend).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MidiEvent {
    pub id: EventId,
    pub timestamp_ms: f64,
    pub kind: EventKind,
    /// 1-16
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub raw_bytes: Vec<u8>,
}

/// Decodes a frame into an event carrying the given id.
///
/// Frames shorter than two bytes are dropped and yield `None`. Any other
/// frame decodes, unrecognised commands becoming [`EventKind::Unknown`].
pub fn decode_frame(frame: &RawFrame, id: EventId) -> Option<MidiEvent> {
    if frame.bytes.len() < 2 {
        return None;
    }

    let status = frame.bytes[0];
    let data1 = frame.bytes[1];
    let data2 = frame.bytes.get(2).copied().unwrap_or(0);

    let command = status >> 4;
    let channel = (status & 0x0F) + 1;

    let kind = match command {
        NOTE_OFF => EventKind::NoteOff,
        // Note On with zero velocity is a Note Off
        NOTE_ON if data2 == 0 => EventKind::NoteOff,
        NOTE_ON => EventKind::NoteOn,
        CONTROL_CHANGE => EventKind::ControlChange,
        PITCH_BEND => EventKind::PitchBend,
        _ => EventKind::Unknown,
    };

    Some(MidiEvent {
        id,
        timestamp_ms: frame.timestamp_ms,
        kind,
        channel,
        note: data1,
        velocity: data2,
        raw_bytes: frame.bytes.clone(),
    })
}

/// Stamps decoded events with ids that never repeat for the lifetime of the
/// decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    next_id: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder::default()
    }

    pub fn decode(&mut self, frame: &RawFrame) -> Option<MidiEvent> {
        let event = decode_frame(frame, EventId(self.next_id))?;
        self.next_id += 1;
        Some(event)
    }
}
