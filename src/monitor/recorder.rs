use chrono::{DateTime, Utc};
use circular_buffer::CircularBuffer;
use log::{info, warn};

use super::{
    decoder::MidiEvent,
    export::{serialize_session, ExportError, SessionLog},
};

pub const LIVE_LOG_LENGTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Events captured between a start and a stop of recording, oldest first.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub started_at: DateTime<Utc>,
    pub captured_events: Vec<MidiEvent>,
    exported: bool,
}

impl RecordingSession {
    fn new(started_at: DateTime<Utc>) -> Self {
        RecordingSession {
            started_at,
            captured_events: Vec::new(),
            exported: false,
        }
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }
}

/// Owns the live log and the current recording; every decoded event goes
/// through [`SessionRecorder::ingest`].
pub struct SessionRecorder {
    live_log: CircularBuffer<LIVE_LOG_LENGTH, MidiEvent>,
    session: Option<RecordingSession>,
    state: RecorderState,
}

impl Default for SessionRecorder {
    fn default() -> Self {
        SessionRecorder::new()
    }
}

impl SessionRecorder {
    pub fn new() -> Self {
        SessionRecorder {
            live_log: CircularBuffer::new(),
            session: None,
            state: RecorderState::Idle,
        }
    }

    pub fn ingest(&mut self, event: MidiEvent) {
        if self.state == RecorderState::Recording {
            if let Some(session) = self.session.as_mut() {
                session.captured_events.push(event.clone());
            }
        }
        // newest first; a full log drops its oldest entry from the back
        self.live_log.push_front(event);
    }

    pub fn start_recording(&mut self) {
        self.start_recording_at(Utc::now());
    }

    /// Begins a new session, discarding whatever the previous one captured,
    /// exported or not.
    pub fn start_recording_at(&mut self, started_at: DateTime<Utc>) {
        if let Some(previous) = &self.session {
            if !previous.exported && !previous.captured_events.is_empty() {
                warn!(
                    "Discarding {} unexported events from the recording started at {}",
                    previous.captured_events.len(),
                    previous.started_at
                );
            }
        }
        self.session = Some(RecordingSession::new(started_at));
        self.state = RecorderState::Recording;
        info!("Recording started at {}", started_at);
    }

    pub fn stop_recording(&mut self) {
        if self.state == RecorderState::Idle {
            return;
        }
        self.state = RecorderState::Idle;
        info!("Recording stopped; {} events captured", self.captured_len());
    }

    pub fn export_session(&mut self) -> Result<SessionLog, ExportError> {
        self.export_session_at(Utc::now())
    }

    /// Serializes the current session as of `ended_at`. The session is kept,
    /// so exporting again yields the same rows.
    pub fn export_session_at(
        &mut self,
        ended_at: DateTime<Utc>,
    ) -> Result<SessionLog, ExportError> {
        let session = match self.session.as_mut() {
            Some(session) if !session.captured_events.is_empty() => session,
            _ => return Err(ExportError::NoData),
        };
        let log = serialize_session(session, ended_at);
        session.exported = true;
        Ok(log)
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Live log, newest first.
    pub fn live_events(&self) -> impl Iterator<Item = &MidiEvent> {
        self.live_log.iter()
    }

    pub fn latest_event(&self) -> Option<&MidiEvent> {
        self.live_log.iter().next()
    }

    pub fn live_len(&self) -> usize {
        self.live_log.len()
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn captured_len(&self) -> usize {
        self.session
            .as_ref()
            .map(|s| s.captured_events.len())
            .unwrap_or(0)
    }
}
