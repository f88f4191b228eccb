use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use thiserror::Error;

use super::{decoder::MidiEvent, recorder::RecordingSession};

const BANNER: &str = "MIDI SESSION LOG";
const RULE_WIDTH: usize = 80;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no recorded data to export")]
    NoData,
    #[error("failed to write session log to {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A serialized recording, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLog {
    pub file_name: String,
    pub contents: String,
}

impl SessionLog {
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.file_name);
        fs::write(&path, self.contents.as_bytes()).map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Wrote session log to {}", path.display());
        Ok(path)
    }
}

pub fn log_file_name(started_at: DateTime<Utc>) -> String {
    format!("midi_log_{}.txt", started_at.timestamp_millis())
}

pub fn serialize_session(session: &RecordingSession, ended_at: DateTime<Utc>) -> SessionLog {
    SessionLog {
        file_name: log_file_name(session.started_at),
        contents: render_log(session, ended_at),
    }
}

fn render_log(session: &RecordingSession, ended_at: DateTime<Utc>) -> String {
    let events = &session.captured_events;
    let double_rule = "=".repeat(RULE_WIDTH);

    let mut out = String::new();
    out.push_str(&format!("{BANNER}\n"));
    out.push_str(&format!("{double_rule}\n"));
    out.push_str(&format!("Start Time: {}\n", iso_timestamp(session.started_at)));
    out.push_str(&format!("End Time:   {}\n", iso_timestamp(ended_at)));
    out.push_str(&format!("Total Events: {}\n", events.len()));
    out.push_str(&format!("{double_rule}\n\n"));
    out.push_str("TIMESTAMP (ms) | TYPE             | CH | NOTE | VEL | DATA (HEX)\n");
    out.push_str(&format!("{}\n", "-".repeat(RULE_WIDTH)));

    if let Some(first) = events.first() {
        for event in events {
            out.push_str(&format_row(event, first.timestamp_ms));
        }
    }
    out
}

fn format_row(event: &MidiEvent, origin_ms: f64) -> String {
    format!(
        "{:<14} | {:<16} | {:<2} | {:<4} | {:<3} | {}\n",
        relative_millis(event.timestamp_ms, origin_ms),
        event.kind.label().to_uppercase(),
        format!("{:02}", event.channel),
        event.note,
        event.velocity,
        hex_bytes(&event.raw_bytes)
    )
}

/// Rounds half up, so 0.5 ms after the origin reads as 1.
fn relative_millis(timestamp_ms: f64, origin_ms: f64) -> i64 {
    (timestamp_ms - origin_ms + 0.5).floor() as i64
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn iso_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::monitor::{
        decoder::{FrameDecoder, RawFrame},
        recorder::SessionRecorder,
    };

    fn recorded(frames: Vec<(Vec<u8>, f64)>) -> SessionRecorder {
        let mut decoder = FrameDecoder::new();
        let mut recorder = SessionRecorder::new();
        recorder.start_recording_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        for (bytes, timestamp_ms) in frames {
            if let Some(event) = decoder.decode(&RawFrame::new(bytes, timestamp_ms)) {
                recorder.ingest(event);
            }
        }
        recorder.stop_recording();
        recorder
    }

    fn end_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 2).unwrap() + chrono::Duration::milliseconds(345)
    }

    #[test]
    fn note_on_then_note_off() {
        let mut recorder = recorded(vec![
            (vec![0x90, 0x3C, 0x40], 100.0),
            (vec![0x90, 0x3C, 0x00], 250.0),
        ]);
        let log = recorder.export_session_at(end_time()).unwrap();

        let expected = "\
MIDI SESSION LOG
================================================================================
Start Time: 2024-03-01T12:00:00.000Z
End Time:   2024-03-01T12:00:02.345Z
Total Events: 2
================================================================================

TIMESTAMP (ms) | TYPE             | CH | NOTE | VEL | DATA (HEX)
--------------------------------------------------------------------------------
0              | NOTE ON          | 01 | 60   | 64  | 90 3C 40
150            | NOTE OFF         | 01 | 60   | 0   | 90 3C 00
";
        assert_eq!(log.contents, expected);
        assert_eq!(log.file_name, "midi_log_1709294400000.txt");
    }

    #[test]
    fn rows_follow_capture_order() {
        let mut recorder = recorded(vec![
            (vec![0xB1, 0x07, 0x7F], 10.0),
            (vec![0xE0, 0x00, 0x40], 12.4),
            (vec![0xAF, 0x01, 0x02], 12.5),
            (vec![0xC0, 0x05], 1010.0),
        ]);
        let log = recorder.export_session_at(end_time()).unwrap();
        let rows: Vec<&str> = log.contents.lines().skip(9).collect();
        assert_eq!(
            rows,
            vec![
                "0              | CONTROL CHANGE   | 02 | 7    | 127 | B1 07 7F",
                "2              | PITCH BEND       | 01 | 0    | 64  | E0 00 40",
                "3              | UNKNOWN          | 16 | 1    | 2   | AF 01 02",
                "1000           | UNKNOWN          | 01 | 5    | 0   | C0 05",
            ]
        );
        assert!(log.contents.contains("Total Events: 4\n"));
    }

    #[test]
    fn dropped_frames_are_not_exported() {
        let mut recorder = recorded(vec![(vec![0xF8], 5.0), (vec![0x80, 0x40, 0x00], 7.0)]);
        let log = recorder.export_session_at(end_time()).unwrap();
        assert!(log.contents.contains("Total Events: 1\n"));
        assert!(!log.contents.contains("F8"));
    }

    #[test]
    fn relative_time_rounds_half_up() {
        assert_eq!(relative_millis(100.0, 100.0), 0);
        assert_eq!(relative_millis(100.49, 100.0), 0);
        assert_eq!(relative_millis(100.5, 100.0), 1);
        assert_eq!(relative_millis(250.0, 100.0), 150);
    }

    #[test]
    fn hex_is_uppercase_and_padded() {
        assert_eq!(hex_bytes(&[0x0A, 0xFF, 0x00]), "0A FF 00");
    }

    #[test]
    fn write_to_reports_missing_directory() {
        let mut recorder = recorded(vec![(vec![0x90, 0x3C, 0x40], 0.0)]);
        let log = recorder.export_session_at(end_time()).unwrap();
        let missing = std::env::temp_dir()
            .join("midi-session-monitor-missing")
            .join("nested");
        assert!(matches!(log.write_to(&missing), Err(ExportError::Io { .. })));
    }

    #[test]
    fn write_to_creates_log_file() {
        let mut recorder = recorded(vec![(vec![0x90, 0x3C, 0x40], 0.0)]);
        let log = recorder.export_session_at(end_time()).unwrap();
        let dir = std::env::temp_dir();
        let path = log.write_to(&dir).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), log.contents);
        fs::remove_file(path).unwrap();
    }
}
