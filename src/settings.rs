use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[arg(long = "loglevel",default_value_t=String::from("info"))]
    pub log_level: String,

    /// Flag to enable headless (no GUI) mode; decoded events are logged
    #[arg(long = "headless")]
    pub headless_mode: bool,

    /// In headless mode, print each decoded event as a line of JSON
    #[arg(long = "json")]
    pub json_output: bool,

    /// List available MIDI input ports and exit
    #[arg(long = "list")]
    pub list_ports: bool,

    /// Preferred MIDI input port, by index; otherwise the first available
    /// port is used
    #[arg(long = "port")]
    pub midi_port: Option<usize>,

    /// Directory that exported session logs are written to
    #[arg(long = "export-dir", default_value = ".")]
    pub export_dir: PathBuf,

    /// Start recording as soon as the input is open (headless mode). Needs
    /// --duration, which is what ends the recording and writes the log
    #[arg(long = "record", requires = "duration_secs")]
    pub record: bool,

    /// Headless mode: stop after this many seconds, exporting the recording
    /// if one was made
    #[arg(long = "duration")]
    pub duration_secs: Option<u64>,

    /// How often to look for MIDI inputs that appeared or disappeared
    #[arg(long = "rescan-secs", default_value_t = 2)]
    pub rescan_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_requires_duration() {
        assert!(Cli::try_parse_from(["midi-monitor", "--headless", "--record"]).is_err());

        let cli =
            Cli::try_parse_from(["midi-monitor", "--headless", "--record", "--duration", "30"])
                .unwrap();
        assert!(cli.record);
        assert_eq!(cli.duration_secs, Some(30));
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["midi-monitor"]).unwrap();
        assert_eq!(cli.log_level, "info");
        assert!(!cli.record);
        assert_eq!(cli.rescan_secs, 2);
        assert_eq!(cli.export_dir, PathBuf::from("."));
    }
}
