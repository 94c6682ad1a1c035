//! Command-line interface definition.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use meeting_audio_core::models::config::MeetingConfiguration;
use meeting_audio_core::models::error::MeetingError;

/// meeting-bot - join meetings headlessly and capture their raw audio
#[derive(Debug, Parser)]
#[command(name = "meeting-bot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Join one or more meetings and stay until --duration elapses or the SDK loop ends
    Join(JoinArgs),
    /// Serve the REST control API and WebSocket audio streams until SIGINT/SIGTERM
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Listen address; ":8080" binds all interfaces
    #[arg(long, env = "HTTP_ADDR")]
    pub http_addr: Option<String>,

    /// Zoom SDK key
    #[arg(long, env = "ZOOM_SDK_KEY", hide_env_values = true)]
    pub sdk_key: Option<String>,

    /// Zoom SDK secret
    #[arg(long, env = "ZOOM_SDK_SECRET", hide_env_values = true)]
    pub sdk_secret: Option<String>,
}

#[derive(Debug, Args)]
pub struct JoinArgs {
    /// Meeting id and password pairs: <MEETING_ID> <PASSWORD> [<MEETING_ID> <PASSWORD> ...]
    #[arg(required = true, num_args = 2.., value_name = "MEETING_ID PASSWORD")]
    pub meetings: Vec<String>,

    /// Zoom SDK key
    #[arg(long, env = "ZOOM_SDK_KEY", hide_env_values = true)]
    pub sdk_key: Option<String>,

    /// Zoom SDK secret
    #[arg(long, env = "ZOOM_SDK_SECRET", hide_env_values = true)]
    pub sdk_secret: Option<String>,

    /// Display names are "<prefix> 1", "<prefix> 2", ...
    #[arg(long, default_value = "Bot")]
    pub display_name_prefix: String,

    /// Join without requesting raw audio
    #[arg(long)]
    pub no_audio: bool,

    /// Record each meeting's mixed audio to <dir>/<meeting_id>-mixed.wav
    #[arg(long)]
    pub record_dir: Option<PathBuf>,

    /// Leave after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Print per-meeting and bus stats as JSON on exit
    #[arg(long)]
    pub stats_json: bool,
}

impl JoinArgs {
    /// One configuration per id/password pair, numbered from 1.
    pub fn meeting_configs(&self) -> Result<Vec<MeetingConfiguration>, MeetingError> {
        if self.meetings.len() % 2 != 0 {
            return Err(MeetingError::InvalidArgument(
                "meetings must be given as <MEETING_ID> <PASSWORD> pairs".into(),
            ));
        }

        let mut seen = HashSet::new();
        self.meetings
            .chunks_exact(2)
            .enumerate()
            .map(|(i, pair)| {
                let config = MeetingConfiguration::new(pair[0].clone())
                    .with_password(pair[1].clone())
                    .with_display_name(format!("{} {}", self.display_name_prefix, i + 1))
                    .with_audio(!self.no_audio);
                config.validate()?;
                if !seen.insert(config.meeting_id.clone()) {
                    return Err(MeetingError::InvalidArgument(format!(
                        "meeting {} is listed more than once",
                        config.meeting_id
                    )));
                }
                Ok(config)
            })
            .collect()
    }
}
