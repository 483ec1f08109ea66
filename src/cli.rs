//! Minimal CLI parsing for run overrides and admin operations.

use std::env;

use uuid::Uuid;

#[derive(Debug, Default)]
pub struct CliOptions {
    /// Override WORKER_COUNT for this run
    pub workers_override: Option<usize>,
    /// Manually retry a failed video, then exit
    pub retry_video: Option<Uuid>,
}

impl CliOptions {
    pub fn from_args() -> Self {
        let mut options = CliOptions::default();
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--workers" => {
                    if let Some(value) = args.next() {
                        options.workers_override = value.parse().ok();
                    }
                }
                "--retry" => {
                    if let Some(value) = args.next() {
                        options.retry_video = Uuid::parse_str(&value).ok();
                    }
                }
                _ if arg.starts_with("--workers=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.workers_override = value.parse().ok();
                    }
                }
                _ if arg.starts_with("--retry=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.retry_video = Uuid::parse_str(value).ok();
                    }
                }
                _ => {}
            }
        }
        options
    }
}
