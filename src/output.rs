use std::io::{self, Write};

use serde::Serialize;

use crate::app::{EventLevel, ProgressEvent, ProgressSink, RunSummary};

/// Line printed by `-v/--version`.
pub fn version_banner() -> String {
    format!(
        "BIDS App: T1 Volume Counter version {}",
        env!("CARGO_PKG_VERSION")
    )
}

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

/// Forwards pipeline events to the installed `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.level {
            EventLevel::Debug => tracing::debug!("{}", event.message),
            EventLevel::Info => tracing::info!("{}", event.message),
            EventLevel::Warn => tracing::warn!("{}", event.message),
            EventLevel::Error => tracing::error!("{}", event.message),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
