//! Records and their line encodings

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a record is rendered into a buffer line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `<timestamp> <host> <message>`
    #[default]
    Plain,
    /// One JSON object per line
    Json,
}

/// A single record to buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub message: String,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            host: host.into(),
            message: message.into(),
        }
    }

    /// Render the event as a single line (without terminator)
    pub fn encode(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Plain => Ok(format!(
                "{} {} {}",
                self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                self.host,
                self.message
            )),
            OutputFormat::Json => Ok(serde_json::to_string(self)?),
        }
    }
}
