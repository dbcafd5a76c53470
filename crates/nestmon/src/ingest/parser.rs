//! Decoder for the push API's line-oriented event stream.
//!
//! Each line is `<field>: <value>`, a blank record separator, or a comment.
//! The parser handles one line at a time; buffering bytes into lines is the
//! job of [`super::LineReader`].

use std::sync::Arc;

use crate::model::DecodeError;
use crate::model::Snapshot;

/// Event name the API sends periodically on an otherwise idle connection.
pub const KEEP_ALIVE: &str = "keep-alive";

/// One decoded line of the event stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// Comment, separator, or a field nobody reads.
    Comment,

    /// `event: <name>`. Informational; names are not validated.
    Event(String),

    /// `data: <payload>`. `None` means "no change, nothing to deliver".
    Data(Option<Arc<Snapshot>>),

    /// A `data:` payload that failed to decode.
    Malformed { raw: String, error: DecodeError },
}

impl StreamEvent {
    pub fn is_keep_alive(&self) -> bool {
        matches!(self, StreamEvent::Event(name) if name == KEEP_ALIVE)
    }
}

/// Event-stream line parser.
///
/// The only state carried between lines is the last snapshot that decoded
/// successfully, so callers can answer "what is the current state" between
/// pushes.
#[derive(Debug, Default)]
pub struct EventParser {
    last: Option<Arc<Snapshot>>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one line (without its terminator).
    ///
    /// Returns `None` for a blank line. Never fails: unknown fields and event
    /// names become [`StreamEvent::Comment`] / [`StreamEvent::Event`], bad
    /// payloads become [`StreamEvent::Malformed`].
    pub fn parse_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.trim().is_empty() {
            return None;
        }

        let Some((field, value)) = line.split_once(':') else {
            return Some(StreamEvent::Comment);
        };
        let value = value.trim();

        let event = match field.trim() {
            "event" => StreamEvent::Event(value.to_string()),
            "data" => self.parse_data(value),
            _ => StreamEvent::Comment,
        };
        Some(event)
    }

    /// Last snapshot decoded by this parser, if any.
    pub fn last_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.last.clone()
    }

    fn parse_data(&mut self, value: &str) -> StreamEvent {
        if value == "null" {
            return StreamEvent::Data(None);
        }

        match Snapshot::from_stream_payload(value) {
            Ok(Some(snapshot)) => {
                let snapshot = Arc::new(snapshot);
                self.last = Some(snapshot.clone());
                StreamEvent::Data(Some(snapshot))
            }
            Ok(None) => StreamEvent::Data(None),
            Err(error) => StreamEvent::Malformed {
                raw: value.to_string(),
                error,
            },
        }
    }
}
