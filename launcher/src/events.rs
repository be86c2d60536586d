//! Observer event protocol.
//!
//! Every operation reports progress to the connected dashboard through a
//! single ordered channel of `{event, data}` frames. Handlers hold an
//! [`EventSink`]; the WebSocket writer task drains the receiving end and
//! forwards each frame to the client as one JSON text message.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::utils::iso_now;

/// A single outbound frame on the observer channel.
#[derive(Debug, Clone, Serialize)]
pub struct Outbound {
    pub event: &'static str,
    pub data: serde_json::Value,
}

/// Severity of a deployment log line as shown in the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warn,
    Error,
    Success,
}

/// A deployment log line event.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub message: String,
    #[serde(rename = "type")]
    pub severity: LogSeverity,
}

/// Ordered, non-blocking sender for observer events.
///
/// Cloneable; all clones feed the same connection. Emitting into a closed
/// channel is not an error — the observer has simply disconnected and the
/// frame is dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl EventSink {
    /// Create a sink together with the receiving end for the writer task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit a named event with a serializable payload.
    pub fn emit(&self, event: &'static str, data: impl Serialize) {
        match serde_json::to_value(data) {
            Ok(value) => {
                let _ = self.tx.send(Outbound { event, data: value });
            }
            Err(e) => debug!("Dropping unserializable {} event: {}", event, e),
        }
    }

    /// Emit a `log` frame with the given severity.
    pub fn log(&self, severity: LogSeverity, message: impl Into<String>) {
        self.emit(
            "log",
            LogEvent {
                timestamp: iso_now(),
                message: message.into(),
                severity,
            },
        );
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogSeverity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogSeverity::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogSeverity::Error, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogSeverity::Success, message);
    }

    /// Emit a `step-update` frame moving the dashboard stepper to `index`.
    pub fn step(&self, index: u32) {
        self.emit("step-update", serde_json::json!({ "stepIndex": index }));
    }
}
