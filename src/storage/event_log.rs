use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Fail,
    Skipped,
    Warning,
    Error,
    Exception,
}

/// One flat record of the pipeline's side channel.
#[derive(Debug, Clone)]
pub struct Event {
    pub action: String,
    pub status: EventStatus,
    pub fields: Map<String, Value>,
}

impl Event {
    pub fn new(action: impl Into<String>, status: EventStatus) -> Self {
        Self {
            action: action.into(),
            status,
            fields: Map::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn message(self, message: impl std::fmt::Display) -> Self {
        self.field("message", message.to_string())
    }

    /// The record as written, with `timestamp` attached.
    pub fn to_record(&self, timestamp: &str) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("action".to_string(), Value::String(self.action.clone()));
        record.insert(
            "status".to_string(),
            serde_json::to_value(self.status).unwrap_or(Value::Null),
        );
        for (key, value) in &self.fields {
            record.insert(key.clone(), value.clone());
        }
        record.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
        record
    }
}

/// Append-only JSONL event stream, mirrored to `tracing`.
///
/// Never used for control flow; a failing write only produces a warning.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Log to `tracing` only.
    pub fn tracing_only() -> Self {
        Self { path: None }
    }

    pub fn record(&self, event: Event) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let record = self.mirror(&event, &timestamp);

        let Some(ref path) = self.path else {
            return;
        };

        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize event {}: {}", event.action, e);
                return;
            }
        };

        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));

        if let Err(e) = written {
            warn!("Failed to append event to {}: {}", path.display(), e);
        }
    }

    fn mirror(&self, event: &Event, timestamp: &str) -> Map<String, Value> {
        let record = event.to_record(timestamp);
        let fields = Value::Object(event.fields.clone());

        match event.status {
            EventStatus::Success => info!(action = %event.action, %fields, "success"),
            EventStatus::Skipped => debug!(action = %event.action, %fields, "skipped"),
            EventStatus::Warning | EventStatus::Fail => {
                warn!(action = %event.action, status = ?event.status, %fields, "event")
            }
            EventStatus::Error | EventStatus::Exception => {
                error!(action = %event.action, status = ?event.status, %fields, "event")
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_event_record_is_flat() {
        let event = Event::new("get_price", EventStatus::Success).field("price", "1200");
        let record = event.to_record("2024-01-15 10:30:45");

        assert_eq!(record["action"], "get_price");
        assert_eq!(record["status"], "success");
        assert_eq!(record["price"], "1200");
        assert_eq!(record["timestamp"], "2024-01-15 10:30:45");
    }

    #[test]
    fn test_status_serialization() {
        let statuses = [
            (EventStatus::Success, "success"),
            (EventStatus::Fail, "fail"),
            (EventStatus::Skipped, "skipped"),
            (EventStatus::Warning, "warning"),
            (EventStatus::Error, "error"),
            (EventStatus::Exception, "exception"),
        ];
        for (status, expected) in statuses {
            assert_eq!(serde_json::to_value(status).unwrap(), expected);
        }
    }

    #[test]
    fn test_appends_jsonl_lines() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        let log = EventLog::new(path.clone());

        log.record(Event::new("start_browser", EventStatus::Success));
        log.record(
            Event::new("get_location", EventStatus::Skipped).message("location not found"),
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["action"], "get_location");
        assert_eq!(second["status"], "skipped");
        assert_eq!(second["message"], "location not found");
        assert!(second["timestamp"].is_string());
    }

    #[test]
    fn test_unwritable_path_is_not_fatal() {
        let temp_dir = tempdir().unwrap();
        // a directory cannot be opened for appending
        let log = EventLog::new(temp_dir.path().to_path_buf());
        log.record(Event::new("anything", EventStatus::Warning));
    }
}
