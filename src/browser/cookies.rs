use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::error::{CrawlError, Result};
use crate::storage::{Event, EventLog, EventStatus};

/// Keys of exported cookies that the browser rejects on injection.
const STRIPPED_KEYS: [&str; 5] = ["sameSite", "hostOnly", "storeId", "expires", "expirationDate"];

/// Inject a saved session from a JSON cookie export, then reload the page.
///
/// Returns `Ok(false)` when there is nothing to load or the reload fails.
/// Cookies the browser refuses are counted and logged individually.
pub async fn load_cookies(
    session: &dyn BrowserSession,
    path: &Path,
    log: &EventLog,
) -> Result<bool> {
    if !path.exists() {
        log.record(
            Event::new("load_cookies", EventStatus::Warning)
                .field("path", path.display().to_string())
                .message("Cookie file not found"),
        );
        return Ok(false);
    }

    let content = tokio::fs::read_to_string(path).await?;
    let cookies: Vec<Map<String, Value>> = serde_json::from_str(&content)
        .map_err(|e| {
            CrawlError::ParseError(format!("Invalid cookie file {}: {}", path.display(), e))
        })?;

    let mut added = 0usize;
    let mut failed = 0usize;

    for mut cookie in cookies {
        for key in STRIPPED_KEYS {
            cookie.remove(key);
        }
        if !cookie.contains_key("name") || !cookie.contains_key("value") {
            debug!("Skipping cookie entry without name or value");
            continue;
        }

        match session.add_cookie(&cookie).await {
            Ok(()) => added += 1,
            Err(e) => {
                failed += 1;
                log.record(
                    Event::new("load_cookies", EventStatus::Error)
                        .field("cookie", cookie.get("name").cloned().unwrap_or(Value::Null))
                        .message(e),
                );
            }
        }
    }

    if let Err(e) = session.reload().await {
        log.record(
            Event::new("load_cookies", EventStatus::Error)
                .field("step", "reload")
                .message(e),
        );
        return Ok(false);
    }

    log.record(
        Event::new("load_cookies", EventStatus::Success)
            .field("added", added)
            .field("failed", failed),
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeCatalog, FakeSession};
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let session = FakeSession::new(FakeCatalog::new());

        let path = dir.path().join("cookies.json");
        let loaded = load_cookies(&session, &path, &EventLog::tracing_only()).await.unwrap();

        assert!(!loaded);
        assert_eq!(session.state().reloads, 0);
    }

    #[tokio::test]
    async fn test_counts_added_and_failed_cookies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        fs::write(
            &path,
            r#"[
                {"name": "session", "value": "abc", "domain": ".shop.test",
                 "sameSite": "lax", "hostOnly": false},
                {"name": "broken", "value": "x", "storeId": "0"},
                {"value": "nameless"}
            ]"#,
        )
        .unwrap();

        let session = FakeSession::new(FakeCatalog::new());
        session.fail_cookie("broken");
        let log_path = dir.path().join("events.jsonl");

        let loaded = load_cookies(&session, &path, &EventLog::new(log_path.clone())).await.unwrap();

        assert!(loaded);
        assert_eq!(session.state().cookies, vec!["session".to_string()]);
        assert_eq!(session.state().reloads, 1);

        let log = fs::read_to_string(log_path).unwrap();
        let last: Value = serde_json::from_str(log.lines().last().unwrap()).unwrap();
        assert_eq!(last["added"], 1);
        assert_eq!(last["failed"], 1);
    }

    #[tokio::test]
    async fn test_malformed_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        fs::write(&path, "{not json").unwrap();
        let session = FakeSession::new(FakeCatalog::new());

        let result = load_cookies(&session, &path, &EventLog::tracing_only()).await;

        assert!(matches!(result, Err(CrawlError::ParseError(_))));
    }
}
