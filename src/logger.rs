use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::diff::diff_json;

const REDACTED: &str = "<redacted>";
const SECRET_FIELDS: &[&str] = &["password", "refresh_token", "access_token"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    Full,
    Diffed,
}

/// Appends API traffic to a file as newline-delimited JSON.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous: HashMap<String, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, path: &str, form: &[(&str, String)]) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": "POST",
            "path": path,
            "body": redact_form(form),
        });
        self.write_line(&entry);
    }

    pub fn log_command(&mut self, action: &str, device: &str, form: &[(&str, String)]) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "action": action,
            "device": device,
            "body": redact_form(form),
        });
        self.write_line(&entry);
    }

    /// Log a response. In diffed mode, bodies sharing a `channel` after the
    /// first are reduced to their changed leaves.
    pub fn log_response(&mut self, channel: &str, path: &str, status: u16, body: &Value) {
        let body = redact_value(body);
        let entry = match (self.mode, self.previous.get(channel)) {
            (MessageLogMode::Full, _) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "resp",
                "path": path,
                "status": status,
                "body": body,
            }),
            (MessageLogMode::Diffed, None) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "resp",
                "path": path,
                "status": status,
                "full": true,
                "body": body,
            }),
            (MessageLogMode::Diffed, Some(prev)) => {
                let mut changes = Vec::new();
                diff_json(prev, &body, "", &mut changes);
                let change_entries: Vec<Value> = changes
                    .iter()
                    .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                    .collect();
                json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "resp",
                    "path": path,
                    "status": status,
                    "changes": change_entries,
                })
            }
        };
        self.write_line(&entry);
        if self.mode == MessageLogMode::Diffed {
            self.previous.insert(channel.to_string(), body);
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

fn redact_form(form: &[(&str, String)]) -> Value {
    let map: Map<String, Value> = form
        .iter()
        .map(|(k, v)| {
            let v = if SECRET_FIELDS.contains(k) { REDACTED } else { v.as_str() };
            (k.to_string(), Value::String(v.to_string()))
        })
        .collect();
    Value::Object(map)
}

fn redact_value(body: &Value) -> Value {
    match body {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if SECRET_FIELDS.contains(&k.as_str()) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn read_lines(path: &str) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn log_request_redacts_password() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request(
            "/auth/token",
            &[("username", "me@example.com".to_string()), ("password", "hunter2".to_string())],
        );

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["method"], "POST");
        assert_eq!(lines[0]["body"]["username"], "me@example.com");
        assert_eq!(lines[0]["body"]["password"], REDACTED);
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn token_responses_are_redacted() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_response(
            "token",
            "/auth/token",
            200,
            &json!({"access_token": "abc", "refresh_token": "def", "expires_in": 300}),
        );

        let lines = read_lines(path);
        assert_eq!(lines[0]["body"]["access_token"], REDACTED);
        assert_eq!(lines[0]["body"]["refresh_token"], REDACTED);
        assert_eq!(lines[0]["body"]["expires_in"], 300);
    }

    #[test]
    fn diffed_mode_logs_full_first_then_changes() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        let body1 = json!({"data": {"zones": [{"devices": [{"temperature_air": "680"}]}]}});
        let body2 = json!({"data": {"zones": [{"devices": [{"temperature_air": "690"}]}]}});
        logger.log_response("smarthome/read/SH1", "/read", 200, &body1);
        logger.log_response("smarthome/read/SH2", "/read", 200, &body1);
        logger.log_response("smarthome/read/SH1", "/read", 200, &body2);

        let lines = read_lines(path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["full"], true);
        assert_eq!(lines[1]["full"], true);
        assert!(!lines[2]["changes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn diffed_mode_no_changes_logs_empty_array() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        let body = json!({"code": {"key": "OK"}, "data": {"smarthomes": []}});
        logger.log_response("user/read", "/user/read", 200, &body);
        logger.log_response("user/read", "/user/read", 200, &body);

        let lines = read_lines(path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["changes"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn log_command_captures_device() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_command("push_setpoint", "D1", &[("query[gv_mode]", "0".to_string())]);

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "cmd");
        assert_eq!(lines[0]["action"], "push_setpoint");
        assert_eq!(lines[0]["device"], "D1");
        assert_eq!(lines[0]["body"]["query[gv_mode]"], "0");
    }
}
