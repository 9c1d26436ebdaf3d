//! 传输帧：`data: <JSON>\n\n`，type 为 status / chunk / done / error

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::react::StatusUpdate;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Status { message: String, timestamp: String },
    Chunk { content: Value, timestamp: String },
    Done,
    Error { error: String },
}

impl Frame {
    /// 附加当前时间戳
    pub fn from_update(update: StatusUpdate) -> Self {
        match update {
            StatusUpdate::Status { message } => Frame::Status {
                message,
                timestamp: now_rfc3339(),
            },
            StatusUpdate::Chunk { content } => Frame::Chunk {
                content,
                timestamp: now_rfc3339(),
            },
            StatusUpdate::Done => Frame::Done,
            StatusUpdate::Error { error } => Frame::Error { error },
        }
    }

    pub fn error(err: &AgentError) -> Self {
        Frame::Error {
            error: err.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Done | Frame::Error { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "error": e.to_string() }).to_string()
        })
    }

    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

/// RFC 3339，毫秒精度，UTC 以 Z 结尾
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sse_encoding() {
        assert_eq!(Frame::Done.to_sse(), "data: {\"type\":\"done\"}\n\n");
        let f = Frame::Error {
            error: "LLM error: down".into(),
        };
        assert_eq!(
            f.to_sse(),
            "data: {\"type\":\"error\",\"error\":\"LLM error: down\"}\n\n"
        );
    }

    #[test]
    fn test_status_frame_has_timestamp() {
        let f = Frame::from_update(StatusUpdate::Status {
            message: "Agent is thinking...".into(),
        });
        let v: Value = serde_json::from_str(&f.to_json()).unwrap();
        assert_eq!(v["type"], "status");
        assert_eq!(v["message"], "Agent is thinking...");
        let ts = v["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());

        let f = Frame::from_update(StatusUpdate::Chunk {
            content: json!({"event": "agent_event"}),
        });
        assert!(!f.is_terminal());
        assert!(Frame::Done.is_terminal());
    }
}
