use serde::Serialize;

/// Outbound control frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Ping,
    GetStatus,
}

impl ControlFrame {
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(text) => text,
            // Unit and string-only variants always serialize.
            Err(_) => String::from("{}"),
        }
    }
}
