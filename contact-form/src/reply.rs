use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON body returned by both the gateway and the relay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whatever the relay answered, attached by the gateway when forwarding
    /// fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Value>,
}

impl Reply {
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
            upstream: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            upstream: None,
        }
    }

    pub fn with_upstream(self, upstream: Value) -> Self {
        Self {
            upstream: Some(upstream),
            ..self
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"ok":false}"#.into())
    }
}
