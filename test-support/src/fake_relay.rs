use crate::serve;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Stand-in for the mail relay, answering every POST with a canned reply and
/// recording what it was sent.
#[derive(Clone)]
pub struct FakeRelay {
    status: StatusCode,
    body: String,
    received: Arc<Mutex<Vec<Value>>>,
}

impl FakeRelay {
    /// A relay which accepts everything with `200 {"ok":true}`.
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            body: r#"{"ok":true}"#.into(),
            received: Default::default(),
        }
    }

    pub fn respond_with(self, status: u16, body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.into(),
            ..self
        }
    }

    /// Serves the fake on an ephemeral port and returns its URL.
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/", post(relay))
            .with_state(self.clone());
        let addr = serve(app).await;
        format!("http://{addr}/")
    }

    /// Payloads received so far, in order. Bodies which are not JSON are
    /// recorded as strings.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }
}

impl Default for FakeRelay {
    fn default() -> Self {
        Self::new()
    }
}

async fn relay(State(state): State<FakeRelay>, body: String) -> Response {
    let payload = serde_json::from_str(&body).unwrap_or(Value::String(body));
    state.received.lock().unwrap().push(payload);
    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body.clone(),
    )
        .into_response()
}
