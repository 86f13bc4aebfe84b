use crate::serve;
use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
};

const VERIFY_PATH: &str = "/turnstile/v0/siteverify";

/// Stand-in for Cloudflare's Turnstile siteverify endpoint.
#[derive(Clone)]
pub struct FakeTurnstile {
    required_secret: Cow<'static, str>,
    required_token: Option<String>,
    return_invalid_response: bool,
    return_server_error: bool,
    requests: Arc<Mutex<Vec<VerifyRequest>>>,
}

/// A verification request as received by the fake.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct VerifyRequest {
    pub secret: String,
    pub response: String,
    #[serde(default)]
    pub remoteip: String,
}

#[derive(Serialize)]
struct VerifyResponsePayload {
    success: bool,
    #[serde(rename = "error-codes")]
    error_codes: Vec<String>,
}

impl FakeTurnstile {
    pub fn new(required_secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_secret: required_secret.into(),
            required_token: None,
            return_invalid_response: false,
            return_server_error: false,
            requests: Default::default(),
        }
    }

    pub fn require_token(self, required_token: impl AsRef<str>) -> Self {
        Self {
            required_token: Some(required_token.as_ref().into()),
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            return_invalid_response: true,
            ..self
        }
    }

    pub fn return_server_error(self) -> Self {
        Self {
            return_server_error: true,
            ..self
        }
    }

    /// Serves the fake on an ephemeral port and returns its verify URL.
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route(VERIFY_PATH, post(verify))
            .with_state(self.clone());
        let addr = serve(app).await;
        format!("http://{addr}{VERIFY_PATH}")
    }

    pub fn received(&self) -> Vec<VerifyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn verify(
    State(state): State<FakeTurnstile>,
    Form(request): Form<VerifyRequest>,
) -> Response {
    state.requests.lock().unwrap().push(request.clone());
    if state.return_server_error {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
    } else if state.return_invalid_response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            "Invalid response",
        )
            .into_response()
    } else if request.secret != state.required_secret {
        outcome(false, "invalid-input-secret")
    } else if state
        .required_token
        .as_ref()
        .is_some_and(|token| *token != request.response)
    {
        outcome(false, "invalid-input-response")
    } else {
        outcome(true, "")
    }
}

fn outcome(success: bool, error_code: &str) -> Response {
    let error_codes = if error_code.is_empty() {
        vec![]
    } else {
        vec![error_code.into()]
    };
    Json(VerifyResponsePayload {
        success,
        error_codes,
    })
    .into_response()
}
