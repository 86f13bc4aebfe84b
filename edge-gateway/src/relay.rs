use contact_form::ForwardedSubmission;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const UPSTREAM_FAILED: &str = "Upstream failed";

/// Posts validated submissions to the mail relay.
pub struct RelayClient {
    client: Client,
    url: String,
}

impl RelayClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Succeeds only if the relay answers with a 2xx status *and* a JSON body
    /// whose `ok` field is `true`. The relay may report logical failures with
    /// a 200 status.
    pub async fn forward(&self, submission: &ForwardedSubmission) -> Result<(), RelayFailure> {
        let response = self
            .client
            .post(&self.url)
            .json(submission)
            .send()
            .await
            .map_err(RelayFailure::Unreachable)?;
        let status = response.status();
        let text = response.text().await.map_err(RelayFailure::Unreachable)?;
        let upstream = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));
        if status.is_success() && upstream.get("ok") == Some(&Value::Bool(true)) {
            Ok(())
        } else {
            Err(RelayFailure::Rejected { status, upstream })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayFailure {
    #[error("Could not reach relay: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("Relay rejected submission with status {status}: {upstream}")]
    Rejected { status: StatusCode, upstream: Value },
}

impl RelayFailure {
    /// Message shown to the client: the relay's own error text when it gave
    /// one.
    pub fn client_message(&self) -> &str {
        match self {
            RelayFailure::Unreachable(_) => "Upstream unreachable",
            RelayFailure::Rejected { upstream, .. } => upstream
                .get("error")
                .and_then(Value::as_str)
                .filter(|error| !error.is_empty())
                .unwrap_or(UPSTREAM_FAILED),
        }
    }

    pub fn upstream(&self) -> Option<&Value> {
        match self {
            RelayFailure::Unreachable(_) => None,
            RelayFailure::Rejected { upstream, .. } => Some(upstream),
        }
    }
}
