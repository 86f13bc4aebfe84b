use crate::{
    config::GatewayConfig,
    cors::RequestOrigin,
    error::GatewayError,
    relay::RelayClient,
    turnstile::TurnstileVerifier,
};
use contact_form::{ContactFormSubmission, ForwardedSubmission, Reply};
use lambda_http::{
    http::{
        header::{CONTENT_TYPE, USER_AGENT},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    Body, Error, Request, Response,
};
use reqwest::Client;
use tracing::info;

const CF_CONNECTING_IP: &str = "cf-connecting-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Public entry point for the contact form. Screens browser submissions and
/// forwards the survivors to the mail relay.
pub struct EdgeGateway {
    config: GatewayConfig,
    relay: RelayClient,
    verifier: Option<TurnstileVerifier>,
}

impl EdgeGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::new();
        let relay = RelayClient::new(client.clone(), config.relay_url.clone());
        let verifier = config
            .turnstile
            .clone()
            .map(|turnstile| TurnstileVerifier::new(client, turnstile));
        Self {
            config,
            relay,
            verifier,
        }
    }

    pub async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        let origin = self.config.allowed_origins.classify(event.headers());
        if event.method() == Method::OPTIONS {
            return Ok(preflight_response(origin));
        }
        let (status, reply) = match self.process(&event, origin).await {
            Ok(()) => (StatusCode::OK, Reply::success()),
            Err(error) => {
                error.log();
                (error.status(), error.reply())
            }
        };
        Ok(json_response(status, origin, &reply))
    }

    async fn process(&self, event: &Request, origin: RequestOrigin<'_>) -> Result<(), GatewayError> {
        if event.method() != Method::POST {
            return Err(GatewayError::MethodNotAllowed);
        }
        if origin == RequestOrigin::Disallowed {
            return Err(GatewayError::OriginNotAllowed);
        }
        let submission: ContactFormSubmission =
            serde_json::from_slice(event.body()).map_err(GatewayError::InvalidJson)?;
        let contact = submission.fields.validate()?;
        let ip = client_ip(event.headers());

        if let Some(verifier) = &self.verifier {
            let token = submission.turnstile_token();
            if token.is_empty() {
                return Err(GatewayError::MissingCaptchaToken);
            }
            verifier
                .verify_token(token, ip)
                .await
                .map_err(GatewayError::CaptchaFailed)?;
        }

        let forwarded = ForwardedSubmission {
            fields: contact.to_fields(),
            secret: Some(self.config.shared_secret.clone()),
            ip: Some(ip.into()),
            ua: Some(header_str(event.headers(), USER_AGENT.as_str()).unwrap_or_default().into()),
        };
        self.relay.forward(&forwarded).await?;
        info!(kind = contact.kind, "Forwarded contact form submission");
        Ok(())
    }
}

/// The caller's address as reported by Cloudflare, falling back to the first
/// hop of `X-Forwarded-For`.
fn client_ip(headers: &HeaderMap) -> &str {
    header_str(headers, CF_CONNECTING_IP)
        .or_else(|| {
            header_str(headers, X_FORWARDED_FOR)
                .and_then(|forwarded| forwarded.split(',').next())
                .map(str::trim)
        })
        .unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn preflight_response(origin: RequestOrigin) -> Response<Body> {
    let mut response = Response::new(Body::Empty);
    *response.status_mut() = StatusCode::NO_CONTENT;
    response.headers_mut().extend(origin.response_headers());
    response
}

fn json_response(status: StatusCode, origin: RequestOrigin, reply: &Reply) -> Response<Body> {
    let mut response = Response::new(Body::Text(reply.to_json()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.extend(origin.response_headers());
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
