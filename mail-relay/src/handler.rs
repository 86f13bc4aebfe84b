use crate::{
    config::RelayConfig,
    error::RelayError,
    notification::{render_body, render_subject, Origin},
    secrets::{SecretRepository, SmtpCredentials},
};
use async_once_cell::OnceCell;
use chrono::Utc;
use contact_form::{ForwardedSubmission, Reply, ValidatedContact};
use lambda_http::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    Body, Error, Request, Response,
};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::{Credentials, Mechanism},
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use subtle::ConstantTimeEq;
use tracing::info;

/// Receives submissions forwarded by the edge gateway and emails them to the
/// site owner.
///
/// Every request gets HTTP 200; callers must inspect the `ok` flag of the
/// JSON reply.
pub struct MailRelay<SecretRepositoryT: SecretRepository> {
    config: RelayConfig,
    secrets_repository: SecretRepositoryT,
    mailer: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

impl<SecretRepositoryT: SecretRepository> MailRelay<SecretRepositoryT> {
    pub fn new(config: RelayConfig, secrets_repository: SecretRepositoryT) -> Self {
        Self {
            config,
            secrets_repository,
            mailer: Default::default(),
        }
    }

    pub async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        let outcome = if event.method() == Method::POST {
            self.relay(event.body()).await
        } else {
            Err(RelayError::MethodNotAllowed)
        };
        let reply = match outcome {
            Ok(()) => Reply::success(),
            Err(error) => {
                error.log();
                error.into_reply()
            }
        };
        Ok(json_response(&reply))
    }

    async fn relay(&self, body: &[u8]) -> Result<(), RelayError> {
        if body.is_empty() {
            return Err(RelayError::MissingBody);
        }
        let submission: ForwardedSubmission = serde_json::from_slice(body)?;
        self.authorize(&submission)?;
        let contact = submission.fields.validate()?;
        let origin = Origin {
            ip: submission.ip.as_deref(),
            user_agent: submission.ua.as_deref(),
        };
        let email = self.construct_email_message(&contact, origin)?;
        self.send_email(email).await?;
        info!(kind = contact.kind, "Relayed contact form message");
        Ok(())
    }

    fn authorize(&self, submission: &ForwardedSubmission) -> Result<(), RelayError> {
        let presented = submission.secret.as_deref().unwrap_or_default();
        let expected = self.config.shared_secret.as_str();
        if presented.is_empty() || !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(RelayError::Unauthorized);
        }
        Ok(())
    }

    fn construct_email_message(
        &self,
        contact: &ValidatedContact,
        origin: Origin,
    ) -> Result<Message, RelayError> {
        let address: Address = contact.email.parse().map_err(RelayError::InvalidAddress)?;
        let reply_to = Mailbox::new(Some(contact.name.into()), address);
        let body = render_body(contact, origin, Utc::now())?;
        Ok(Message::builder()
            .from(self.config.from_mailbox.clone())
            .reply_to(reply_to)
            .to(self.config.to_mailbox.clone())
            .subject(render_subject(contact))
            .header(ContentType::TEXT_PLAIN)
            .body(body)?)
    }

    async fn send_email(&self, email: Message) -> Result<(), RelayError> {
        let mailer = self
            .mailer
            .get_or_try_init(self.initialise_mailer())
            .await?;
        mailer.send(email).await.map_err(RelayError::Send)?;
        Ok(())
    }

    async fn initialise_mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, RelayError> {
        let credentials = if self.config.smtp_requires_credentials() {
            let credentials: SmtpCredentials = self
                .secrets_repository
                .get_secret(&self.config.smtp_credentials_secret)
                .await?;
            Some(Credentials::new(credentials.username, credentials.password))
        } else {
            None
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&self.config.smtp_url)
            .map_err(RelayError::Transport)?
            .authentication(vec![Mechanism::Plain]);
        if let Some(credentials) = credentials {
            builder = builder.credentials(credentials);
        }

        info!("SMTP transport ready");
        Ok(builder.build())
    }
}

fn json_response(reply: &Reply) -> Response<Body> {
    let mut response = Response::new(Body::Text(reply.to_json()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::MailRelay;
    use crate::{
        config::RelayConfig,
        secrets::{InMemorySecretRepository, SecretError, SecretRepository},
    };
    use async_trait::async_trait;
    use contact_form::{ContactFields, ForwardedSubmission, Reply, MAX_MESSAGE_LENGTH};
    use googletest::prelude::*;
    use lambda_http::{
        http::{Method, Response},
        Body, Request,
    };
    use serde::de::DeserializeOwned;
    use serial_test::serial;
    use std::{
        sync::{Arc, Mutex, OnceLock},
        time::Duration,
    };
    use test_support::{
        fake_smtp::{start_poisoned_smtp_server, FakeSmtpServer, POISONED_SMTP_PORT, SMTP_PORT},
        setup_logging,
    };
    use tokio::time::timeout;

    type MailRelayForTesting = MailRelay<InMemorySecretRepository>;

    const SHARED_SECRET: &str = "correct shared secret";

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn sends_mail_to_recipient() {
        init().await;
        let subject = relay_with_smtp_url(format!("smtp://localhost:{SMTP_PORT}"));

        let response = subject
            .handle(EventPayload::arbitrary().into_event())
            .await
            .unwrap();

        expect_that!(response.status().as_u16(), eq(200));
        expect_that!(
            response.headers().get("Content-Type"),
            some(eq("application/json"))
        );
        expect_that!(reply_of(response), eq(Reply::success()));
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
            ok(ok(all!(
                contains_substring("To: \"Site owner\" <owner@example.com>"),
                contains_substring("From: \"Web contact form\" <noreply@example.com>"),
                contains_substring("Reply-To: \"Arbitrary sender\" <email@example.com>"),
                contains_substring("Subject: [Website Form] Arbitrary sender"),
                contains_substring("Company: Arbitrary company"),
                contains_substring("Type: Consulting"),
                contains_substring("Test message"),
                contains_substring("IP: 203.0.113.7"),
                contains_substring("User-Agent: Test agent")
            )))
        );
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn uses_placeholders_for_absent_optional_fields() {
        init().await;
        let subject = relay();
        let event = EventPayload::arbitrary()
            .with_company(None)
            .with_kind(None)
            .with_origin(None, None)
            .into_event();

        let response = subject.handle(event).await.unwrap();

        expect_that!(reply_of(response), eq(Reply::success()));
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
            ok(ok(all!(
                contains_substring("Company: -"),
                contains_substring("Type: -"),
                contains_substring("IP: unknown"),
                contains_substring("User-Agent: unknown")
            )))
        );
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn trims_fields_before_sending() {
        init().await;
        let subject = relay();
        let event = EventPayload::arbitrary()
            .with_name("  Padded sender  ")
            .into_event();

        subject.handle(event).await.unwrap();

        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
            ok(ok(contains_substring("Subject: [Website Form] Padded sender\r\n")))
        );
    }

    #[tokio::test]
    #[serial]
    async fn reports_missing_body() -> Result<()> {
        init().await;
        let mut event = Request::new(Body::Empty);
        *event.method_mut() = Method::POST;

        let response = relay().handle(event).await.unwrap();

        verify_that!(response.status().as_u16(), eq(200))?;
        verify_that!(reply_of(response), eq(Reply::failure("Missing body")))
    }

    #[tokio::test]
    #[serial]
    async fn reports_parse_error_for_invalid_json() -> Result<()> {
        init().await;
        let mut event = Request::new(Body::Text("not json".into()));
        *event.method_mut() = Method::POST;

        let response = relay().handle(event).await.unwrap();

        verify_that!(response.status().as_u16(), eq(200))?;
        verify_that!(
            reply_of(response),
            matches_pattern!(Reply {
                ok: eq(false),
                error: some(contains_substring("line 1 column")),
            })
        )
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn rejects_wrong_secret_without_sending() {
        init().await;
        let event = EventPayload::arbitrary()
            .with_secret(Some("wrong secret"))
            .into_event();

        let response = relay().handle(event).await.unwrap();

        expect_that!(response.status().as_u16(), eq(200));
        expect_that!(reply_of(response), eq(Reply::failure("Unauthorized")));
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
            err(anything())
        );
    }

    #[tokio::test]
    #[serial]
    async fn rejects_missing_secret() -> Result<()> {
        init().await;
        let event = EventPayload::arbitrary().with_secret(None).into_event();

        let response = relay().handle(event).await.unwrap();

        verify_that!(reply_of(response), eq(Reply::failure("Unauthorized")))
    }

    #[tokio::test]
    #[serial]
    async fn checks_secret_before_fields() -> Result<()> {
        init().await;
        let event = EventPayload::arbitrary()
            .with_secret(Some("wrong secret"))
            .with_message("")
            .into_event();

        let response = relay().handle(event).await.unwrap();

        verify_that!(reply_of(response), eq(Reply::failure("Unauthorized")))
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn rejects_missing_required_fields_without_sending() {
        init().await;
        let event = EventPayload::arbitrary().with_email("   ").into_event();

        let response = relay().handle(event).await.unwrap();

        expect_that!(
            reply_of(response),
            eq(Reply::failure("Missing required fields"))
        );
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
            err(anything())
        );
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn rejects_long_message_without_sending() {
        init().await;
        let event = EventPayload::arbitrary()
            .with_message("x".repeat(MAX_MESSAGE_LENGTH + 1))
            .into_event();

        let response = relay().handle(event).await.unwrap();

        expect_that!(reply_of(response), eq(Reply::failure("Message too long")));
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
            err(anything())
        );
    }

    #[tokio::test]
    #[serial]
    async fn reports_unusable_reply_to_address() -> Result<()> {
        init().await;
        let event = EventPayload::arbitrary()
            .with_email("not an address")
            .into_event();

        let response = relay().handle(event).await.unwrap();

        verify_that!(
            reply_of(response),
            matches_pattern!(Reply {
                ok: eq(false),
                error: some(all!(
                    starts_with("Invalid email address"),
                    not(contains_substring("not an address"))
                )),
            })
        )
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn rejects_methods_other_than_post_without_sending() {
        init().await;
        let mut event = EventPayload::arbitrary().into_event();
        *event.method_mut() = Method::GET;

        let response = relay().handle(event).await.unwrap();

        expect_that!(response.status().as_u16(), eq(200));
        expect_that!(reply_of(response), eq(Reply::failure("Method not allowed")));
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
            err(anything())
        );
    }

    #[tokio::test]
    #[serial]
    async fn reports_missing_credentials_for_smtps() -> Result<()> {
        init().await;
        let subject = MailRelay::new(
            config_with_smtp_url(format!("smtps://localhost:{SMTP_PORT}")),
            InMemorySecretRepository::default(),
        );

        let response = subject
            .handle(EventPayload::arbitrary().into_event())
            .await
            .unwrap();

        verify_that!(
            reply_of(response),
            eq(Reply::failure(
                "Unable to retrieve SMTP credentials: Missing secret smtp-credentials"
            ))
        )
    }

    #[tokio::test]
    #[serial]
    async fn retries_credentials_lookup_after_failure() -> Result<()> {
        init().await;
        let secrets = FillableSecretRepository::default();
        let subject = MailRelay::new(
            config_with_smtp_url(format!("smtps://localhost:{SMTP_PORT}")),
            secrets.clone(),
        );
        let first = subject
            .handle(EventPayload::arbitrary().into_event())
            .await
            .unwrap();
        secrets.add_secret("smtp-credentials", "not json");

        let second = subject
            .handle(EventPayload::arbitrary().into_event())
            .await
            .unwrap();

        verify_that!(
            reply_of(first).error,
            some(ends_with("Missing secret smtp-credentials"))
        )?;
        verify_that!(
            reply_of(second).error,
            some(starts_with(
                "Unable to retrieve SMTP credentials: Malformed secret smtp-credentials"
            ))
        )
    }

    /// Lets a test change the stored secrets after handing the repository to
    /// the relay.
    #[derive(Clone, Default)]
    struct FillableSecretRepository(Arc<Mutex<InMemorySecretRepository>>);

    impl FillableSecretRepository {
        fn add_secret(&self, name: &str, value: &str) {
            self.0.lock().unwrap().add_secret(name, value);
        }
    }

    #[async_trait]
    impl SecretRepository for FillableSecretRepository {
        async fn get_secret<T: DeserializeOwned>(
            &self,
            name: &str,
        ) -> std::result::Result<T, SecretError> {
            let snapshot = self.0.lock().unwrap().clone();
            snapshot.get_secret(name).await
        }
    }

    #[tokio::test]
    #[serial]
    async fn reports_failure_when_smtp_fails() -> Result<()> {
        init().await;
        start_poisoned_smtp_server();
        let subject = relay_with_smtp_url(format!("smtp://localhost:{POISONED_SMTP_PORT}"));

        let response = subject
            .handle(EventPayload::arbitrary().into_event())
            .await
            .unwrap();

        verify_that!(response.status().as_u16(), eq(200))?;
        verify_that!(
            reply_of(response),
            matches_pattern!(Reply {
                ok: eq(false),
                error: some(starts_with("Error sending message")),
            })
        )
    }

    #[tokio::test]
    #[serial]
    async fn reports_failure_when_connection_to_mail_server_fails() -> Result<()> {
        init().await;
        let subject = relay_with_smtp_url("smtp://nonexistent.host.internal".into());

        let response = subject
            .handle(EventPayload::arbitrary().into_event())
            .await
            .unwrap();

        verify_that!(
            reply_of(response),
            matches_pattern!(Reply {
                ok: eq(false),
                error: some(starts_with("Error sending message")),
            })
        )
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn sends_second_message_over_same_transport() {
        init().await;
        let subject = relay();
        subject
            .handle(EventPayload::arbitrary().into_event())
            .await
            .unwrap();
        fake_smtp().flush().await;

        let response = subject
            .handle(
                EventPayload::arbitrary()
                    .with_message("Second message")
                    .into_event(),
            )
            .await
            .unwrap();

        expect_that!(reply_of(response), eq(Reply::success()));
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
            ok(ok(contains_substring("Second message")))
        );
    }

    async fn init() {
        setup_logging();
        fake_smtp().start();
        fake_smtp().flush().await;
    }

    fn relay() -> MailRelayForTesting {
        relay_with_smtp_url(format!("smtp://localhost:{SMTP_PORT}"))
    }

    fn relay_with_smtp_url(smtp_url: String) -> MailRelayForTesting {
        MailRelay::new(
            config_with_smtp_url(smtp_url),
            InMemorySecretRepository::default(),
        )
    }

    fn config_with_smtp_url(smtp_url: String) -> RelayConfig {
        RelayConfig {
            shared_secret: SHARED_SECRET.into(),
            to_mailbox: "Site owner <owner@example.com>".parse().unwrap(),
            from_mailbox: "Web contact form <noreply@example.com>".parse().unwrap(),
            smtp_url,
            smtp_credentials_secret: "smtp-credentials".into(),
        }
    }

    fn reply_of(response: Response<Body>) -> Reply {
        serde_json::from_slice(response.body()).unwrap()
    }

    struct EventPayload(ForwardedSubmission);

    impl EventPayload {
        fn arbitrary() -> Self {
            Self(ForwardedSubmission {
                fields: ContactFields {
                    name: Some("Arbitrary sender".into()),
                    email: Some("email@example.com".into()),
                    company: Some("Arbitrary company".into()),
                    kind: Some("Consulting".into()),
                    message: Some("Test message".into()),
                },
                secret: Some(SHARED_SECRET.into()),
                ip: Some("203.0.113.7".into()),
                ua: Some("Test agent".into()),
            })
        }

        fn with_name(mut self, name: impl Into<String>) -> Self {
            self.0.fields.name = Some(name.into());
            self
        }

        fn with_email(mut self, email: impl Into<String>) -> Self {
            self.0.fields.email = Some(email.into());
            self
        }

        fn with_message(mut self, message: impl Into<String>) -> Self {
            self.0.fields.message = Some(message.into());
            self
        }

        fn with_company(mut self, company: Option<&str>) -> Self {
            self.0.fields.company = company.map(Into::into);
            self
        }

        fn with_kind(mut self, kind: Option<&str>) -> Self {
            self.0.fields.kind = kind.map(Into::into);
            self
        }

        fn with_secret(mut self, secret: Option<&str>) -> Self {
            self.0.secret = secret.map(Into::into);
            self
        }

        fn with_origin(mut self, ip: Option<&str>, ua: Option<&str>) -> Self {
            self.0.ip = ip.map(Into::into);
            self.0.ua = ua.map(Into::into);
            self
        }

        fn into_event(self) -> Request {
            let mut event = Request::new(Body::Text(serde_json::to_string(&self.0).unwrap()));
            *event.method_mut() = Method::POST;
            event
        }
    }

    fn fake_smtp() -> &'static FakeSmtpServer {
        static FAKE_SMTP: OnceLock<FakeSmtpServer> = OnceLock::new();
        FAKE_SMTP.get_or_init(FakeSmtpServer::new)
    }
}
