use lambda_http::{run, service_fn, Error};
use mail_relay::{
    secrets::{AwsSecretsManagerSecretRepository, InMemorySecretRepository, SmtpCredentials},
    MailRelay, RelayConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = RelayConfig::from_env()?;

    if let Some(credentials) = SmtpCredentials::from_env() {
        info!("Using SMTP credentials from the environment");
        let secrets_repository = InMemorySecretRepository::with_smtp_credentials(
            &config.smtp_credentials_secret,
            &credentials,
        );
        let handler = MailRelay::new(config, secrets_repository);
        run(service_fn(|event| handler.handle(event))).await
    } else {
        let secrets_repository = AwsSecretsManagerSecretRepository::open().await;
        let handler = MailRelay::new(config, secrets_repository);
        run(service_fn(|event| handler.handle(event))).await
    }
}
