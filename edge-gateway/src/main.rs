use edge_gateway::{EdgeGateway, GatewayConfig};
use lambda_http::{run, service_fn, Error};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = GatewayConfig::from_env()?;
    info!(
        captcha = config.turnstile.is_some(),
        "Starting contact form gateway"
    );
    let handler = EdgeGateway::new(config);
    run(service_fn(|event| handler.handle(event))).await
}
