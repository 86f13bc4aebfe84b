pub mod fake_relay;
pub mod fake_smtp;
pub mod fake_turnstile;
pub mod lambda_bridge;

use axum::Router;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::{net::SocketAddr, sync::Once};
use tokio::net::TcpListener;

/// Routes `log` (and `tracing`, through its `log` feature) to the terminal.
/// Safe to call from every test.
pub fn setup_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = TermLogger::init(
            LevelFilter::Debug,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        );
    });
}

/// Serves `app` on an ephemeral local port for the rest of the test.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
