use log::debug;
use mailin_embedded::{Handler, Server, SslConfig};
use std::{net::IpAddr, sync::Arc, time::Duration};
use tokio::{
    sync::watch::{self, error::RecvError, Receiver, Sender},
    time::timeout,
};

pub const SMTP_PORT: u16 = 4567;
pub const POISONED_SMTP_PORT: u16 = 4568;

const SERVER_NAME: &str = "relay.test";

#[derive(Clone)]
struct SmtpHandler {
    data: Vec<u8>,
    messages: Arc<Sender<String>>,
}

impl Handler for SmtpHandler {
    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.data.extend(buf);
        Ok(())
    }

    fn data_end(&mut self) -> mailin_embedded::Response {
        let content = String::from_utf8_lossy(&self.data).into_owned();
        debug!("Got mail:\n{content}");
        self.data.clear();
        let _ = self.messages.send(content);
        mailin_embedded::response::OK
    }
}

/// An SMTP server on [`SMTP_PORT`] which accepts every message and exposes
/// the most recent one.
pub struct FakeSmtpServer {
    server: std::sync::Mutex<Option<Server<SmtpHandler>>>,
    messages: tokio::sync::Mutex<Receiver<String>>,
}

impl FakeSmtpServer {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(String::new());
        let handler = SmtpHandler {
            data: Vec::new(),
            messages: Arc::new(sender),
        };
        let mut server = Server::new(handler);
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .unwrap()
            .with_addr(format!("127.0.0.1:{SMTP_PORT}"))
            .unwrap();
        Self {
            server: std::sync::Mutex::new(Some(server)),
            messages: tokio::sync::Mutex::new(receiver),
        }
    }

    /// Starts serving on a background thread. Later calls do nothing.
    pub fn start(&self) {
        if let Some(server) = self.server.lock().unwrap().take() {
            std::thread::spawn(move || {
                let _ = server.serve();
            });
        }
    }

    /// Waits for the next message and returns its raw content, headers
    /// included.
    pub async fn last_mail_content(&self) -> Result<String, RecvError> {
        let mut receiver = self.messages.lock().await;
        receiver.changed().await?;
        let content = receiver.borrow_and_update().clone();
        Ok(content)
    }

    /// Discards any message which has not been read yet.
    pub async fn flush(&self) {
        let mut receiver = self.messages.lock().await;
        let _ = timeout(Duration::from_millis(100), receiver.changed()).await;
        receiver.borrow_and_update();
    }
}

impl Default for FakeSmtpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct PoisonedSmtpHandler;

impl Handler for PoisonedSmtpHandler {
    fn helo(&mut self, _ip: IpAddr, _domain: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, _from: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }
}

/// Starts an SMTP server on [`POISONED_SMTP_PORT`] which rejects every
/// session.
pub fn start_poisoned_smtp_server() {
    static STARTED: std::sync::Once = std::sync::Once::new();
    STARTED.call_once(|| {
        let mut server = Server::new(PoisonedSmtpHandler);
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .unwrap()
            .with_addr(format!("127.0.0.1:{POISONED_SMTP_PORT}"))
            .unwrap();
        std::thread::spawn(move || {
            let _ = server.serve();
        });
    });
}
