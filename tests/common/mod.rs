//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;

use tls_policyd::net::Listener;
use tls_policyd::{PolicyServer, PolicydConfig, Shutdown};

/// A policy server running on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server on `127.0.0.1:0` with the rest of `config`.
    pub async fn start(mut config: PolicydConfig) -> Self {
        config.listener.address = "127.0.0.1:0".to_string();
        let listener = Listener::bind(&config.listener).await.unwrap();
        Self::serve(listener, &config)
    }

    /// Run a server on an already bound listener.
    pub fn serve(listener: Listener, config: &PolicydConfig) -> Self {
        let addr = listener
            .tcp_addr()
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(PolicyServer::new(config).run(listener, shutdown.clone()));
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    pub async fn connect(&self) -> PolicyClient<TcpStream> {
        PolicyClient::new(TcpStream::connect(self.addr).await.unwrap())
    }

    /// Trigger shutdown and wait for the server to finish draining.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should drain")
            .unwrap();
    }
}

/// Minimal line-protocol client.
pub struct PolicyClient<S> {
    stream: BufReader<S>,
}

impl<S> PolicyClient<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    pub async fn send(&mut self, data: &str) {
        self.send_bytes(data.as_bytes()).await;
    }

    pub async fn send_bytes(&mut self, data: &[u8]) {
        self.stream.get_mut().write_all(data).await.unwrap();
    }

    /// Read one `action=...` reply including its blank line.
    pub async fn reply(&mut self) -> String {
        let mut reply = String::new();
        for _ in 0..2 {
            let read = tokio::time::timeout(Duration::from_secs(2), self.stream.read_line(&mut reply))
                .await
                .expect("reply should arrive")
                .unwrap();
            assert!(read > 0, "connection closed mid-reply: {:?}", reply);
        }
        reply
    }

    /// Send one request and return the reply.
    pub async fn request(&mut self, lines: &[&str]) -> String {
        let mut data = String::new();
        for line in lines {
            data.push_str(line);
            data.push('\n');
        }
        data.push('\n');
        self.send(&data).await;
        self.reply().await
    }

    /// Wait for the server to end the stream, returning anything still unread.
    pub async fn closed(&mut self) -> String {
        let mut rest = String::new();
        loop {
            let read = tokio::time::timeout(Duration::from_secs(2), self.stream.read_line(&mut rest))
                .await
                .expect("server should close the connection");
            match read {
                Ok(0) | Err(_) => return rest,
                Ok(_) => continue,
            }
        }
    }
}

/// Log output captured from a thread-local subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Install a capturing subscriber for the current thread.
    ///
    /// Under the default single-threaded `#[tokio::test]` runtime every
    /// spawned task runs on this thread, so their events land here too.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }
}

pub struct CapturedWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for CapturedWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter {
            buf: Arc::clone(&self.buf),
        }
    }
}
