//! Shared test doubles: a scriptable gateway transport and a canned-response
//! HTTP stub for the REST API.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use sync_client::error::SyncError;
use sync_client::gateway::events::{ClientMessage, ServerMessage, OP_DISPATCH};
use sync_client::gateway::transport::{Transport, TransportSink, TransportSource};

// ---------------------------------------------------------------------------
// Mock gateway transport
// ---------------------------------------------------------------------------

struct MockConn {
    tx: Option<mpsc::UnboundedSender<ServerMessage>>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
}

/// A gateway transport the test script drives: it can fail upcoming opens,
/// push server messages into any opened connection, and close connections to
/// simulate drops.
#[derive(Default)]
pub struct MockGateway {
    opens: AtomicUsize,
    fail_next: AtomicUsize,
    conns: Mutex<Vec<MockConn>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful opens so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Make the next `n` open attempts fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub async fn wait_for_opens(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.opens() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for gateway opens");
    }

    /// Push a server message into the `index`-th opened connection.
    pub fn push(&self, index: usize, msg: ServerMessage) {
        let conns = self.conns.lock();
        let tx = conns[index].tx.as_ref().expect("connection already closed");
        tx.send(msg).expect("connection loop gone");
    }

    /// Close the `index`-th connection from the server side.
    pub fn close(&self, index: usize) {
        self.conns.lock()[index].tx = None;
    }

    /// Everything the client sent on the `index`-th connection.
    pub fn sent(&self, index: usize) -> Vec<ClientMessage> {
        self.conns.lock()[index].sent.lock().clone()
    }
}

struct MockSink {
    sent: Arc<Mutex<Vec<ClientMessage>>>,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send(&mut self, msg: &ClientMessage) -> Result<(), SyncError> {
        self.sent.lock().push(msg.clone());
        Ok(())
    }

    async fn close(&mut self) {}
}

struct MockSource {
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

#[async_trait]
impl TransportSource for MockSource {
    async fn next(&mut self) -> Option<Result<ServerMessage, SyncError>> {
        self.rx.recv().await.map(Ok)
    }
}

#[async_trait]
impl Transport for MockGateway {
    async fn open(
        &self,
        _url: &str,
        _session_id: &str,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportSource>), SyncError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::Transport("scripted failure".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        self.conns.lock().push(MockConn {
            tx: Some(tx),
            sent: Arc::clone(&sent),
        });
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok((Box::new(MockSink { sent }), Box::new(MockSource { rx })))
    }
}

/// Build a dispatch message the way the gateway server would.
pub fn dispatch(name: &str, data: Value) -> ServerMessage {
    ServerMessage {
        op: OP_DISPATCH,
        t: Some(name.to_string()),
        d: data,
    }
}

// ---------------------------------------------------------------------------
// Stub REST API
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl StubResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type RouteTable = Arc<Mutex<HashMap<String, VecDeque<StubResponse>>>>;
type HitTable = Arc<Mutex<HashMap<String, usize>>>;

/// A minimal HTTP/1.1 server with canned responses per `"METHOD path"` key.
/// A route with several responses serves them in order; the last one
/// repeats. Unknown routes get a 404.
pub struct StubApi {
    pub addr: SocketAddr,
    routes: RouteTable,
    hits: HitTable,
}

impl StubApi {
    pub async fn start(routes: Vec<(&str, Vec<StubResponse>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let routes: RouteTable = Arc::new(Mutex::new(
            routes
                .into_iter()
                .map(|(key, responses)| (key.to_string(), responses.into_iter().collect()))
                .collect(),
        ));
        let hits: HitTable = Arc::new(Mutex::new(HashMap::new()));

        {
            let routes = Arc::clone(&routes);
            let hits = Arc::clone(&hits);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = Arc::clone(&routes);
                    let hits = Arc::clone(&hits);
                    tokio::spawn(async move {
                        let _ = handle_connection(stream, routes, hits).await;
                    });
                }
            });
        }

        Self { addr, routes, hits }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// How many times `"METHOD path"` was requested.
    pub fn hits(&self, key: &str) -> usize {
        *self.hits.lock().get(key).unwrap_or(&0)
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    routes: RouteTable,
    hits: HitTable,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            line.to_ascii_lowercase()
                .strip_prefix("content-length:")
                .and_then(|v| v.trim().parse::<usize>().ok())
        })
        .unwrap_or(0);

    // Drain the body; the stub doesn't inspect it.
    let mut remaining = content_length.saturating_sub(buf.len() - (head_end + 4));
    while remaining > 0 {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        remaining = remaining.saturating_sub(n);
    }

    let mut parts = head.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");
    let key = format!("{method} {path}");
    *hits.lock().entry(key.clone()).or_insert(0) += 1;

    let response = {
        let mut routes = routes.lock();
        match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(StubResponse {
                status: 500,
                body: "{}".to_string(),
                delay: Duration::ZERO,
            }),
            None => StubResponse {
                status: 404,
                body: r#"{"error":"not found"}"#.to_string(),
                delay: Duration::ZERO,
            },
        }
    };

    if response.delay > Duration::ZERO {
        tokio::time::sleep(response.delay).await;
    }

    let reason = match response.status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        _ => "Error",
    };
    let payload = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        reason,
        response.body.len(),
        response.body,
    );
    stream.write_all(payload.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
