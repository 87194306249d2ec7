//! In-process mock of the condition-search gateway.
//!
//! Accepts WebSocket connections on a random local port, answers `LOGIN`
//! by checking the bearer token and hands every other frame to a scripted
//! handler. All inbound text frames are captured in arrival order.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use kiwoom_condition_client::{AccessToken, GatewayConfig};

/// Token the mock accepts.
pub const TEST_TOKEN: &str = "test-token";

/// One scripted reaction to an inbound frame.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Send a JSON text frame.
    Send(Value),
    /// Send a JSON text frame after a delay.
    After(Duration, Value),
    /// Send a raw text frame.
    Raw(String),
    /// Close the connection.
    Close,
}

type Handler = dyn Fn(&Value) -> Vec<Reply> + Send + Sync;

struct Script {
    before_login: Vec<Value>,
    after_login: Vec<Value>,
    handler: Box<Handler>,
}

impl Script {
    fn respond(&self, frame: &Value) -> Vec<Reply> {
        if trnm(frame) != "LOGIN" {
            return (self.handler)(frame);
        }

        let mut replies: Vec<Reply> =
            self.before_login.iter().cloned().map(Reply::Send).collect();
        if frame["token"] == TEST_TOKEN {
            replies.push(Reply::Send(
                json!({"trnm": "LOGIN", "return_code": 0, "return_msg": ""}),
            ));
            replies.extend(self.after_login.iter().cloned().map(Reply::Send));
        } else {
            replies.push(Reply::Send(
                json!({"trnm": "LOGIN", "return_code": 8005, "return_msg": "Token is invalid"}),
            ));
        }
        replies
    }
}

/// Running mock gateway.
pub struct MockGateway {
    url: String,
    inbound: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<usize>>,
    handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start a gateway that answers non-login frames with `handler`.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Vec<Reply> + Send + Sync + 'static,
    {
        Self::start_with_greeting(Vec::new(), handler).await
    }

    /// Start a gateway that also pushes `after_login` frames right after
    /// every successful login acknowledgement.
    pub async fn start_with_greeting<F>(after_login: Vec<Value>, handler: F) -> Self
    where
        F: Fn(&Value) -> Vec<Reply> + Send + Sync + 'static,
    {
        Self::start_scripted(Vec::new(), after_login, handler).await
    }

    /// Start a gateway that pushes `before_login` frames ahead of every login
    /// acknowledgement and `after_login` frames right after a successful one.
    pub async fn start_scripted<F>(
        before_login: Vec<Value>,
        after_login: Vec<Value>,
        handler: F,
    ) -> Self
    where
        F: Fn(&Value) -> Vec<Reply> + Send + Sync + 'static,
    {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script = Arc::new(Script {
            before_login,
            after_login,
            handler: Box::new(handler),
        });
        let inbound = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));

        let handle = {
            let inbound = Arc::clone(&inbound);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    *connections.lock() += 1;
                    tokio::spawn(serve(stream, Arc::clone(&script), Arc::clone(&inbound)));
                }
            })
        };

        Self {
            url: format!("ws://{addr}"),
            inbound,
            connections,
            handle,
        }
    }

    /// WebSocket URL of the mock.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Client configuration pointing at the mock with the valid token.
    pub fn config(&self) -> GatewayConfig {
        GatewayConfig::new(self.url.clone(), AccessToken::new(TEST_TOKEN).unwrap())
    }

    /// Raw inbound text frames so far.
    pub fn received(&self) -> Vec<String> {
        self.inbound.lock().clone()
    }

    /// Inbound frames with the given tag, parsed.
    pub fn received_with(&self, tag: &str) -> Vec<Value> {
        self.received()
            .iter()
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .filter(|frame| trnm(frame) == tag)
            .collect()
    }

    /// Wait until a frame with the given tag arrives.
    pub async fn wait_for(&self, tag: &str, max_wait: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if let Some(frame) = self.received_with(tag).into_iter().next() {
                return Some(frame);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        *self.connections.lock()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(stream: TcpStream, script: Arc<Script>, inbound: Arc<Mutex<Vec<String>>>) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut tx, mut rx) = ws.split();

    while let Some(Ok(msg)) = rx.next().await {
        let text = match msg {
            Message::Text(text) => text.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };
        inbound.lock().push(text.clone());

        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        for reply in script.respond(&frame) {
            let outbound = match reply {
                Reply::Send(value) => value.to_string(),
                Reply::After(delay, value) => {
                    tokio::time::sleep(delay).await;
                    value.to_string()
                }
                Reply::Raw(text) => text,
                Reply::Close => {
                    let _ = tx.send(Message::Close(None)).await;
                    return;
                }
            };
            if tx.send(Message::Text(outbound.into())).await.is_err() {
                return;
            }
        }
    }
}

/// Message tag of a frame.
pub fn trnm(frame: &Value) -> &str {
    frame["trnm"].as_str().unwrap_or_default()
}

/// Condition list response.
pub fn list_response(conditions: &[(&str, &str)]) -> Value {
    let data: Vec<Value> = conditions.iter().map(|(id, name)| json!([id, name])).collect();
    json!({"trnm": "CNSRLST", "return_code": 0, "return_msg": "", "data": data})
}

/// Search response for `seq` with the given rows.
pub fn search_response(seq: &str, rows: Vec<Value>, next_key: &str) -> Value {
    json!({
        "trnm": "CNSRREQ",
        "seq": seq,
        "return_code": 0,
        "return_msg": "",
        "cont_yn": if next_key.is_empty() { "N" } else { "Y" },
        "next_key": next_key,
        "data": rows,
    })
}

/// One result row.
pub fn row(code: &str, name: &str, price: &str) -> Value {
    json!({"9001": code, "302": name, "10": price, "25": "2"})
}
