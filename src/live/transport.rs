use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::stream::{self, Stream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use reqwest::Url;
use serde_json::{Value, json};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

const ACK_TIMEOUT_SECONDS: u64 = 10;

/// Lazy, non-restartable sequence of subscription payloads (`payload.data` of each frame).
pub type PayloadStream = Pin<Box<dyn Stream<Item = Result<Value, TransportError>> + Send>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("server reported an error: {0}")]
    Server(String),
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("subscription closed by server")]
    Closed,
}

#[async_trait]
pub trait SubscriptionTransport: Send + Sync {
    /// Opens one subscription for `query`. Dropping the stream ends it.
    async fn subscribe(&self, query: &str) -> Result<PayloadStream, TransportError>;
}

/// Frames of the realtime GraphQL protocol we care about.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    ConnectionAck,
    KeepAlive,
    StartAck,
    Data(Value),
    Error(String),
    Complete,
    Unknown(String),
}

pub fn parse_frame(text: &str) -> Frame {
    let frame: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Frame::Unknown(format!("unparseable frame: {}", e)),
    };

    let kind = frame.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "connection_ack" => Frame::ConnectionAck,
        "ka" => Frame::KeepAlive,
        "start_ack" => Frame::StartAck,
        "data" => Frame::Data(
            frame
                .get("payload")
                .and_then(|payload| payload.get("data"))
                .cloned()
                .unwrap_or(Value::Null),
        ),
        "error" | "connection_error" => Frame::Error(
            frame
                .get("payload")
                .map(Value::to_string)
                .unwrap_or_else(|| kind.to_string()),
        ),
        "complete" => Frame::Complete,
        other => Frame::Unknown(other.to_string()),
    }
}

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Realtime endpoint of a hosted GraphQL API, authorised with an API key.
pub struct AppSyncTransport {
    realtime_url: String,
    host: String,
    api_key: String,
}

impl AppSyncTransport {
    pub fn new(realtime_url: String, host: String, api_key: String) -> Self {
        Self {
            realtime_url,
            host,
            api_key,
        }
    }

    fn authorization(&self) -> Value {
        json!({ "host": self.host, "x-api-key": self.api_key })
    }

    fn connect_url(&self) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.realtime_url)
            .map_err(|e| TransportError::Handshake(format!("invalid realtime url {}: {}", self.realtime_url, e)))?;
        let header = BASE64.encode(self.authorization().to_string());
        // payload is base64 for "{}"
        url.query_pairs_mut()
            .append_pair("header", &header)
            .append_pair("payload", "e30=");
        Ok(url)
    }

    async fn await_ack(socket: &mut Socket) -> Result<(), TransportError> {
        loop {
            let next = timeout(Duration::from_secs(ACK_TIMEOUT_SECONDS), socket.next())
                .await
                .map_err(|_| TransportError::Handshake("timed out waiting for connection_ack".to_string()))?;

            match next {
                Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                    Frame::ConnectionAck => return Ok(()),
                    Frame::KeepAlive => continue,
                    Frame::Error(reason) => return Err(TransportError::Handshake(reason)),
                    other => debug!("Ignoring frame before ack: {:?}", other),
                },
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl SubscriptionTransport for AppSyncTransport {
    async fn subscribe(&self, query: &str) -> Result<PayloadStream, TransportError> {
        info!("Connecting to realtime endpoint {}", self.realtime_url);

        let mut request = self.connect_url()?.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("graphql-ws"));

        let (mut socket, _) = connect_async(request).await?;

        socket
            .send(Message::Text(json!({ "type": "connection_init" }).to_string()))
            .await?;
        Self::await_ack(&mut socket).await?;

        let subscription_id = Uuid::new_v4().to_string();
        let start = json!({
            "id": subscription_id,
            "type": "start",
            "payload": {
                "data": serde_json::to_string(&json!({ "query": query, "variables": {} }))?,
                "extensions": { "authorization": self.authorization() },
            },
        });
        socket.send(Message::Text(start.to_string())).await?;
        info!("Subscription {} started", subscription_id);

        // The socket lives in its own task so that dropping the stream sends "stop".
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_frames(socket, subscription_id, tx));

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

async fn pump_frames(
    mut socket: Socket,
    subscription_id: String,
    tx: mpsc::UnboundedSender<Result<Value, TransportError>>,
) {
    loop {
        tokio::select! {
            _ = tx.closed() => {
                info!("Subscription {} dropped by consumer, stopping", subscription_id);
                let stop = json!({ "id": subscription_id, "type": "stop" }).to_string();
                if let Err(e) = socket.send(Message::Text(stop)).await {
                    warn!("Failed to send stop for {}: {}", subscription_id, e);
                }
                let _ = socket.close(None).await;
                break;
            }
            next = socket.next() => {
                match next {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Frame::Data(data) => {
                            if tx.send(Ok(data)).is_err() {
                                break;
                            }
                        }
                        Frame::KeepAlive | Frame::StartAck | Frame::ConnectionAck => {}
                        Frame::Error(reason) => {
                            error!("Subscription {} error: {}", subscription_id, reason);
                            let _ = tx.send(Err(TransportError::Server(reason)));
                            break;
                        }
                        Frame::Complete => {
                            info!("Subscription {} completed by server", subscription_id);
                            break;
                        }
                        Frame::Unknown(kind) => debug!("Ignoring frame: {}", kind),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Realtime socket closed");
                        let _ = tx.send(Err(TransportError::Closed));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = tx.send(Err(e.into()));
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
    use std::sync::Mutex;

    /// Transport fed by a channel: tests push payloads, the bridge consumes them.
    pub struct ChannelTransport {
        rx: Mutex<Option<UnboundedReceiver<Result<Value, TransportError>>>>,
        pub queries: Mutex<Vec<String>>,
    }

    impl ChannelTransport {
        pub fn new() -> (Self, UnboundedSender<Result<Value, TransportError>>) {
            let (tx, rx) = unbounded();
            let transport = Self {
                rx: Mutex::new(Some(rx)),
                queries: Mutex::new(Vec::new()),
            };
            (transport, tx)
        }
    }

    #[async_trait]
    impl SubscriptionTransport for ChannelTransport {
        async fn subscribe(&self, query: &str) -> Result<PayloadStream, TransportError> {
            self.queries.lock().unwrap().push(query.to_string());
            let rx = self.rx.lock().unwrap().take().ok_or(TransportError::Closed)?;
            Ok(Box::pin(rx))
        }
    }

    /// Transport whose connection attempt always fails.
    pub struct FailingTransport;

    #[async_trait]
    impl SubscriptionTransport for FailingTransport {
        async fn subscribe(&self, _query: &str) -> Result<PayloadStream, TransportError> {
            Err(TransportError::Handshake("refused".to_string()))
        }
    }
}
