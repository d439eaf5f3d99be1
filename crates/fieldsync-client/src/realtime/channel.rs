//! One authenticated Socket.IO connection.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use fieldsync_core::error::{AuthError, Error, NetworkError};
use fieldsync_core::{AccessToken, BaseUrl, Result};

use super::packet::{self, DISCONNECT, PONG, Packet};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 64;

/// A server event: name and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub event: String,
    pub data: Value,
}

type AckReply = oneshot::Sender<Result<Value>>;

enum Outgoing {
    Text(String),
    WithAck {
        event: String,
        data: Value,
        reply: AckReply,
    },
    Close,
}

fn ws_error(err: impl std::fmt::Display) -> Error {
    NetworkError::WebSocket {
        message: err.to_string(),
    }
    .into()
}

/// An open realtime channel bound to one access token.
///
/// The connection is driven by a background task. Dropping the handle stops
/// the task without a close handshake; use [`close`](Self::close) for an
/// orderly disconnect.
pub struct RealtimeChannel {
    token: AccessToken,
    sid: Option<String>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    events: broadcast::Receiver<ChannelEvent>,
    first_events: Mutex<Option<broadcast::Receiver<ChannelEvent>>>,
    closed: watch::Receiver<bool>,
    ack_timeout: Duration,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    /// Connect and authenticate with `token`.
    ///
    /// The token is sent in the namespace connect packet and nowhere else.
    /// A refused connect surfaces as [`AuthError::ChannelRejected`].
    pub async fn connect(base: &BaseUrl, token: &AccessToken, timeout: Duration) -> Result<Self> {
        let url = base.socket_url();
        debug!(url = %url, "Connecting realtime channel");

        let attempt = async {
            let (mut socket, _) = connect_async(url.as_str()).await.map_err(ws_error)?;
            let sid = handshake(&mut socket, token).await?;
            Ok::<_, Error>((socket, sid))
        };
        let (socket, sid) = tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| Error::Network(NetworkError::Timeout))??;

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, first_events) = broadcast::channel(EVENT_CAPACITY);
        let events = first_events.resubscribe();
        let (closed_tx, closed) = watch::channel(false);
        let task = tokio::spawn(pump(socket, outgoing_rx, events_tx, closed_tx));

        info!(sid = ?sid, "Realtime channel open");
        Ok(Self {
            token: token.clone(),
            sid,
            outgoing,
            events,
            first_events: Mutex::new(Some(first_events)),
            closed,
            ack_timeout: timeout,
            task,
        })
    }

    /// The token this channel authenticated with.
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// The server-assigned socket id.
    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn is_open(&self) -> bool {
        !*self.closed.borrow() && !self.task.is_finished()
    }

    /// Emit an event to the server.
    pub fn emit(&self, event: &str, data: &Value) -> Result<()> {
        if !self.is_open() {
            return Err(ws_error("channel is closed"));
        }
        self.outgoing
            .send(Outgoing::Text(packet::encode_event(event, data)))
            .map_err(|_| ws_error("channel is closed"))
    }

    /// Emit an event and wait for the server to acknowledge it.
    ///
    /// Resolves with the acknowledgement's arguments: null for none, the value
    /// for one, an array for several. Fails if the channel closes or no
    /// acknowledgement arrives within the connect timeout.
    pub async fn emit_with_ack(&self, event: &str, data: &Value) -> Result<Value> {
        if !self.is_open() {
            return Err(ws_error("channel is closed"));
        }
        let (reply, ack) = oneshot::channel();
        self.outgoing
            .send(Outgoing::WithAck {
                event: event.to_string(),
                data: data.clone(),
                reply,
            })
            .map_err(|_| ws_error("channel is closed"))?;

        match tokio::time::timeout(self.ack_timeout, ack).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ws_error("channel is closed")),
            Err(_) => Err(Error::Network(NetworkError::Timeout)),
        }
    }

    /// Server events. The first stream taken sees every event since the
    /// channel opened; later ones start from the moment they are created.
    /// Streams end when the channel closes.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = ChannelEvent> + Send>> {
        let first = self
            .first_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut rx = first.unwrap_or_else(|| self.events.resubscribe());
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Realtime event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Resolves once the connection has ended for any reason.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Disconnect from the namespace and close the socket.
    pub async fn close(&self) {
        if self.outgoing.send(Outgoing::Close).is_ok() {
            let _ = tokio::time::timeout(Duration::from_secs(2), self.closed()).await;
        }
        self.task.abort();
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("sid", &self.sid)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Engine.IO open, then namespace connect with the token.
async fn handshake(socket: &mut Socket, token: &AccessToken) -> Result<Option<String>> {
    let mut sent_connect = false;

    while let Some(message) = socket.next().await {
        let text = match message.map_err(ws_error)? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                return Err(ws_error(format!("closed during handshake: {:?}", frame)));
            }
            _ => continue,
        };

        match packet::decode(text.as_str())? {
            Packet::Open(open) if !sent_connect => {
                trace!(engine_sid = %open.sid, ping_interval = open.ping_interval, "Engine open");
                socket
                    .send(Message::text(packet::encode_connect(token)))
                    .await
                    .map_err(ws_error)?;
                sent_connect = true;
            }
            Packet::Ping => {
                socket.send(Message::text(PONG)).await.map_err(ws_error)?;
            }
            Packet::Connected { sid } if sent_connect => return Ok(sid),
            Packet::ConnectError { message } => {
                warn!(%message, "Realtime channel rejected credentials");
                return Err(AuthError::ChannelRejected { message }.into());
            }
            Packet::Close | Packet::Disconnect => {
                return Err(ws_error("server closed the channel during handshake"));
            }
            other => trace!(?other, "Ignoring packet during handshake"),
        }
    }

    Err(ws_error("connection ended during handshake"))
}

async fn pump(
    socket: Socket,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: broadcast::Sender<ChannelEvent>,
    closed: watch::Sender<bool>,
) {
    let (mut write, mut read) = socket.split();
    let mut pending: HashMap<u64, AckReply> = HashMap::new();
    let mut next_ack: u64 = 0;

    loop {
        tokio::select! {
            message = read.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Realtime channel closed by server");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "Realtime channel transport error");
                        break;
                    }
                    None => {
                        info!("Realtime channel ended");
                        break;
                    }
                };

                match packet::decode(text.as_str()) {
                    Ok(Packet::Ping) => {
                        if let Err(e) = write.send(Message::text(PONG)).await {
                            warn!(error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Ok(Packet::Event { event, data }) => {
                        trace!(%event, "Realtime event");
                        let _ = events.send(ChannelEvent { event, data });
                    }
                    Ok(Packet::Ack { id, data }) => match pending.remove(&id) {
                        Some(reply) => {
                            let _ = reply.send(Ok(data));
                        }
                        None => debug!(id, "Acknowledgement for unknown event"),
                    },
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                        info!("Realtime channel disconnected by server");
                        break;
                    }
                    Ok(other) => trace!(?other, "Ignoring packet"),
                    Err(e) => warn!(error = %e, "Dropping malformed packet"),
                }
            }
            command = outgoing.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        warn!(error = %e, "Failed to send realtime event");
                        break;
                    }
                }
                Some(Outgoing::WithAck { event, data, reply }) => {
                    let id = next_ack;
                    next_ack += 1;
                    // Callers that timed out no longer listen.
                    pending.retain(|_, reply| !reply.is_closed());

                    let text = packet::encode_event_with_ack(id, &event, &data);
                    if let Err(e) = write.send(Message::text(text)).await {
                        warn!(error = %e, "Failed to send realtime event");
                        let _ = reply.send(Err(ws_error(e)));
                        break;
                    }
                    pending.insert(id, reply);
                }
                Some(Outgoing::Close) | None => {
                    let _ = write.send(Message::text(DISCONNECT)).await;
                    let _ = write.send(Message::Close(None)).await;
                    debug!("Realtime channel closed by client");
                    break;
                }
            },
        }
    }

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(ws_error("channel closed before acknowledgement")));
    }
    closed.send_replace(true);
}
