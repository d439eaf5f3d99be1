//! Realtime channel over Socket.IO.
//!
//! [`RealtimeChannelManager`] keeps at most one [`RealtimeChannel`] open, bound
//! to the current access token. Given a token it opens a channel; when the
//! token is cleared it closes it; a different token replaces it.

mod channel;
mod packet;

pub use channel::{ChannelEvent, RealtimeChannel};

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use fieldsync_core::{AccessToken, Result};

use crate::config::ClientConfig;

/// Owns the realtime channel for the current token.
///
/// Clones share the same channel.
#[derive(Debug, Clone)]
pub struct RealtimeChannelManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    config: ClientConfig,
    // Held across connect so concurrent opens collapse into one attempt.
    channel: Mutex<Option<Arc<RealtimeChannel>>>,
}

impl RealtimeChannelManager {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                channel: Mutex::new(None),
            }),
        }
    }

    /// Returns the open channel, if any.
    pub async fn current(&self) -> Option<Arc<RealtimeChannel>> {
        let mut slot = self.inner.channel.lock().await;
        discard_if_closed(&mut slot);
        slot.clone()
    }

    /// Return the channel for `token`, opening it if needed.
    ///
    /// A channel open for a different token is closed first.
    #[instrument(skip_all)]
    pub async fn ensure(&self, token: &AccessToken) -> Result<Arc<RealtimeChannel>> {
        let mut slot = self.inner.channel.lock().await;
        discard_if_closed(&mut slot);

        if let Some(channel) = slot.as_ref() {
            if channel.token() == token {
                return Ok(channel.clone());
            }
        }

        if let Some(previous) = slot.take() {
            info!("Access token changed, replacing realtime channel");
            previous.close().await;
        }

        let channel = Arc::new(
            RealtimeChannel::connect(&self.inner.config.base_url, token, self.inner.config.timeout)
                .await?,
        );
        *slot = Some(channel.clone());
        Ok(channel)
    }

    /// Close and discard the channel, if one is open.
    pub async fn close(&self) {
        let channel = self.inner.channel.lock().await.take();
        if let Some(channel) = channel {
            channel.close().await;
            info!("Realtime channel closed");
        }
    }

    /// Server events from the current channel, carried across token swaps.
    ///
    /// When one channel's events end, the stream continues with the channel
    /// that replaced it. It ends once the manager has no other open channel.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = ChannelEvent> + Send>> {
        let manager = self.clone();
        Box::pin(async_stream::stream! {
            let mut previous: Option<Arc<RealtimeChannel>> = None;
            // A swap holds the slot lock until the new channel is connected.
            while let Some(channel) = manager.current().await {
                if previous.as_ref().is_some_and(|p| Arc::ptr_eq(p, &channel)) {
                    break;
                }
                if previous.is_some() {
                    debug!(sid = ?channel.sid(), "Following replacement realtime channel");
                }

                let mut events = channel.events();
                while let Some(event) = events.next().await {
                    yield event;
                }
                previous = Some(channel);
            }
        })
    }

    /// Keep the channel in step with a token source.
    ///
    /// Opens a channel whenever a token is present, closes it when the token
    /// is cleared, and replaces it when the token changes. After a terminal
    /// disconnect the channel stays down until the token changes. The task
    /// ends, closing the channel, when the token source is dropped.
    pub fn follow(&self, tokens: watch::Receiver<Option<AccessToken>>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move { manager.follow_tokens(tokens).await })
    }

    async fn follow_tokens(&self, mut tokens: watch::Receiver<Option<AccessToken>>) {
        loop {
            let token = tokens.borrow_and_update().clone();

            match token {
                Some(token) => match self.ensure(&token).await {
                    Ok(channel) => {
                        tokio::select! {
                            changed = tokens.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                                continue;
                            }
                            _ = channel.closed() => {
                                debug!("Realtime channel dropped by transport");
                                self.discard(&channel).await;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to open realtime channel"),
                },
                None => self.close().await,
            }

            if tokens.changed().await.is_err() {
                break;
            }
        }

        self.close().await;
    }

    async fn discard(&self, channel: &Arc<RealtimeChannel>) {
        let mut slot = self.inner.channel.lock().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, channel)) {
            *slot = None;
        }
    }
}

fn discard_if_closed(slot: &mut Option<Arc<RealtimeChannel>>) {
    if slot.as_ref().is_some_and(|channel| !channel.is_open()) {
        *slot = None;
    }
}
