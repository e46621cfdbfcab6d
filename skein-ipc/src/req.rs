//! Durable request socket (client side of REQ/REP)
//!
//! A background loop owns the connection. It connects, answers the server's
//! challenge, then forwards one request at a time and hands each reply back
//! to the waiting caller. If the connection breaks mid-exchange the caller
//! gets [`IpcError::ConnectionLost`] and the loop starts over from the
//! connect step. A rejected handshake ends the loop for good.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use skein_resilience::{BackoffCalculator, BackoffPolicy};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::auth::answer_challenge;
use crate::codec::{decode_value, encode_value};
use crate::error::IpcError;
use crate::frame::MessageStream;

type ReplyResult = Result<Bytes, IpcError>;

struct Outgoing {
    request: Bytes,
    reply: oneshot::Sender<ReplyResult>,
}

/// How long to wait between connection attempts
#[derive(Debug, Clone, Default)]
pub struct ReconnectPolicy {
    backoff: BackoffPolicy,
}

impl ReconnectPolicy {
    /// Retry after the same delay every time
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: BackoffPolicy::fixed(delay),
        }
    }

    pub fn with_backoff(backoff: BackoffPolicy) -> Self {
        Self { backoff }
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }
}

/// Client side of the request/reply protocol.
///
/// Every [`send`](Self::send) must be followed by a [`recv`](Self::recv)
/// before the next `send`; only one request is ever in flight.
pub struct RequestSocket {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    pending: tokio::sync::Mutex<Option<oneshot::Receiver<ReplyResult>>>,
    connector: JoinHandle<()>,
}

impl RequestSocket {
    /// Start connecting to `addr`, retrying every second until it answers
    pub fn connect<A>(addr: A, authkey: impl AsRef<[u8]>) -> Self
    where
        A: ToSocketAddrs + fmt::Display + Send + Sync + 'static,
    {
        Self::connect_with(addr, authkey, ReconnectPolicy::default())
    }

    pub fn connect_with<A>(addr: A, authkey: impl AsRef<[u8]>, policy: ReconnectPolicy) -> Self
    where
        A: ToSocketAddrs + fmt::Display + Send + Sync + 'static,
    {
        let authkey: Arc<[u8]> = Arc::from(authkey.as_ref());
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = tokio::spawn(maintain_connection(addr, authkey, policy, rx));

        Self {
            outgoing: tx,
            pending: tokio::sync::Mutex::new(None),
            connector,
        }
    }

    /// Queue a request for delivery
    pub fn send(&self, request: impl Into<Bytes>) -> Result<(), IpcError> {
        let mut pending = self
            .pending
            .try_lock()
            .map_err(|_| IpcError::Usage("must call recv() after send()"))?;
        if pending.is_some() {
            return Err(IpcError::Usage("must call recv() after send()"));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.outgoing
            .send(Outgoing {
                request: request.into(),
                reply: reply_tx,
            })
            .map_err(|_| IpcError::AuthenticationRejected)?;

        *pending = Some(reply_rx);
        Ok(())
    }

    /// Wait for the reply to the last request
    pub async fn recv(&self) -> Result<Bytes, IpcError> {
        let mut pending = self.pending.lock().await;
        let reply = pending
            .as_mut()
            .ok_or(IpcError::Usage("must call send() first"))?;

        // A dropped reply handle means the loop gave up after a rejection
        let outcome = reply.await.unwrap_or(Err(IpcError::AuthenticationRejected));
        *pending = None;
        outcome
    }

    pub fn send_value<T: Serialize + ?Sized>(&self, request: &T) -> Result<(), IpcError> {
        let payload = encode_value(request)?;
        self.send(payload)
    }

    pub async fn recv_value<T: DeserializeOwned>(&self) -> Result<T, IpcError> {
        let reply = self.recv().await?;
        decode_value(&reply)
    }

    /// Whether the connection loop has given up
    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed()
    }
}

impl Drop for RequestSocket {
    fn drop(&mut self) {
        self.connector.abort();
    }
}

async fn maintain_connection<A>(
    addr: A,
    authkey: Arc<[u8]>,
    policy: ReconnectPolicy,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) where
    A: ToSocketAddrs + fmt::Display,
{
    let backoff: BackoffCalculator = policy.backoff.calculator();
    let mut attempt: u32 = 0;

    loop {
        let mut stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(err) => {
                attempt = attempt.saturating_add(1);
                let delay = backoff.calculate_delay(attempt);
                debug!(
                    "Connection to {} failed (attempt {}): {}; retrying in {:?}",
                    addr, attempt, err, delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if !answer_challenge(&mut stream, &authkey).await {
            error!("Authentication rejected by {}; giving up", addr);
            return;
        }
        if let Err(err) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, err);
        }
        info!("Connected to {}", addr);
        attempt = 0;

        let mut stream = MessageStream::new(stream);
        loop {
            let Some(Outgoing { request, reply }) = outgoing.recv().await else {
                // Socket dropped
                return;
            };

            match exchange(&mut stream, &request).await {
                Ok(response) => {
                    let _ = reply.send(Ok(response));
                }
                Err(err) => {
                    warn!("Connection to {} lost: {}", addr, err);
                    let _ = reply.send(Err(IpcError::ConnectionLost));
                    break;
                }
            }
        }
    }
}

async fn exchange(stream: &mut MessageStream<TcpStream>, request: &[u8]) -> ReplyResult {
    stream.send(request).await?;
    stream.recv().await
}
