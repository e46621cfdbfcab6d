//! Reply socket (server side of REQ/REP)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use crate::auth::send_challenge;
use crate::codec::{decode_value, encode_value};
use crate::error::IpcError;
use crate::frame::MessageStream;

const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

struct Inbound {
    request: Bytes,
    reply: oneshot::Sender<Bytes>,
}

/// Server side of the request/reply protocol.
///
/// Requests from every authenticated connection arrive on one queue. Each
/// [`recv`](Self::recv) must be answered by a [`send`](Self::send) before the
/// next `recv`. The outstanding reply slot belongs to the socket, not to the
/// caller, so a socket shared between tasks must have its recv/send pairs
/// serialized by the application.
pub struct ReplySocket {
    local_addr: SocketAddr,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    pending: Mutex<Option<oneshot::Sender<Bytes>>>,
    acceptor: JoinHandle<()>,
}

impl ReplySocket {
    /// Bind `addr` and start accepting connections authenticated with `authkey`
    pub async fn bind<A: ToSocketAddrs>(addr: A, authkey: impl AsRef<[u8]>) -> Result<Self, IpcError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let authkey: Arc<[u8]> = Arc::from(authkey.as_ref());
        let (tx, rx) = mpsc::unbounded_channel();

        info!("Reply socket listening on {}", local_addr);
        let acceptor = tokio::spawn(accept_loop(listener, authkey, tx));

        Ok(Self {
            local_addr,
            inbound: tokio::sync::Mutex::new(rx),
            pending: Mutex::new(None),
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next request from any connection
    pub async fn recv(&self) -> Result<Bytes, IpcError> {
        if self.pending.lock().is_some() {
            return Err(IpcError::Usage("must call send() after recv()"));
        }

        let Inbound { request, reply } = self
            .inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(IpcError::ConnectionLost)?;

        *self.pending.lock() = Some(reply);
        Ok(request)
    }

    /// Answer the request returned by the last `recv`
    pub fn send(&self, reply: impl Into<Bytes>) -> Result<(), IpcError> {
        let handle = self
            .pending
            .lock()
            .take()
            .ok_or(IpcError::Usage("must call recv() first"))?;

        if handle.send(reply.into()).is_err() {
            debug!("Discarding reply for a connection that has gone away");
        }
        Ok(())
    }

    pub async fn recv_value<T: DeserializeOwned>(&self) -> Result<T, IpcError> {
        let request = self.recv().await?;
        decode_value(&request)
    }

    pub fn send_value<T: Serialize + ?Sized>(&self, reply: &T) -> Result<(), IpcError> {
        let payload = encode_value(reply)?;
        self.send(payload)
    }
}

impl Drop for ReplySocket {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    authkey: Arc<[u8]>,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    // Handlers are owned here so aborting the acceptor ends them too
    let mut handlers = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    handlers.spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&authkey),
                        inbound.clone(),
                    ));
                }
                Err(err) => {
                    warn!("Failed to accept connection: {}", err);
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                }
            },
            Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    authkey: Arc<[u8]>,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    if !send_challenge(&mut stream, &authkey).await {
        warn!("Authentication failed for {}", peer);
        return;
    }
    if let Err(err) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", peer, err);
    }

    let mut stream = MessageStream::new(stream);
    loop {
        let request = match stream.recv().await {
            Ok(request) => request,
            Err(err) => {
                warn!("Connection from {} lost: {}", peer, err);
                return;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if inbound
            .send(Inbound {
                request,
                reply: reply_tx,
            })
            .is_err()
        {
            return;
        }

        let Ok(reply) = reply_rx.await else {
            debug!("Reply socket dropped before answering {}", peer);
            return;
        };
        if let Err(err) = stream.send(&reply).await {
            warn!("Failed to send reply to {}: {}", peer, err);
            return;
        }
    }
}
