//! The link lifecycle: connect, receive, send, disconnect.
//!
//! A [`TransportManager`] owns at most one TCP link at a time. Each link gets
//! its own shutdown channel, its own cipher pair and its own handler slot, and
//! all three are dropped together when the link goes away.
//!
//! ```text
//!               connect()                start_receiving()
//!   (no link) ────────────▶ link (idle) ──────────────────▶ link (reading)
//!       ▲                        │                               │
//!       └──── disconnect() ──────┴──── disconnect() / peer loss ─┘
//! ```
//!
//! Explicit [`disconnect`](TransportManager::disconnect) never reports back
//! through [`TransportEvents::on_disconnected`]; only loss detected by the
//! read loop does, and at most once per link.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_util::codec::FramedRead;

use crate::cipher::{CipherFactory, FrameTransform};
use crate::framing::FrameCodec;
use crate::{LinkId, TransportError};

/// Callbacks for one link. Invoked from the link's read task.
pub trait TransportEvents: Send + Sync + 'static {
    /// One complete inbound frame, already through the decrypt stage.
    fn on_packet(&self, frame: Vec<u8>);

    /// The peer closed the link or reading failed.
    fn on_disconnected(&self);
}

// ---------------------------------------------------------------------------
// Per-link pieces
// ---------------------------------------------------------------------------

/// Handler slot shared between the manager and a read task.
#[derive(Default)]
struct HandlerSlot(Mutex<Option<Arc<dyn TransportEvents>>>);

impl HandlerSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn TransportEvents>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, handlers: Arc<dyn TransportEvents>) {
        *self.lock() = Some(handlers);
    }

    fn current(&self) -> Option<Arc<dyn TransportEvents>> {
        self.lock().clone()
    }

    fn take(&self) -> Option<Arc<dyn TransportEvents>> {
        self.lock().take()
    }
}

/// Write side: the encrypt stage and the socket half advance together.
struct LinkWriter {
    half: OwnedWriteHalf,
    encryptor: Option<Box<dyn FrameTransform>>,
}

/// Read side, parked until [`TransportManager::start_receiving`].
struct LinkReader {
    half: OwnedReadHalf,
    decryptor: Option<Box<dyn FrameTransform>>,
}

struct Link {
    id: LinkId,
    peer: SocketAddr,
    writer: Arc<AsyncMutex<LinkWriter>>,
    reader: Option<LinkReader>,
    handlers: Arc<HandlerSlot>,
    /// Sending `true` (or dropping) stops the read task.
    shutdown_tx: watch::Sender<bool>,
}

impl Link {
    fn close(self) {
        let _ = self.shutdown_tx.send(true);
        self.handlers.take();
        tracing::debug!(id = %self.id, peer = %self.peer, "link closed");
    }
}

struct LinkState {
    link: Option<Link>,
    connecting: bool,
    /// Number the next successful connect receives.
    next_id: LinkId,
    /// Sending `true` (or dropping) abandons the in-flight connect.
    connect_cancel: Option<watch::Sender<bool>>,
    /// Bumped by every `disconnect`; a connect that started under an older
    /// epoch discards its socket.
    epoch: u64,
}

struct Shared {
    state: Mutex<LinkState>,
    ciphers: Arc<dyn CipherFactory>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the current link if it is still `id`. Returns whether it was.
    fn release(&self, id: LinkId) -> bool {
        let mut state = self.lock();
        if state.link.as_ref().map(|link| link.id) == Some(id) {
            if let Some(link) = state.link.take() {
                link.close();
            }
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// TransportManager
// ---------------------------------------------------------------------------

/// Owns the client's single TCP link.
///
/// Cheap to clone; clones share the same link.
#[derive(Clone)]
pub struct TransportManager {
    shared: Arc<Shared>,
}

impl TransportManager {
    /// Creates a manager with no link. Encrypted links get their cipher pair
    /// from `ciphers`.
    pub fn new(ciphers: Arc<dyn CipherFactory>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LinkState {
                    link: None,
                    connecting: false,
                    next_id: LinkId::FIRST,
                    connect_cancel: None,
                    epoch: 0,
                }),
                ciphers,
            }),
        }
    }

    /// Opens a link to `host:port`.
    ///
    /// Returns `false` when resolution or the TCP connect fails, when a link
    /// already exists, or when another connect is in flight.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        use_encryption: bool,
    ) -> bool {
        match self.try_connect(host, port, use_encryption).await {
            Ok(id) => {
                tracing::info!(%id, host, port, use_encryption, "connected");
                true
            }
            Err(e) => {
                tracing::warn!(host, port, error = %e, "connect failed");
                false
            }
        }
    }

    async fn try_connect(
        &self,
        host: &str,
        port: u16,
        use_encryption: bool,
    ) -> Result<LinkId, TransportError> {
        let (epoch, mut cancel_rx) = {
            let mut state = self.shared.lock();
            if state.link.is_some() || state.connecting {
                return Err(TransportError::AlreadyConnected);
            }
            let (cancel_tx, cancel_rx) = watch::channel(false);
            state.connecting = true;
            state.connect_cancel = Some(cancel_tx);
            (state.epoch, cancel_rx)
        };

        let opened = tokio::select! {
            opened = open_stream(host, port) => opened,
            _ = cancel_rx.changed() => Err(TransportError::ConnectionClosed(
                "disconnected while connecting".into(),
            )),
        };

        let mut state = self.shared.lock();
        // After a disconnect the flags may already belong to a newer attempt.
        if state.epoch != epoch {
            return Err(TransportError::ConnectionClosed(
                "disconnected while connecting".into(),
            ));
        }
        state.connecting = false;
        state.connect_cancel = None;
        let (stream, peer) = opened?;

        let (read_half, write_half) = stream.into_split();
        let (encryptor, decryptor) = if use_encryption {
            let pair = self.shared.ciphers.create();
            (Some(pair.encryptor), Some(pair.decryptor))
        } else {
            (None, None)
        };
        let (shutdown_tx, _) = watch::channel(false);
        let id = state.next_id;
        state.next_id = id.next();

        state.link = Some(Link {
            id,
            peer,
            writer: Arc::new(AsyncMutex::new(LinkWriter {
                half: write_half,
                encryptor,
            })),
            reader: Some(LinkReader {
                half: read_half,
                decryptor,
            }),
            handlers: Arc::new(HandlerSlot::default()),
            shutdown_tx,
        });
        Ok(id)
    }

    /// Installs `handlers` on the current link and starts its read task.
    ///
    /// Returns `false` when there is no link or it is already reading.
    pub fn start_receiving(&self, handlers: Arc<dyn TransportEvents>) -> bool {
        let mut state = self.shared.lock();
        let Some(link) = state.link.as_mut() else {
            tracing::warn!("start_receiving without a link");
            return false;
        };
        let Some(reader) = link.reader.take() else {
            tracing::warn!(id = %link.id, "link is already receiving");
            return false;
        };

        link.handlers.set(handlers);
        let task = ReadTask {
            shared: Arc::downgrade(&self.shared),
            id: link.id,
            handlers: Arc::clone(&link.handlers),
            shutdown_rx: link.shutdown_tx.subscribe(),
        };
        tokio::spawn(task.run(reader));
        true
    }

    /// Clears the current link's callbacks. Frames and loss on that link
    /// are no longer reported anywhere.
    pub fn detach_handlers(&self) {
        if let Some(link) = self.shared.lock().link.as_ref() {
            link.handlers.take();
        }
    }

    /// Encrypts (when the link is encrypted) and writes one frame.
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let writer = self
            .shared
            .lock()
            .link
            .as_ref()
            .map(|link| Arc::clone(&link.writer))
            .ok_or(TransportError::NotConnected)?;

        let mut writer = writer.lock().await;
        let bytes = match writer.encryptor.as_mut() {
            Some(encryptor) => encryptor.apply(frame)?,
            None => frame,
        };
        writer
            .half
            .write_all(&bytes)
            .await
            .map_err(TransportError::SendFailed)
    }

    /// Tears the current link down and abandons any connect in flight.
    /// A no-op without either.
    pub fn disconnect(&self) {
        let mut state = self.shared.lock();
        state.epoch = state.epoch.wrapping_add(1);
        state.connecting = false;
        if let Some(cancel) = state.connect_cancel.take() {
            tracing::info!("abandoning connect in flight");
            let _ = cancel.send(true);
        }
        if let Some(link) = state.link.take() {
            tracing::info!(id = %link.id, peer = %link.peer, "disconnecting");
            link.close();
        }
    }

    /// Number of the current link, if there is one.
    pub fn link_id(&self) -> Option<LinkId> {
        self.shared.lock().link.as_ref().map(|link| link.id)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().link.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.lock().link.as_ref().map(|link| link.peer)
    }
}

impl std::fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportManager")
            .field("peer", &self.peer_addr())
            .finish_non_exhaustive()
    }
}

async fn open_stream(
    host: &str,
    port: u16,
) -> Result<(TcpStream, SocketAddr), TransportError> {
    let addrs = tokio::net::lookup_host((host, port)).await.map_err(|source| {
        TransportError::Resolve {
            host: host.to_string(),
            port,
            source,
        }
    })?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream
                    .set_nodelay(true)
                    .map_err(|source| TransportError::ConnectFailed {
                        addr,
                        source,
                    })?;
                return Ok((stream, addr));
            }
            Err(source) => {
                tracing::debug!(%addr, error = %source, "address refused");
                last_error = Some(TransportError::ConnectFailed { addr, source });
            }
        }
    }
    Err(last_error.unwrap_or_else(|| TransportError::Resolve {
        host: host.to_string(),
        port,
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no addresses",
        ),
    }))
}

// ---------------------------------------------------------------------------
// Read task
// ---------------------------------------------------------------------------

struct ReadTask {
    shared: Weak<Shared>,
    id: LinkId,
    handlers: Arc<HandlerSlot>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ReadTask {
    async fn run(mut self, reader: LinkReader) {
        let LinkReader {
            half,
            mut decryptor,
        } = reader;
        let mut frames = FramedRead::new(half, FrameCodec);

        let reason = loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    // Explicit teardown: nothing to report.
                    tracing::debug!(id = %self.id, "read task stopped");
                    return;
                }
                next = frames.next() => match next {
                    Some(Ok(frame)) => {
                        let frame = match decryptor.as_mut() {
                            Some(stage) => match stage.apply(frame) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    tracing::warn!(id = %self.id, error = %e, "dropping undecryptable frame");
                                    continue;
                                }
                            },
                            None => frame,
                        };
                        if let Some(handlers) = self.handlers.current() {
                            handlers.on_packet(frame);
                        }
                    }
                    Some(Err(e)) => break e.to_string(),
                    None => break "closed by peer".to_string(),
                },
            }
        };

        tracing::info!(id = %self.id, %reason, "link lost");
        // `release` empties the slot, so take it first.
        let handlers = self.handlers.take();
        let released = self
            .shared
            .upgrade()
            .is_some_and(|shared| shared.release(self.id));
        if released {
            if let Some(handlers) = handlers {
                handlers.on_disconnected();
            }
        }
    }
}
