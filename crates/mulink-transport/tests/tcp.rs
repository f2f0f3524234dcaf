//! Integration tests for the TCP transport.
//!
//! Each test binds a real listener on `127.0.0.1:0` (the OS picks a free
//! port) and plays the server side by hand, so the bytes on the wire are
//! exactly what the manager sent or will receive.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mulink_transport::cipher::Xor32Decryptor;
use mulink_transport::{
    FrameTransform, LinkId, StandardCipherFactory, TransportEvents, TransportManager,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;

/// Records everything a link reports.
struct Recorder {
    packets: mpsc::UnboundedSender<Vec<u8>>,
    disconnects: AtomicUsize,
}

impl Recorder {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Self {
            packets: tx,
            disconnects: AtomicUsize::new(0),
        });
        (recorder, rx)
    }

    fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl TransportEvents for Recorder {
    fn on_packet(&self, frame: Vec<u8>) {
        let _ = self.packets.send(frame);
    }

    fn on_disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

fn manager() -> TransportManager {
    TransportManager::new(Arc::new(StandardCipherFactory::default()))
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Connects `manager` and returns the accepted server-side socket.
async fn connect_pair(
    manager: &TransportManager,
    use_encryption: bool,
) -> TcpStream {
    let (listener, port) = listener().await;
    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    assert!(manager.connect("127.0.0.1", port, use_encryption).await);
    accept.await.unwrap()
}

async fn next_packet(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("packet should arrive")
        .expect("channel open")
}

/// A listener that never accepts, with its queue filled so that further
/// connects hang in the handshake. Keep the returned streams alive.
async fn unresponsive_listener() -> (TcpListener, u16, Vec<TcpStream>) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(0).unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut queued = Vec::new();
    for _ in 0..8 {
        match tokio::time::timeout(
            Duration::from_millis(200),
            TcpStream::connect(("127.0.0.1", port)),
        )
        .await
        {
            Ok(Ok(stream)) => queued.push(stream),
            _ => break,
        }
    }
    (listener, port, queued)
}

/// Gives the read task a moment to notice socket changes.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// =========================================================================
// Connect
// =========================================================================

#[tokio::test]
async fn test_connect_refused_returns_false() {
    let (listener, port) = listener().await;
    drop(listener);

    let manager = manager();
    assert!(!manager.connect("127.0.0.1", port, false).await);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_connect_unresolvable_host_returns_false() {
    let manager = manager();
    assert!(!manager.connect("host.invalid", 44405, false).await);
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let manager = manager();
    let _server = connect_pair(&manager, false).await;
    let first_peer = manager.peer_addr();

    let (_other, port) = listener().await;
    assert!(!manager.connect("127.0.0.1", port, false).await);
    assert_eq!(manager.peer_addr(), first_peer);
}

#[tokio::test]
async fn test_connect_after_disconnect_succeeds() {
    let manager = manager();
    let _first = connect_pair(&manager, false).await;
    manager.disconnect();
    let _second = connect_pair(&manager, false).await;
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_disconnect_abandons_hanging_connect() {
    let (_stalled, stalled_port, _queued) = unresponsive_listener().await;
    let manager = manager();

    let hanging = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect("127.0.0.1", stalled_port, false).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.disconnect();

    tokio::time::timeout(Duration::from_secs(2), hanging)
        .await
        .expect("abandoned connect should finish promptly")
        .unwrap();

    let (listener, port) = listener().await;
    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let connected = tokio::time::timeout(
        Duration::from_secs(2),
        manager.connect("127.0.0.1", port, false),
    )
    .await
    .expect("connect should not wait for the abandoned attempt");
    assert!(connected);
    assert_eq!(manager.peer_addr().map(|addr| addr.port()), Some(port));
    let _server = accept.await.unwrap();
}

#[tokio::test]
async fn test_link_id_numbers_each_connect() {
    let manager = manager();
    assert_eq!(manager.link_id(), None);

    let _first = connect_pair(&manager, false).await;
    assert_eq!(manager.link_id(), Some(LinkId::FIRST));

    manager.disconnect();
    assert_eq!(manager.link_id(), None);

    let _second = connect_pair(&manager, false).await;
    assert_eq!(manager.link_id(), Some(LinkId::FIRST.next()));
}

#[tokio::test]
async fn test_failed_connect_consumes_no_link_id() {
    let (closed, closed_port) = listener().await;
    drop(closed);
    let manager = manager();
    assert!(!manager.connect("127.0.0.1", closed_port, false).await);

    let _server = connect_pair(&manager, false).await;
    assert_eq!(manager.link_id(), Some(LinkId::FIRST));
}

// =========================================================================
// Receive
// =========================================================================

#[tokio::test]
async fn test_receive_splits_coalesced_frames() {
    let manager = manager();
    let mut server = connect_pair(&manager, false).await;
    let (recorder, mut rx) = Recorder::new();
    assert!(manager.start_receiving(recorder));

    server
        .write_all(&[0xC1, 0x04, 0x00, 0x01, 0xC2, 0x00, 0x05, 0xF4, 0x06])
        .await
        .unwrap();

    assert_eq!(next_packet(&mut rx).await, vec![0xC1, 0x04, 0x00, 0x01]);
    assert_eq!(
        next_packet(&mut rx).await,
        vec![0xC2, 0x00, 0x05, 0xF4, 0x06]
    );
}

#[tokio::test]
async fn test_start_receiving_twice_returns_false() {
    let manager = manager();
    let _server = connect_pair(&manager, false).await;
    let (recorder, _rx) = Recorder::new();
    assert!(manager.start_receiving(recorder.clone()));
    assert!(!manager.start_receiving(recorder));
}

#[tokio::test]
async fn test_start_receiving_without_link_returns_false() {
    let (recorder, _rx) = Recorder::new();
    assert!(!manager().start_receiving(recorder));
}

// =========================================================================
// Disconnect
// =========================================================================

#[tokio::test]
async fn test_peer_close_reports_disconnect_once() {
    let manager = manager();
    let server = connect_pair(&manager, false).await;
    let (recorder, _rx) = Recorder::new();
    manager.start_receiving(recorder.clone());

    drop(server);
    settle().await;

    assert_eq!(recorder.disconnects(), 1);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_invalid_marker_ends_link() {
    let manager = manager();
    let mut server = connect_pair(&manager, false).await;
    let (recorder, _rx) = Recorder::new();
    manager.start_receiving(recorder.clone());

    server.write_all(&[0x42, 0x04, 0x00, 0x00]).await.unwrap();
    settle().await;

    assert_eq!(recorder.disconnects(), 1);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_explicit_disconnect_does_not_report() {
    let manager = manager();
    let mut server = connect_pair(&manager, false).await;
    let (recorder, _rx) = Recorder::new();
    manager.start_receiving(recorder.clone());

    manager.disconnect();
    settle().await;

    assert_eq!(recorder.disconnects(), 0);
    // The server sees the socket close.
    let mut buf = [0u8; 1];
    assert_eq!(server.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let manager = manager();
    manager.disconnect();
    let _server = connect_pair(&manager, false).await;
    manager.disconnect();
    manager.disconnect();
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_detached_handlers_see_nothing() {
    let manager = manager();
    let mut server = connect_pair(&manager, false).await;
    let (recorder, mut rx) = Recorder::new();
    manager.start_receiving(recorder.clone());

    manager.detach_handlers();
    server.write_all(&[0xC1, 0x04, 0x00, 0x01]).await.unwrap();
    drop(server);
    settle().await;

    assert!(rx.try_recv().is_err());
    assert_eq!(recorder.disconnects(), 0);
}

// =========================================================================
// Send
// =========================================================================

#[tokio::test]
async fn test_send_without_link_returns_not_connected() {
    let result = manager().send(vec![0xC1, 0x04, 0xF4, 0x06]).await;
    assert!(matches!(
        result,
        Err(mulink_transport::TransportError::NotConnected)
    ));
}

#[tokio::test]
async fn test_send_plain_link_writes_frame_verbatim() {
    let manager = manager();
    let mut server = connect_pair(&manager, false).await;

    manager.send(vec![0xC1, 0x04, 0xF4, 0x06]).await.unwrap();

    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0xC1, 0x04, 0xF4, 0x06]);
}

#[tokio::test]
async fn test_send_encrypted_link_applies_xor_stage() {
    let manager = manager();
    let mut server = connect_pair(&manager, true).await;
    let frame = vec![0xC1, 0x0E, 0xF3, 0x03, b'h', b'e', b'r', b'o', 0, 0, 0, 0, 0, 0];

    manager.send(frame.clone()).await.unwrap();

    let mut buf = vec![0u8; frame.len()];
    server.read_exact(&mut buf).await.unwrap();
    assert_ne!(buf, frame);
    assert_eq!(Xor32Decryptor.apply(buf).unwrap(), frame);
}
