//! End-to-end tests for the connect and login flow.
//!
//! Each test binds real listeners on `127.0.0.1:0` and plays the connect
//! server and the game server by hand, so every byte the client sends is
//! checked as it arrives and every byte it receives is exactly what a
//! server would put on the wire.

use std::time::Duration;

use mulink_session::{
    ClientSettings, ConnectionState, GameClient, SessionEvent, WorldEvent,
};
use mulink_transport::cipher::Xor32Decryptor;
use mulink_transport::{FrameKind, FrameTransform};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Reads one whole frame.
async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut frame = vec![stream.read_u8().await.unwrap()];
    let kind = FrameKind::from_marker(frame[0]).expect("valid frame marker");
    frame.resize(kind.header_len(), 0);
    stream.read_exact(&mut frame[1..]).await.unwrap();
    let size = kind.declared_size(&frame).expect("declared size");
    let header_len = frame.len();
    frame.resize(size, 0);
    stream.read_exact(&mut frame[header_len..]).await.unwrap();
    frame
}

/// Reads one frame from the game-server leg and strips the xor stage.
async fn read_game_frame(stream: &mut TcpStream) -> Vec<u8> {
    let frame = read_frame(stream).await;
    Xor32Decryptor.apply(frame).unwrap()
}

fn server_list(ids: &[u16]) -> Vec<u8> {
    let len = 7 + ids.len() * 4;
    let mut frame = vec![0xC2, (len >> 8) as u8, len as u8, 0xF4, 0x06];
    frame.extend_from_slice(&(ids.len() as u16).to_be_bytes());
    for id in ids {
        frame.extend_from_slice(&id.to_le_bytes());
        frame.extend_from_slice(&[30, 0]);
    }
    frame
}

fn connection_info(host: &str, port: u16) -> Vec<u8> {
    let mut frame = vec![0u8; 22];
    frame[..4].copy_from_slice(&[0xC1, 22, 0xF4, 0x03]);
    frame[4..4 + host.len()].copy_from_slice(host.as_bytes());
    frame[20..22].copy_from_slice(&port.to_le_bytes());
    frame
}

fn game_server_entered(player_id: u16) -> Vec<u8> {
    let mut frame = vec![0xC1, 12, 0xF1, 0x00, 0x01];
    frame.extend_from_slice(&player_id.to_be_bytes());
    frame.extend_from_slice(b"10404");
    frame
}

fn character_list(name: &str, level: u16) -> Vec<u8> {
    let mut record = vec![0u8; 34];
    record[1..1 + name.len()].copy_from_slice(name.as_bytes());
    record[12..14].copy_from_slice(&level.to_le_bytes());
    record[33] = 0xFF;

    let mut frame = vec![0xC1, 42, 0xF3, 0x00, 0, 0, 1, 0];
    frame.extend_from_slice(&record);
    frame
}

fn character_information(map: u16, x: u8, y: u8) -> Vec<u8> {
    let mut frame = vec![0u8; 72];
    frame[..4].copy_from_slice(&[0xC3, 72, 0xF3, 0x03]);
    frame[4] = x;
    frame[5] = y;
    frame[6..8].copy_from_slice(&map.to_le_bytes());
    frame[34..36].copy_from_slice(&120u16.to_le_bytes());
    frame[36..38].copy_from_slice(&150u16.to_le_bytes());
    frame
}

fn npc_spawn(id: u16, npc_type: u16) -> Vec<u8> {
    let mut frame = vec![0xC2, 0x00, 15, 0x13, 1];
    frame.extend_from_slice(&id.to_be_bytes());
    frame.extend_from_slice(&npc_type.to_be_bytes());
    frame.extend_from_slice(&[40, 41, 40, 41, 0x20, 0]);
    frame
}

// ---------------------------------------------------------------------------
// Fake servers
// ---------------------------------------------------------------------------

/// Plays a connect server that hands out `game_port` and then hangs up.
async fn connect_server(game_port: u16) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&[0xC1, 0x04, 0x00, 0x01]).await.unwrap();

        assert_eq!(read_frame(&mut stream).await, vec![0xC1, 0x04, 0xF4, 0x06]);
        stream.write_all(&server_list(&[0, 1])).await.unwrap();

        assert_eq!(
            read_frame(&mut stream).await,
            vec![0xC1, 0x06, 0xF4, 0x03, 0x01, 0x00]
        );
        stream
            .write_all(&connection_info("127.0.0.1", game_port))
            .await
            .unwrap();
        // Real connect servers close right after the handoff.
    });
    (port, task)
}

fn settings(connect_port: u16) -> ClientSettings {
    ClientSettings {
        connect_server_port: connect_port,
        ..ClientSettings::default()
    }
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

/// Collects session events up to and including the first one `stop`
/// accepts.
async fn session_events_until(
    client: &GameClient,
    stop: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    let finished = tokio::time::timeout(TIMEOUT, async {
        loop {
            match client.try_dequeue_session_event() {
                Some(event) => {
                    let done = stop(&event);
                    seen.push(event);
                    if done {
                        return;
                    }
                }
                None => tokio::time::sleep(Duration::from_millis(2)).await,
            }
        }
    })
    .await;
    assert!(finished.is_ok(), "timed out; events so far: {seen:?}");
    seen
}

async fn until_state(client: &GameClient, state: ConnectionState) -> Vec<SessionEvent> {
    session_events_until(client, |e| *e == SessionEvent::StateChanged(state)).await
}

async fn world_event_where(client: &GameClient, want: impl Fn(&WorldEvent) -> bool) -> WorldEvent {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match client.try_dequeue_world_event() {
                Some(event) if want(&event) => return event,
                Some(_) => {}
                None => tokio::time::sleep(Duration::from_millis(2)).await,
            }
        }
    })
    .await
    .expect("timed out waiting for a world event")
}

fn has_error(events: &[SessionEvent]) -> bool {
    events.iter().any(|e| matches!(e, SessionEvent::Error(_)))
}

/// Drives a fresh client through the connect server onto `game`.
async fn reach_game_server(game: &TcpListener) -> (GameClient, TcpStream) {
    let game_port = game.local_addr().unwrap().port();
    let (connect_port, connect_task) = connect_server(game_port).await;
    let client = GameClient::new(settings(connect_port)).unwrap();

    client.connect_to_connect_server().await;
    let events = until_state(&client, ConnectionState::ReceivedServerList).await;
    assert!(!has_error(&events), "{events:?}");

    client.request_game_server_connection(1).await;
    let (stream, _) = game.accept().await.unwrap();
    let events = until_state(&client, ConnectionState::ConnectedToGameServer).await;
    assert!(!has_error(&events), "{events:?}");

    connect_task.await.unwrap();
    (client, stream)
}

// =========================================================================
// Connect server
// =========================================================================

#[tokio::test]
async fn test_connect_server_flow_caches_server_list() {
    let (port, _task) = connect_server(1).await;
    let client = GameClient::new(settings(port)).unwrap();

    client.connect_to_connect_server().await;
    let events = until_state(&client, ConnectionState::ReceivedServerList).await;

    assert_eq!(
        events[..4],
        [
            SessionEvent::StateChanged(ConnectionState::ConnectingToConnectServer),
            SessionEvent::StateChanged(ConnectionState::ConnectedToConnectServer),
            SessionEvent::StateChanged(ConnectionState::RequestingServerList),
            SessionEvent::ServerListReceived(client.server_list()),
        ]
    );
    let ids: Vec<u16> = client.server_list().iter().map(|s| s.server_id).collect();
    assert_eq!(ids, vec![0, 1]);
}

#[tokio::test]
async fn test_connect_refused_reports_error_then_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = GameClient::new(settings(port)).unwrap();
    client.connect_to_connect_server().await;

    let events = until_state(&client, ConnectionState::Disconnected).await;
    assert!(matches!(
        events[..],
        [
            SessionEvent::StateChanged(ConnectionState::ConnectingToConnectServer),
            SessionEvent::Error(_),
            SessionEvent::StateChanged(ConnectionState::Disconnected),
        ]
    ));
}

#[tokio::test]
async fn test_second_connect_while_connected_rejected() {
    let (port, _task) = connect_server(1).await;
    let client = GameClient::new(settings(port)).unwrap();

    client.connect_to_connect_server().await;
    client.connect_to_connect_server().await;

    let events = until_state(&client, ConnectionState::ReceivedServerList).await;
    assert_eq!(events.iter().filter(|e| matches!(e, SessionEvent::Error(_))).count(), 1);
}

// =========================================================================
// Game server
// =========================================================================

#[tokio::test]
async fn test_connect_server_hangup_after_handoff_is_ignored() {
    let game = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (client, _stream) = reach_game_server(&game).await;

    // The connect server has closed by now; give its read task time to
    // notice before checking nothing leaked through.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.current_state(), ConnectionState::ConnectedToGameServer);
    assert!(client.try_dequeue_session_event().is_none());
}

#[tokio::test]
async fn test_full_login_reaches_game_and_replays_deferred_spawns() {
    let game = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (client, mut stream) = reach_game_server(&game).await;

    stream.write_all(&game_server_entered(0x2A)).await.unwrap();

    // Login and the automatic character list request.
    client.send_login("tester", "secret").await;
    let login = read_game_frame(&mut stream).await;
    assert_eq!((login[0], login[1], login[2], login[3]), (0xC3, 60, 0xF1, 0x01));
    stream.write_all(&[0xC1, 0x05, 0xF1, 0x01, 0x01]).await.unwrap();
    assert_eq!(read_game_frame(&mut stream).await, vec![0xC1, 0x04, 0xF3, 0x00]);
    stream.write_all(&character_list("Hero", 250)).await.unwrap();

    let events = session_events_until(&client, |e| {
        matches!(e, SessionEvent::CharacterListReceived(_))
    })
    .await;
    assert_eq!(
        events,
        vec![
            SessionEvent::StateChanged(ConnectionState::Authenticating),
            SessionEvent::StateChanged(ConnectionState::ConnectedToGameServer),
            SessionEvent::LoginSucceeded,
            SessionEvent::CharacterListReceived(client.character_list()),
        ]
    );
    assert_eq!(client.hero_id().map(|id| id.get()), Some(0x2A));

    // Selection and entry. The spawn arrives mid-transition.
    client.send_select_character("Hero").await;
    let select = read_game_frame(&mut stream).await;
    assert_eq!(&select[..8], &[0xC1, 14, 0xF3, 0x03, b'H', b'e', b'r', b'o']);
    stream.write_all(&character_information(2, 100, 110)).await.unwrap();
    stream.write_all(&npc_spawn(300, 249)).await.unwrap();

    until_state(&client, ConnectionState::InGame).await;
    let map = world_event_where(&client, |e| matches!(e, WorldEvent::MapChanged { .. })).await;
    assert_eq!(map, WorldEvent::MapChanged { map: 2, x: 100, y: 110, direction: 0 });
    let stats = client.hero_stats();
    assert_eq!((stats.level, stats.health, stats.max_health), (250, 120, 150));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.in_map_transition());
    assert!(client.try_dequeue_world_event().is_none());

    client.send_ready_after_map_change().await;
    assert_eq!(read_game_frame(&mut stream).await, vec![0xC1, 0x04, 0xF3, 0x12]);
    let spawn =
        world_event_where(&client, |e| matches!(e, WorldEvent::SpawnOrUpdate { .. })).await;
    assert!(matches!(spawn, WorldEvent::SpawnOrUpdate { id, x: 40, y: 41, .. } if id.get() == 300));
    assert!(!client.in_map_transition());

    // In-game requests reach the wire on the game leg's walk code.
    client.send_walk_request(100, 110, &[2, 2, 3]).await;
    let walk = read_game_frame(&mut stream).await;
    assert_eq!((walk[2], walk[3], walk[4]), (0xD4, 100, 110));
}

#[tokio::test]
async fn test_game_server_hangup_reports_error_then_disconnected() {
    let game = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (client, stream) = reach_game_server(&game).await;

    drop(stream);
    let events = until_state(&client, ConnectionState::Disconnected).await;
    assert_eq!(
        events,
        vec![
            SessionEvent::Error("connection lost".into()),
            SessionEvent::StateChanged(ConnectionState::Disconnected),
        ]
    );

    // Requests after the loss are rejected, not sent.
    client.send_login("tester", "secret").await;
    assert!(matches!(
        client.try_dequeue_session_event(),
        Some(SessionEvent::Error(_))
    ));
}

#[tokio::test]
async fn test_disconnect_then_reconnect_starts_over() {
    let game = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (client, _stream) = reach_game_server(&game).await;

    client.disconnect();
    assert_eq!(client.current_state(), ConnectionState::Disconnected);
    assert_eq!(
        client.try_dequeue_session_event(),
        Some(SessionEvent::StateChanged(ConnectionState::Disconnected))
    );

    let (port, _task) = connect_server(1).await;
    client.configure(settings(port)).unwrap();
    client.connect_to_connect_server().await;
    let events = until_state(&client, ConnectionState::ReceivedServerList).await;
    assert!(!has_error(&events), "{events:?}");
}
