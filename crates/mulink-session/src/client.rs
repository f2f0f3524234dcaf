//! The game client: one session with a connect server, then a game server.
//!
//! [`GameClient`] owns the transport, the session state, and the producer
//! side of both event queues. Consumers hold clones of it, call its request
//! methods, and drain events on their own tick.
//!
//! # Flow
//!
//! ```text
//! connect_to_connect_server()
//!     Hello ─────────────────▶ server list request (automatic)
//!     ServerListResponse ────▶ ServerListReceived
//! request_game_server_connection(id)
//!     ConnectionInfo ────────▶ drop connect-server link, open game link
//!     GameServerEntered ─────▶ hero id known
//! send_login(user, pass)
//!     LoginResponse ─────────▶ LoginSucceeded + character list request
//!     CharacterList ─────────▶ CharacterListReceived
//! send_select_character(name)
//!     CharacterInformation ──▶ InGame, EnteredGame, map transition
//! send_ready_after_map_change()
//!     ───────────────────────▶ deferred world events replayed
//! ```
//!
//! # Locking
//!
//! All session state sits behind one mutex. Read-task callbacks take it for
//! the whole of one frame, so state changes and the events they publish
//! happen in one step and in wire order. The lock is never held across an
//! `.await`.
//!
//! # Stale links
//!
//! Every link gets a [`LinkId`] from the transport. Callbacks carry the id
//! they were installed for, and the client drops anything from a link that
//! is no longer current. Handlers are also detached from the transport before a link is
//! torn down, so a late disconnect from the connect server cannot disturb
//! the game-server link that replaced it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use mulink_protocol::builders::{self, LoginParams};
use mulink_protocol::charlist::decode_character_list;
use mulink_protocol::messages::{self, ConnectionInfo, LoginResult};
use mulink_protocol::{
    CharacterInfo, Dialect, EntityId, MessageKind, ProtocolError, ServerInfo, parse_header,
};
use mulink_transport::{
    CipherFactory, LinkId, StandardCipherFactory, TransportError, TransportEvents,
    TransportManager,
};
use tokio::sync::watch;

use crate::dispatch::{Dispatcher, Leg};
use crate::queue::{DrainBudget, EventQueues, WorldOutbox};
use crate::{
    AnimationKind, ClientSettings, ConnectionState, EntityKind, HeroStats, SessionError,
    SessionEvent, WorldEvent,
};

use ConnectionState as S;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct SessionState {
    settings: ClientSettings,
    dispatcher: Dispatcher,
    connection: ConnectionState,
    leg: Leg,
    /// The link whose callbacks are accepted.
    link: Option<LinkId>,
    /// Bumped by every connect start and teardown; a connect that finishes
    /// under an older value discards its result.
    attempt: u64,
    servers: Vec<ServerInfo>,
    characters: Vec<CharacterInfo>,
    /// Name sent with the last selection request, until the server answers.
    selecting: Option<String>,
    /// The character the server put in the game.
    selected: Option<String>,
    hero_id: Option<EntityId>,
    hero_map: Option<u16>,
    hero_direction: u8,
    outbox: WorldOutbox,
}

struct Inner {
    transport: TransportManager,
    queues: EventQueues,
    hero: watch::Sender<HeroStats>,
    started: Instant,
    state: Mutex<SessionState>,
}

/// A long-lived game session.
///
/// Cheap to clone; clones share everything. Request methods never return
/// errors: a request that cannot be made becomes a [`SessionEvent::Error`].
#[derive(Clone)]
pub struct GameClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl GameClient {
    /// Creates a client with the standard cipher stages.
    pub fn new(settings: ClientSettings) -> Result<Self, SessionError> {
        Self::with_cipher(settings, Arc::new(StandardCipherFactory::default()))
    }

    /// Creates a client whose game-server links encrypt with `ciphers`.
    pub fn with_cipher(
        settings: ClientSettings,
        ciphers: Arc<dyn CipherFactory>,
    ) -> Result<Self, SessionError> {
        settings.validate()?;
        let queues = EventQueues::new();
        let (hero, _) = watch::channel(HeroStats::default());
        let state = SessionState {
            dispatcher: Dispatcher::new(settings.dialect),
            outbox: WorldOutbox::new(queues.world_sender(), settings.deferral_capacity),
            settings,
            connection: ConnectionState::Initial,
            leg: Leg::ConnectServer,
            link: None,
            attempt: 0,
            servers: Vec::new(),
            characters: Vec::new(),
            selecting: None,
            selected: None,
            hero_id: None,
            hero_map: None,
            hero_direction: 0,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                transport: TransportManager::new(ciphers),
                queues,
                hero,
                started: Instant::now(),
                state: Mutex::new(state),
            }),
        })
    }

    /// Replaces the settings. Only allowed while no connection exists.
    pub fn configure(&self, settings: ClientSettings) -> Result<(), SessionError> {
        settings.validate()?;
        let mut state = self.lock();
        if !state.connection.is_idle() {
            return Err(SessionError::InvalidState {
                operation: "configure",
                state: state.connection,
            });
        }
        state.dispatcher = Dispatcher::new(settings.dialect);
        state.outbox = WorldOutbox::new(
            self.inner.queues.world_sender(),
            settings.deferral_capacity,
        );
        state.settings = settings;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Opens the plain link to the configured connect server.
    pub async fn connect_to_connect_server(&self) {
        let (attempt, host, port) = {
            let mut state = self.lock();
            if !state.connection.is_idle() {
                let err = SessionError::InvalidState {
                    operation: "connect_to_connect_server",
                    state: state.connection,
                };
                drop(state);
                self.reject(err);
                return;
            }
            state.attempt += 1;
            state.leg = Leg::ConnectServer;
            state.outbox.reset();
            self.set_state(&mut state, S::ConnectingToConnectServer);
            (
                state.attempt,
                state.settings.connect_server_host.clone(),
                state.settings.connect_server_port,
            )
        };
        self.open_link(attempt, host, port, Leg::ConnectServer).await;
    }

    /// Asks the connect server where game server `server_id` listens.
    pub async fn request_game_server_connection(&self, server_id: u16) {
        self.request(
            "request_game_server_connection",
            &[S::ReceivedServerList],
            Some(S::RequestingConnectionInfo),
            |state| {
                let known = state.servers.is_empty()
                    || state.servers.iter().any(|s| s.server_id == server_id);
                if !known {
                    return Err(SessionError::UnknownServer(server_id));
                }
                Ok(builders::connection_info_request(server_id)?)
            },
        )
        .await;
    }

    pub async fn send_login(&self, username: &str, password: &str) {
        let tick_count = self.tick_count();
        self.request(
            "send_login",
            &[S::ConnectedToGameServer, S::Authenticating],
            Some(S::Authenticating),
            |state| {
                let params = LoginParams {
                    username,
                    password,
                    tick_count,
                    client_version: state.settings.client_version.as_bytes(),
                    client_serial: state.settings.client_serial.as_bytes(),
                };
                Ok(builders::login(state.settings.dialect, &params)?)
            },
        )
        .await;
    }

    /// Asks to enter the game as `name`. The name becomes the selected
    /// character once the server confirms with the character's details.
    pub async fn send_select_character(&self, name: &str) {
        let sent = self
            .request(
                "send_select_character",
                &[S::ConnectedToGameServer],
                Some(S::SelectingCharacter),
                |state| {
                    let frame = builders::select_character(state.settings.dialect, name)?;
                    state.selecting = Some(name.to_owned());
                    Ok(frame)
                },
            )
            .await;
        if !sent {
            self.lock().selecting = None;
        }
    }

    /// Asks to walk `path` (directions 0..=15) from `(start_x, start_y)`.
    pub async fn send_walk_request(&self, start_x: u8, start_y: u8, path: &[u8]) {
        self.request("send_walk_request", &[S::InGame], None, |state| {
            Ok(builders::walk_request(state.settings.dialect, start_x, start_y, path)?)
        })
        .await;
    }

    /// Tells the server the new map is loaded. Once the acknowledgement is
    /// on the wire, world events held back since the map change are
    /// released in arrival order.
    pub async fn send_ready_after_map_change(&self) {
        let mut acknowledged = None;
        let sent = self
            .request("send_ready_after_map_change", &[S::InGame], None, |state| {
                let frame = builders::ready_after_map_change(state.settings.dialect)?;
                acknowledged = state.outbox.transition();
                Ok(frame)
            })
            .await;
        if sent {
            if let Some(generation) = acknowledged {
                self.finish_transition(generation);
            }
        }
    }

    /// Says `text` in public chat as the selected character.
    pub async fn send_chat(&self, text: &str) {
        self.request("send_chat", &[S::InGame], None, |state| {
            let sender = state.selected.clone().unwrap_or_default();
            Ok(builders::public_chat(state.settings.dialect, &sender, text)?)
        })
        .await;
    }

    /// Drops the current link. Cached server and character lists survive.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        self.teardown(&mut state);
        if state.connection != S::Initial {
            self.set_state(&mut state, S::Disconnected);
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn current_state(&self) -> ConnectionState {
        self.lock().connection
    }

    pub fn dialect(&self) -> Dialect {
        self.lock().settings.dialect
    }

    pub fn server_list(&self) -> Vec<ServerInfo> {
        self.lock().servers.clone()
    }

    pub fn character_list(&self) -> Vec<CharacterInfo> {
        self.lock().characters.clone()
    }

    /// The hero's id, once the game server has announced it.
    pub fn hero_id(&self) -> Option<EntityId> {
        self.lock().hero_id
    }

    pub fn in_map_transition(&self) -> bool {
        self.lock().outbox.in_transition()
    }

    /// The latest hero stats snapshot.
    pub fn hero_stats(&self) -> HeroStats {
        *self.inner.hero.borrow()
    }

    /// A receiver that sees every new hero stats snapshot.
    pub fn subscribe_hero_stats(&self) -> watch::Receiver<HeroStats> {
        self.inner.hero.subscribe()
    }

    pub fn try_dequeue_session_event(&self) -> Option<SessionEvent> {
        self.inner.queues.try_session()
    }

    pub fn try_dequeue_world_event(&self) -> Option<WorldEvent> {
        self.inner.queues.try_world()
    }

    pub fn drain_session_events(
        &self,
        budget: &DrainBudget,
        f: impl FnMut(SessionEvent),
    ) -> usize {
        self.inner.queues.drain_session(budget, f)
    }

    pub fn drain_world_events(&self, budget: &DrainBudget, f: impl FnMut(WorldEvent)) -> usize {
        self.inner.queues.drain_world(budget, f)
    }

    // -----------------------------------------------------------------------
    // Link lifecycle
    // -----------------------------------------------------------------------

    async fn open_link(&self, attempt: u64, host: String, port: u16, leg: Leg) {
        let (connecting, connected, encrypted) = match leg {
            Leg::ConnectServer => (S::ConnectingToConnectServer, S::ConnectedToConnectServer, false),
            Leg::GameServer => (S::ConnectingToGameServer, S::ConnectedToGameServer, true),
        };
        let opened = self.inner.transport.connect(&host, port, encrypted).await;

        let mut state = self.lock();
        if state.attempt != attempt || state.connection != connecting {
            if opened {
                self.inner.transport.disconnect();
            }
            tracing::debug!(%host, port, "connect outlived its request");
            return;
        }
        if !opened {
            self.fail(&mut state, SessionError::ConnectFailed { host, port });
            return;
        }

        let Some(link) = self.inner.transport.link_id() else {
            self.fail(&mut state, TransportError::NotConnected.into());
            return;
        };
        state.link = Some(link);
        state.leg = leg;
        let handler = Arc::new(LinkHandler {
            client: Arc::downgrade(&self.inner),
            link,
        });
        if !self.inner.transport.start_receiving(handler) {
            self.fail(&mut state, TransportError::NotConnected.into());
            return;
        }
        tracing::info!(%host, port, ?leg, %link, "link open");
        self.set_state(&mut state, connected);
    }

    /// Detaches and drops the current link and everything tied to it.
    fn teardown(&self, state: &mut SessionState) {
        self.inner.transport.detach_handlers();
        self.inner.transport.disconnect();
        state.link = None;
        state.selecting = None;
        state.attempt += 1;
        state.outbox.reset();
    }

    /// Ends the session after a connection failure.
    fn fail(&self, state: &mut SessionState, err: SessionError) {
        tracing::error!(error = %err, state = %state.connection, "session failed");
        self.teardown(state);
        self.inner.queues.push_session(SessionEvent::Error(err.to_string()));
        self.set_state(state, S::Disconnected);
    }

    fn link_lost(&self, link: LinkId) {
        let mut state = self.lock();
        if state.link != Some(link) {
            tracing::debug!(%link, "loss of a stale link ignored");
            return;
        }
        self.fail(&mut state, SessionError::ConnectionLost);
    }

    /// Releases what transition `generation` held back. A map change that
    /// arrived while the acknowledgement was in flight keeps its own
    /// transition open.
    fn finish_transition(&self, generation: u64) {
        match self.lock().outbox.complete_transition(generation) {
            Some(replayed) => tracing::debug!(replayed, "world events released"),
            None => tracing::debug!(generation, "map changed again before the acknowledgement"),
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Checks the state, builds a frame, moves to `next` and sends.
    ///
    /// Returns whether the frame reached the socket.
    async fn request<F>(
        &self,
        operation: &'static str,
        allowed: &[ConnectionState],
        next: Option<ConnectionState>,
        prepare: F,
    ) -> bool
    where
        F: FnOnce(&mut SessionState) -> Result<Vec<u8>, SessionError>,
    {
        let prepared = {
            let mut state = self.lock();
            let built = if allowed.contains(&state.connection) {
                prepare(&mut *state)
            } else {
                Err(SessionError::InvalidState {
                    operation,
                    state: state.connection,
                })
            };
            built.map(|frame| {
                if let Some(next) = next {
                    self.set_state(&mut state, next);
                }
                (frame, state.link)
            })
        };

        match prepared {
            Ok((frame, link)) => self.send(link, frame).await,
            Err(err) => {
                self.reject(err);
                false
            }
        }
    }

    async fn send(&self, link: Option<LinkId>, frame: Vec<u8>) -> bool {
        match self.inner.transport.send(frame).await {
            Ok(()) => true,
            Err(err) => {
                let mut state = self.lock();
                if link.is_some() && state.link == link {
                    self.fail(&mut state, err.into());
                } else {
                    tracing::debug!(error = %err, "send on a link that is already gone");
                }
                false
            }
        }
    }

    /// Sends from inside a read-task callback, where awaiting is not an
    /// option.
    fn spawn_send(&self, link: Option<LinkId>, frame: Result<Vec<u8>, ProtocolError>) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "could not build automatic request");
                return;
            }
        };
        let client = self.clone();
        tokio::spawn(async move {
            client.send(link, frame).await;
        });
    }

    fn reject(&self, err: SessionError) {
        tracing::warn!(error = %err, "request rejected");
        self.inner.queues.push_session(SessionEvent::Error(err.to_string()));
    }

    fn set_state(&self, state: &mut SessionState, next: ConnectionState) {
        if state.connection == next {
            return;
        }
        tracing::info!(from = %state.connection, to = %next, "state changed");
        state.connection = next;
        self.inner.queues.push_session(SessionEvent::StateChanged(next));
    }

    fn tick_count(&self) -> u32 {
        u32::try_from(self.inner.started.elapsed().as_millis()).unwrap_or(u32::MAX)
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    fn handle_frame(&self, link: LinkId, frame: &[u8]) {
        let mut state = self.lock();
        if state.link != Some(link) {
            tracing::debug!(%link, "frame from a stale link ignored");
            return;
        }
        let header = match parse_header(frame) {
            Ok(header) => header,
            Err(err) => {
                tracing::warn!(error = %err, "unparseable frame dropped");
                return;
            }
        };
        let Some(kind) = state.dispatcher.table(state.leg).route(&header) else {
            tracing::debug!(
                code = header.code,
                subcode = ?header.subcode,
                leg = ?state.leg,
                "unhandled packet"
            );
            return;
        };
        tracing::debug!(?kind, len = frame.len(), "packet");
        if let Err(err) = self.handle_message(&mut state, kind, frame) {
            tracing::warn!(?kind, error = %err, "malformed packet dropped");
        }
    }

    /// Decodes one routed message and applies it. Every decode happens
    /// before any state is touched, so a malformed frame changes nothing.
    fn handle_message(
        &self,
        state: &mut SessionState,
        kind: MessageKind,
        frame: &[u8],
    ) -> Result<(), ProtocolError> {
        use MessageKind as M;

        let dialect = state.settings.dialect;
        match kind {
            M::Hello => self.on_hello(state),
            M::ServerListResponse => {
                let servers = messages::decode_server_list(frame)?;
                self.on_server_list(state, servers);
            }
            M::ConnectionInfo => {
                let info = messages::decode_connection_info(frame)?;
                self.on_connection_info(state, info);
            }
            M::GameServerEntered => {
                let entered = messages::decode_game_server_entered(frame, dialect)?;
                if !entered.success {
                    tracing::warn!("game server reported an unsuccessful entry");
                }
                tracing::info!(hero = %entered.player_id, "game server entered");
                state.hero_id = Some(entered.player_id);
            }
            M::LoginResponse => {
                let code = messages::decode_login_response(frame, dialect)?;
                self.on_login_response(state, code);
            }
            M::CharacterList => {
                let characters = decode_character_list(frame, dialect)?;
                tracing::info!(count = characters.len(), "character list received");
                state.characters = characters.clone();
                self.inner
                    .queues
                    .push_session(SessionEvent::CharacterListReceived(characters));
            }
            M::CharacterInformation => {
                let info = messages::decode_character_information(frame, dialect)?;
                self.enter_game(state);
                if let Some(name) = state.selecting.take() {
                    state.selected = Some(name);
                }
                let level = state
                    .selected
                    .as_deref()
                    .and_then(|name| state.characters.iter().find(|c| c.name == name))
                    .map_or(0, |c| c.level);
                self.update_stats(state, |s| {
                    *s = HeroStats {
                        level,
                        health: info.health,
                        max_health: info.max_health,
                        mana: info.mana,
                        max_mana: info.max_mana,
                        shield: info.shield,
                        max_shield: info.max_shield,
                        ability: info.ability,
                        max_ability: info.max_ability,
                        experience: info.experience,
                        money: info.money,
                    };
                });
                self.change_map(state, info.map, info.x, info.y, info.direction);
            }
            M::RespawnAfterDeath => {
                let respawn = messages::decode_respawn(frame, dialect)?;
                self.enter_game(state);
                self.update_stats(state, |s| {
                    s.health = respawn.health;
                    s.mana = respawn.mana;
                    s.ability = respawn.ability;
                    s.experience = respawn.experience;
                    s.money = respawn.money;
                    if let Some(shield) = respawn.shield {
                        s.shield = shield;
                    }
                });
                if state.hero_map == Some(respawn.map) {
                    self.move_hero(state, respawn.x, respawn.y, Some(respawn.direction));
                } else {
                    self.change_map(state, respawn.map, respawn.x, respawn.y, respawn.direction);
                }
            }
            M::MapChanged => {
                let change = messages::decode_map_changed(frame, dialect)?;
                self.enter_game(state);
                if change.is_map_change {
                    self.change_map(state, change.map, change.x, change.y, change.rotation);
                } else {
                    self.move_hero(state, change.x, change.y, Some(change.rotation));
                }
            }
            M::CurrentHealthShield | M::MaximumHealthShield => {
                let values = messages::decode_health_shield(frame, kind, dialect)?;
                let current = kind == M::CurrentHealthShield;
                self.update_stats(state, |s| {
                    let (health, shield) = if current {
                        (&mut s.health, &mut s.shield)
                    } else {
                        (&mut s.max_health, &mut s.max_shield)
                    };
                    *health = values.health;
                    if let Some(value) = values.shield {
                        *shield = value;
                    }
                });
            }
            M::CurrentManaAbility | M::MaximumManaAbility => {
                let values = messages::decode_mana_ability(frame, kind, dialect)?;
                let current = kind == M::CurrentManaAbility;
                self.update_stats(state, |s| {
                    if current {
                        s.mana = values.mana;
                        s.ability = values.ability;
                    } else {
                        s.max_mana = values.mana;
                        s.max_ability = values.ability;
                    }
                });
            }
            M::AddPlayersToScope => {
                for player in messages::decode_add_players(frame, dialect)? {
                    state.outbox.publish(WorldEvent::SpawnOrUpdate {
                        id: player.id,
                        x: player.x,
                        y: player.y,
                        direction: player.direction,
                        kind: EntityKind::Player {
                            name: player.name,
                            appearance: player.appearance,
                            appearance_layout: player.appearance_layout,
                        },
                    });
                }
            }
            M::AddNpcsToScope => {
                for npc in messages::decode_add_npcs(frame, dialect)? {
                    state.outbox.publish(WorldEvent::SpawnOrUpdate {
                        id: npc.id,
                        x: npc.x,
                        y: npc.y,
                        direction: npc.direction,
                        kind: EntityKind::Npc {
                            npc_type: npc.npc_type,
                        },
                    });
                }
            }
            M::ObjectsOutOfScope => {
                for id in messages::decode_objects_out_of_scope(frame, dialect)? {
                    state.outbox.publish(WorldEvent::Remove { id });
                }
            }
            M::ObjectMoved => {
                let moved = messages::decode_object_moved(frame, dialect)?;
                if state.hero_id == Some(moved.id) {
                    self.move_hero(state, moved.x, moved.y, None);
                } else {
                    state.outbox.publish(WorldEvent::Move {
                        id: moved.id,
                        x: moved.x,
                        y: moved.y,
                        direction: None,
                        steps: Vec::new(),
                    });
                }
            }
            M::ObjectWalked => {
                let walked = messages::decode_object_walked(frame, dialect)?;
                if state.hero_id == Some(walked.id) {
                    self.move_hero(state, walked.target_x, walked.target_y, Some(walked.direction));
                } else {
                    state.outbox.publish(WorldEvent::Move {
                        id: walked.id,
                        x: walked.target_x,
                        y: walked.target_y,
                        direction: Some(walked.direction),
                        steps: walked.steps,
                    });
                }
            }
            M::ObjectHit => {
                let hit = messages::decode_object_hit(frame, dialect)?;
                state.outbox.publish(WorldEvent::Hit {
                    id: hit.id,
                    health_damage: hit.health_damage,
                    shield_damage: hit.shield_damage,
                    kind: hit.kind,
                });
            }
            M::ObjectGotKilled => {
                let killed = messages::decode_object_killed(frame, dialect)?;
                state.outbox.publish(WorldEvent::Kill {
                    id: killed.killed,
                    killer: killed.killer,
                    skill: killed.skill,
                });
            }
            M::ObjectAnimation => {
                let anim = messages::decode_object_animation(frame, dialect)?;
                state.outbox.publish(WorldEvent::Animation {
                    id: anim.id,
                    target: anim.target,
                    kind: AnimationKind::Action {
                        animation: anim.animation,
                        direction: anim.direction,
                    },
                });
            }
            M::SkillAnimation => {
                let skill = messages::decode_skill_animation(frame, dialect)?;
                state.outbox.publish(WorldEvent::Animation {
                    id: skill.caster,
                    target: skill.target,
                    kind: AnimationKind::Skill { skill: skill.skill },
                });
            }
            M::ChatMessage | M::WhisperMessage => {
                let line = messages::decode_chat(frame, kind, dialect)?;
                state.outbox.publish(WorldEvent::Chat {
                    sender: line.sender,
                    text: line.text,
                    whisper: kind == M::WhisperMessage,
                });
            }
            // Outbound only; no dispatch table routes to these.
            M::ServerListRequest
            | M::ConnectionInfoRequest
            | M::Login
            | M::CharacterListRequest
            | M::SelectCharacter
            | M::ReadyAfterMapChange
            | M::WalkRequest
            | M::PublicChat => {}
        }
        Ok(())
    }

    fn on_hello(&self, state: &mut SessionState) {
        if state.connection != S::ConnectedToConnectServer {
            tracing::debug!(state = %state.connection, "hello ignored");
            return;
        }
        self.set_state(state, S::RequestingServerList);
        self.spawn_send(state.link, builders::server_list_request());
    }

    fn on_server_list(&self, state: &mut SessionState, servers: Vec<ServerInfo>) {
        tracing::info!(count = servers.len(), "server list received");
        state.servers = servers.clone();
        self.inner
            .queues
            .push_session(SessionEvent::ServerListReceived(servers));
        if matches!(
            state.connection,
            S::ConnectedToConnectServer | S::RequestingServerList
        ) {
            self.set_state(state, S::ReceivedServerList);
        }
    }

    fn on_connection_info(&self, state: &mut SessionState, info: ConnectionInfo) {
        if state.connection != S::RequestingConnectionInfo {
            tracing::debug!(state = %state.connection, "connection info ignored");
            return;
        }
        tracing::info!(host = %info.host, port = info.port, "game server assigned");
        self.set_state(state, S::ReceivedConnectionInfo);

        // Detach first: the connect server may close its end at any moment
        // and that loss must not reach the session.
        self.teardown(state);
        self.set_state(state, S::ConnectingToGameServer);

        let attempt = state.attempt;
        let client = self.clone();
        tokio::spawn(async move {
            client
                .open_link(attempt, info.host, info.port, Leg::GameServer)
                .await;
        });
    }

    fn on_login_response(&self, state: &mut SessionState, code: u8) {
        if state.connection == S::Authenticating {
            self.set_state(state, S::ConnectedToGameServer);
        }
        let result = LoginResult::from_code(code);
        if result.is_success() {
            tracing::info!("login succeeded");
            self.inner.queues.push_session(SessionEvent::LoginSucceeded);
            self.spawn_send(
                state.link,
                builders::character_list_request(state.settings.dialect),
            );
        } else {
            tracing::warn!(?result, "login failed");
            self.inner.queues.push_session(SessionEvent::LoginFailed(code));
        }
    }

    fn enter_game(&self, state: &mut SessionState) {
        if matches!(
            state.connection,
            S::SelectingCharacter | S::ConnectedToGameServer
        ) {
            self.set_state(state, S::InGame);
            self.inner.queues.push_session(SessionEvent::EnteredGame);
        }
    }

    fn change_map(&self, state: &mut SessionState, map: u16, x: u8, y: u8, direction: u8) {
        tracing::info!(map, x, y, "map changed");
        state.hero_map = Some(map);
        state.hero_direction = direction;
        state.outbox.begin_transition();
        state.outbox.publish(WorldEvent::MapChanged { map, x, y, direction });
    }

    fn move_hero(&self, state: &mut SessionState, x: u8, y: u8, direction: Option<u8>) {
        if let Some(direction) = direction {
            state.hero_direction = direction;
        }
        state.outbox.publish(WorldEvent::HeroPosition {
            x,
            y,
            direction: state.hero_direction,
        });
    }

    fn update_stats(&self, state: &mut SessionState, f: impl FnOnce(&mut HeroStats)) {
        let mut stats = *self.inner.hero.borrow();
        f(&mut stats);
        self.inner.hero.send_replace(stats);
        state.outbox.publish(WorldEvent::HeroStats(stats));
    }
}

// ---------------------------------------------------------------------------
// Transport callbacks
// ---------------------------------------------------------------------------

/// Callbacks for one link. Holds the client weakly so a dropped client does
/// not live on in its read task.
struct LinkHandler {
    client: Weak<Inner>,
    link: LinkId,
}

impl LinkHandler {
    fn client(&self) -> Option<GameClient> {
        self.client.upgrade().map(|inner| GameClient { inner })
    }
}

impl TransportEvents for LinkHandler {
    fn on_packet(&self, frame: Vec<u8>) {
        if let Some(client) = self.client() {
            client.handle_frame(self.link, &frame);
        }
    }

    fn on_disconnected(&self) {
        if let Some(client) = self.client() {
            client.link_lost(self.link);
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
