//! A client without a screen: logs in, enters the game, and logs what it
//! sees until the server hangs up or Ctrl-C is pressed.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use mulink::prelude::*;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DialectArg {
    Season6,
    V097,
    V075,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Season6 => Dialect::Season6,
            DialectArg::V097 => Dialect::V097,
            DialectArg::V075 => Dialect::V075,
        }
    }
}

/// Headless mulink client.
///
/// CLI values override settings loaded from `--config`.
#[derive(Parser, Debug)]
#[command(name = "headless-client", about = "Log in and watch the game world")]
struct CliArgs {
    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Connect server host.
    #[arg(long)]
    host: Option<String>,

    /// Connect server port.
    #[arg(long)]
    port: Option<u16>,

    #[arg(long, value_enum)]
    dialect: Option<DialectArg>,

    /// Game server to join; defaults to the first one listed.
    #[arg(long)]
    server: Option<u16>,

    #[arg(long)]
    user: String,

    #[arg(long)]
    password: String,

    /// Character to play; defaults to the first one listed.
    #[arg(long)]
    character: Option<String>,
}

impl CliArgs {
    fn settings(&self) -> Result<ClientSettings, MulinkError> {
        let mut settings = match &self.config {
            Some(path) => mulink::load_settings(path)?,
            None => ClientSettings::default(),
        };
        if let Some(host) = &self.host {
            settings.connect_server_host = host.clone();
        }
        if let Some(port) = self.port {
            settings.connect_server_port = port;
        }
        if let Some(dialect) = self.dialect {
            settings.dialect = dialect.into();
        }
        settings.validate()?;
        Ok(settings)
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

const TICK: Duration = Duration::from_millis(50);

/// Requests decided while draining, sent once the drain is over.
enum Action {
    JoinServer(u16),
    Login,
    Select(String),
    AcknowledgeMap,
    Quit,
}

#[tokio::main]
async fn main() -> Result<(), MulinkError> {
    mulink::init_tracing("info,mulink_session=debug");
    let args = CliArgs::parse();
    let client = GameClient::new(args.settings()?)?;

    client.connect_to_connect_server().await;

    let budget = DrainBudget::default();
    let mut tick = tokio::time::interval(TICK);
    let mut login_sent = false;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                client.disconnect();
                return Ok(());
            }
        }

        let mut actions = Vec::new();
        client.drain_session_events(&budget, |event| {
            on_session_event(&args, event, &mut login_sent, &mut actions);
        });
        client.drain_world_events(&budget, |event| on_world_event(event, &mut actions));

        for action in actions {
            match action {
                Action::JoinServer(id) => client.request_game_server_connection(id).await,
                Action::Login => client.send_login(&args.user, &args.password).await,
                Action::Select(name) => client.send_select_character(&name).await,
                Action::AcknowledgeMap => client.send_ready_after_map_change().await,
                Action::Quit => return Ok(()),
            }
        }
    }
}

fn on_session_event(
    args: &CliArgs,
    event: SessionEvent,
    login_sent: &mut bool,
    actions: &mut Vec<Action>,
) {
    match event {
        SessionEvent::StateChanged(ConnectionState::ConnectedToGameServer) if !*login_sent => {
            *login_sent = true;
            actions.push(Action::Login);
        }
        SessionEvent::StateChanged(ConnectionState::Disconnected) => {
            tracing::info!("disconnected");
            actions.push(Action::Quit);
        }
        SessionEvent::StateChanged(_) => {}
        SessionEvent::ServerListReceived(servers) => {
            for server in &servers {
                tracing::info!(id = server.server_id, load = server.load_percentage, "server");
            }
            match args.server.or_else(|| servers.first().map(|s| s.server_id)) {
                Some(id) => actions.push(Action::JoinServer(id)),
                None => {
                    tracing::error!("no game servers listed");
                    actions.push(Action::Quit);
                }
            }
        }
        SessionEvent::LoginSucceeded => tracing::info!("logged in"),
        SessionEvent::LoginFailed(code) => {
            tracing::error!(result = ?LoginResult::from_code(code), "login failed");
            actions.push(Action::Quit);
        }
        SessionEvent::CharacterListReceived(characters) => {
            for c in &characters {
                tracing::info!(slot = c.slot, name = %c.name, class = ?c.class, level = c.level, "character");
            }
            let chosen = match &args.character {
                Some(name) => characters.iter().find(|c| &c.name == name),
                None => characters.first(),
            };
            match chosen {
                Some(c) => actions.push(Action::Select(c.name.clone())),
                None => {
                    tracing::error!(wanted = ?args.character, "no character to play");
                    actions.push(Action::Quit);
                }
            }
        }
        SessionEvent::EnteredGame => tracing::info!("entered the game"),
        SessionEvent::Error(message) => tracing::warn!(%message, "client error"),
    }
}

fn on_world_event(event: WorldEvent, actions: &mut Vec<Action>) {
    match event {
        WorldEvent::MapChanged { map, x, y, .. } => {
            tracing::info!(map, x, y, "map loaded");
            actions.push(Action::AcknowledgeMap);
        }
        WorldEvent::SpawnOrUpdate { id, x, y, kind: EntityKind::Player { name, .. }, .. } => {
            tracing::info!(%id, %name, x, y, "player in view");
        }
        WorldEvent::SpawnOrUpdate { id, x, y, kind: EntityKind::Npc { npc_type }, .. } => {
            tracing::debug!(%id, npc_type, x, y, "npc in view");
        }
        WorldEvent::Chat { sender, text, whisper } => {
            tracing::info!(%sender, %text, whisper, "chat");
        }
        WorldEvent::HeroStats(stats) => {
            tracing::debug!(
                health = stats.health,
                max_health = stats.max_health,
                mana = stats.mana,
                "hero stats"
            );
        }
        other => tracing::trace!(?other, "world event"),
    }
}
