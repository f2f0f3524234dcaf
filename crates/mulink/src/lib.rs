//! # mulink
//!
//! Client library for MU Online style game servers.
//!
//! mulink walks a player from the connect server to the game world: it
//! frames and encrypts traffic, decodes the three supported wire dialects,
//! and turns what the server says into two event queues a game loop drains
//! on its own schedule.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mulink::prelude::*;
//!
//! # async fn run() -> Result<(), MulinkError> {
//! mulink::init_tracing("info");
//! let client = GameClient::new(ClientSettings::default())?;
//! client.connect_to_connect_server().await;
//!
//! let budget = DrainBudget::default();
//! client.drain_session_events(&budget, |event| {
//!     if let SessionEvent::ServerListReceived(servers) = event {
//!         println!("{} servers", servers.len());
//!     }
//! });
//! # Ok(())
//! # }
//! ```

mod error;

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use error::MulinkError;
pub use mulink_protocol as protocol;
pub use mulink_session as session;
pub use mulink_transport as transport;

pub mod prelude {
    pub use crate::MulinkError;
    pub use mulink_protocol::{
        Appearance, CharacterClass, CharacterInfo, Dialect, EntityId, LoginResult, ServerInfo,
    };
    pub use mulink_session::{
        AnimationKind, ClientSettings, ConnectionState, DrainBudget, EntityKind, GameClient,
        HeroStats, SessionEvent, WorldEvent,
    };
    pub use mulink_transport::{CipherFactory, StandardCipherFactory};
}

/// Installs a console subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`.
///
/// Only the first call in a process installs anything.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Reads and validates a JSON settings file. Missing fields take their
/// defaults.
pub fn load_settings(path: impl AsRef<Path>) -> Result<mulink_session::ClientSettings, MulinkError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| MulinkError::Io {
        path: display.clone(),
        source,
    })?;
    let settings: mulink_session::ClientSettings =
        serde_json::from_str(&text).map_err(|source| MulinkError::Json {
            path: display.clone(),
            source,
        })?;
    settings.validate()?;
    tracing::info!(path = %path.display(), dialect = ?settings.dialect, "settings loaded");
    Ok(settings)
}
