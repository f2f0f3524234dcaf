//! Routing inbound frames to message kinds.
//!
//! Each server role has its own table, built from the schema table for the
//! configured dialect. A frame's header gives a `(code, subcode)` pair; the
//! table is asked for the exact pair first and for `(code, None)` second,
//! because the byte after the code is only a subcode for some messages.

use std::collections::HashMap;

use mulink_protocol::{Dialect, MessageKind, PacketHeader, lookup};

/// Which server the current link talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Leg {
    #[default]
    ConnectServer,
    GameServer,
}

/// One server role's routes.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    routes: HashMap<(u8, Option<u8>), MessageKind>,
}

impl DispatchTable {
    pub fn new(kinds: &[MessageKind], dialect: Dialect) -> Self {
        let routes = kinds
            .iter()
            .map(|&kind| (lookup(kind, dialect).key(), kind))
            .collect();
        Self { routes }
    }

    pub fn route(&self, header: &PacketHeader) -> Option<MessageKind> {
        header
            .subcode
            .and_then(|sub| self.routes.get(&(header.code, Some(sub))))
            .or_else(|| self.routes.get(&(header.code, None)))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Both tables for one dialect.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    connect_server: DispatchTable,
    game_server: DispatchTable,
}

impl Dispatcher {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            connect_server: DispatchTable::new(MessageKind::CONNECT_SERVER_INBOUND, dialect),
            game_server: DispatchTable::new(MessageKind::GAME_SERVER_INBOUND, dialect),
        }
    }

    pub fn table(&self, leg: Leg) -> &DispatchTable {
        match leg {
            Leg::ConnectServer => &self.connect_server,
            Leg::GameServer => &self.game_server,
        }
    }
}
