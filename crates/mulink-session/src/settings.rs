//! Client settings.

use mulink_protocol::Dialect;
use serde::{Deserialize, Serialize};

use crate::SessionError;
use crate::queue::DEFAULT_DEFERRAL_CAPACITY;

/// Length of the client version field in the login request.
pub const CLIENT_VERSION_LEN: usize = 5;
/// Length of the client serial field in the login request.
pub const CLIENT_SERIAL_LEN: usize = 16;

/// Everything a [`GameClient`](crate::GameClient) needs to know before it
/// connects.
///
/// Every field has a default, so a settings file only needs to name the
/// values it changes:
///
/// ```
/// # use mulink_session::ClientSettings;
/// let settings: ClientSettings =
///     serde_json::from_str(r#"{ "dialect": "v097" }"#).unwrap();
/// assert_eq!(settings.connect_server_port, 44405);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub connect_server_host: String,
    pub connect_server_port: u16,
    /// Wire dialect of the game server. Not detected; it must match.
    pub dialect: Dialect,
    /// Sent in the login request; servers reject unknown versions.
    pub client_version: String,
    pub client_serial: String,
    /// Most world events held back during one map transition.
    pub deferral_capacity: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_server_host: "127.0.0.1".into(),
            connect_server_port: 44405,
            dialect: Dialect::default(),
            client_version: "10404".into(),
            client_serial: "k1Pk2jcET48mxL3b".into(),
            deferral_capacity: DEFAULT_DEFERRAL_CAPACITY,
        }
    }
}

impl ClientSettings {
    /// Checks the values a server or the client itself would choke on.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.connect_server_host.trim().is_empty() {
            return Err(SessionError::Config("connect_server_host is empty".into()));
        }
        if self.connect_server_port == 0 {
            return Err(SessionError::Config("connect_server_port is 0".into()));
        }
        if self.client_version.len() != CLIENT_VERSION_LEN {
            return Err(SessionError::Config(format!(
                "client_version must be {CLIENT_VERSION_LEN} bytes, got {}",
                self.client_version.len()
            )));
        }
        if self.client_serial.len() != CLIENT_SERIAL_LEN {
            return Err(SessionError::Config(format!(
                "client_serial must be {CLIENT_SERIAL_LEN} bytes, got {}",
                self.client_serial.len()
            )));
        }
        if self.deferral_capacity == 0 {
            return Err(SessionError::Config("deferral_capacity is 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_valid() {
        assert!(ClientSettings::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: ClientSettings =
            serde_json::from_str(r#"{ "connect_server_port": 55901, "dialect": "v075" }"#)
                .unwrap();
        assert_eq!(settings.connect_server_port, 55901);
        assert_eq!(settings.dialect, Dialect::V075);
        assert_eq!(settings.connect_server_host, "127.0.0.1");
        assert_eq!(settings.deferral_capacity, 4096);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: [fn(&mut ClientSettings); 5] = [
            |s| s.connect_server_host = "  ".into(),
            |s| s.connect_server_port = 0,
            |s| s.client_version = "1.0".into(),
            |s| s.client_serial = "short".into(),
            |s| s.deferral_capacity = 0,
        ];
        for break_it in cases {
            let mut settings = ClientSettings::default();
            break_it(&mut settings);
            assert!(matches!(settings.validate(), Err(SessionError::Config(_))));
        }
    }

    #[test]
    fn test_unknown_dialect_rejected_by_serde() {
        let result = serde_json::from_str::<ClientSettings>(r#"{ "dialect": "s9" }"#);
        assert!(result.is_err());
    }
}
