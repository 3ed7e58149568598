//! Server settings.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::dispatcher::DEFAULT_SESSION_COOKIE;
use crate::error::{Result, WebError};

/// Settings of a [`Server`](crate::Server).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use oxide_web::ServerSettings;
///
/// let settings = ServerSettings::from_json(r#"{"bind_port": 0, "context_path": "/api"}"#).unwrap();
/// assert_eq!(settings.bind_port, 0);
/// assert_eq!(settings.server_name, "oxide-web");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Name used in logs.
    pub server_name: String,
    /// Address to listen on.
    pub bind_address: IpAddr,
    /// Port to listen on; 0 picks a free one.
    pub bind_port: u16,
    /// Prefix of every route; empty for none.
    pub context_path: String,
    /// Name of the session cookie.
    pub session_cookie: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            server_name: "oxide-web".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bind_port: 2010,
            context_path: String::new(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }
}

impl ServerSettings {
    /// Parses settings from JSON, then validates them.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if !self.context_path.is_empty() && !self.context_path.starts_with('/') {
            return Err(WebError::InvalidSettings(format!(
                "context path `{}` must start with `/`",
                self.context_path
            )));
        }
        if self.session_cookie.trim().is_empty() {
            return Err(WebError::InvalidSettings(
                "session cookie name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns whether routes are mounted under a context path.
    pub fn has_context_path(&self) -> bool {
        !self.context_path.trim_matches('/').is_empty()
    }
}
