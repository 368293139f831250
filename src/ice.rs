//! NAT traversal server configuration.
//!
//! Static/semi-static list of STUN/TURN servers handed to the media engine
//! when it builds peer connections. STUN entries need only a URL; TURN and
//! TURNS entries also require credentials.

use crate::error::CallError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// One NAT traversal server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    /// A STUN entry. No credentials needed.
    pub fn stun(url: impl Into<String>) -> Result<Self, CallError> {
        let url = url.into();
        if !url.starts_with("stun:") {
            return Err(CallError::InvalidIceServer(format!(
                "not a stun url: {url}"
            )));
        }
        Ok(Self {
            url,
            username: None,
            credential: None,
        })
    }

    /// A TURN/TURNS entry. Username and credential must be non-blank.
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<Self, CallError> {
        let url = url.into();
        if !url.starts_with("turn:") && !url.starts_with("turns:") {
            return Err(CallError::InvalidIceServer(format!(
                "not a turn url: {url}"
            )));
        }
        let username = username.into();
        let credential = credential.into();
        if username.trim().is_empty() || credential.trim().is_empty() {
            return Err(CallError::InvalidIceServer(format!(
                "turn server {url} requires non-blank credentials"
            )));
        }
        Ok(Self {
            url,
            username: Some(username),
            credential: Some(credential),
        })
    }

    pub fn is_turn(&self) -> bool {
        self.url.starts_with("turn:") || self.url.starts_with("turns:")
    }
}

static DEFAULT_SERVERS: Lazy<Vec<IceServer>> = Lazy::new(|| {
    vec![
        IceServer {
            url: "stun:stun.l.google.com:19302".to_string(),
            username: None,
            credential: None,
        },
        IceServer {
            url: "stun:stun1.l.google.com:19302".to_string(),
            username: None,
            credential: None,
        },
    ]
});

/// Ordered list of ICE servers for peer connection setup.
#[derive(Debug, Clone)]
pub struct IceServerProvider {
    servers: Vec<IceServer>,
}

impl IceServerProvider {
    /// Provider with the built-in public STUN servers.
    pub fn new() -> Self {
        Self {
            servers: DEFAULT_SERVERS.clone(),
        }
    }

    pub fn with_servers(servers: Vec<IceServer>) -> Self {
        Self { servers }
    }

    pub fn add(&mut self, server: IceServer) {
        self.servers.push(server);
    }

    /// Servers in configuration order.
    pub fn servers(&self) -> &[IceServer] {
        &self.servers
    }
}

impl Default for IceServerProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stun_requires_only_url() {
        let server = IceServer::stun("stun:stun.example.org:3478").unwrap();
        assert!(server.username.is_none());
        assert!(!server.is_turn());
    }

    #[test]
    fn test_stun_rejects_other_schemes() {
        assert!(IceServer::stun("turn:relay.example.org:3478").is_err());
        assert!(IceServer::stun("https://example.org").is_err());
    }

    #[test]
    fn test_turn_requires_credentials() {
        assert!(IceServer::turn("turn:relay.example.org:3478", "user", "pass").is_ok());
        assert!(IceServer::turn("turns:relay.example.org:5349", "user", "pass").is_ok());
        assert!(IceServer::turn("turn:relay.example.org:3478", "", "pass").is_err());
        assert!(IceServer::turn("turn:relay.example.org:3478", "user", "  ").is_err());
        assert!(IceServer::turn("stun:stun.example.org:3478", "user", "pass").is_err());
    }

    #[test]
    fn test_default_provider_order_is_stable() {
        let provider = IceServerProvider::new();
        assert!(!provider.servers().is_empty());
        assert!(provider.servers().iter().all(|s| !s.is_turn()));

        let mut provider = provider;
        provider.add(IceServer::turn("turn:relay.example.org:3478", "u", "p").unwrap());
        assert!(provider.servers().last().unwrap().is_turn());
    }
}
