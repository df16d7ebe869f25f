//! Server configuration and CORS origin allowlist.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 4000;

/// Largest accepted WebSocket message. Import operations carry whole
/// diagrams, which must fit in a single frame up to at least 10 MiB.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Gateway server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Exact allowed origin (the front end), when set
    pub frontend_url: Option<String>,
    /// Additional allowed origin patterns, `*` wildcards permitted
    pub origin_patterns: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            frontend_url: None,
            origin_patterns: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Reads `PORT`, `FRONTEND_URL` and `CORS_ORIGIN_PATTERNS`
    /// (comma-separated) from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let frontend_url = std::env::var("FRONTEND_URL")
            .ok()
            .filter(|url| !url.is_empty());
        let origin_patterns = std::env::var("CORS_ORIGIN_PATTERNS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            port,
            frontend_url,
            origin_patterns,
        }
    }

    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Builds the origin allowlist for the CORS layer.
    pub fn allowlist(&self) -> OriginAllowlist {
        let mut exact = Vec::new();
        if let Some(url) = &self.frontend_url {
            exact.push(url.trim_end_matches('/').to_string());
        }
        OriginAllowlist {
            exact,
            patterns: self.origin_patterns.clone(),
        }
    }
}

/// Origin allowlist: exact origins plus `*` wildcard patterns.
///
/// An empty allowlist permits every origin, which is the development default.
#[derive(Debug, Clone, Default)]
pub struct OriginAllowlist {
    exact: Vec<String>,
    patterns: Vec<String>,
}

impl OriginAllowlist {
    pub fn allows(&self, origin: &str) -> bool {
        if self.exact.is_empty() && self.patterns.is_empty() {
            return true;
        }
        let origin = origin.trim_end_matches('/');
        self.exact.iter().any(|allowed| allowed == origin)
            || self
                .patterns
                .iter()
                .any(|pattern| wildcard_match(pattern, origin))
    }
}

fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }
    let mut rest = candidate;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(at) => rest = &rest[at + part.len()..],
                None => return false,
            }
        }
    }
    true
}
