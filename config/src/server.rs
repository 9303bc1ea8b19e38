//! Server address normalization
//!
//! Accepts the server notations found in configuration files and setters
//! and reduces them to a deduplicated list of `host:port` pairs.

use crate::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Port used when a server entry does not name one
pub const DEFAULT_PORT: u16 = 6379;

/// Host used when a resource is created without servers
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// A normalized backing store server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `[scheme://]host[:port][/path][?query]`
    pub fn parse(server: &str) -> Result<Self, ConfigError> {
        let mut rest = server.trim();
        if let Some((_, after_scheme)) = rest.split_once("://") {
            rest = after_scheme;
        }
        if let Some(end) = rest.find(['/', '?']) {
            rest = &rest[..end];
        }
        if let Some((_, after_userinfo)) = rest.rsplit_once('@') {
            rest = after_userinfo;
        }

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            // [ipv6]:port
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| ConfigError::Invalid(format!("Invalid server given: {server}")))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "Invalid server given: {server}"
                    )))
                }
            }
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Missing required server host: '{server}'"
            )));
        }

        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid(format!("Invalid server port: {server}")))?,
            None => DEFAULT_PORT,
        };

        Ok(Self::new(host, port))
    }

    /// Parse a comma separated server list
    pub fn parse_list(servers: &str) -> Result<Vec<Self>, ConfigError> {
        let parsed = servers
            .split(',')
            .map(Self::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dedup(parsed))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

/// Remove entries with an already seen host and port, keeping the first one
pub fn dedup(servers: Vec<ServerAddress>) -> Vec<ServerAddress> {
    let mut result: Vec<ServerAddress> = Vec::with_capacity(servers.len());
    for server in servers {
        if !result.contains(&server) {
            result.push(server);
        }
    }
    result
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServerEntry {
    Uri(String),
    Pair(String, u16),
    Table { host: String, port: Option<u16> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServerSpec {
    Line(String),
    List(Vec<ServerEntry>),
}

impl ServerEntry {
    fn normalize(self) -> Result<ServerAddress, ConfigError> {
        match self {
            ServerEntry::Uri(uri) => ServerAddress::parse(&uri),
            ServerEntry::Pair(host, port) => ServerAddress::parse(&host).map(|s| ServerAddress {
                port,
                ..s
            }),
            ServerEntry::Table { host, port } => {
                let parsed = ServerAddress::parse(&host)?;
                Ok(ServerAddress {
                    port: port.unwrap_or(parsed.port),
                    ..parsed
                })
            }
        }
    }
}

/// Deserialize a server list written as a string, a list of strings,
/// `[host, port]` pairs or `{ host, port }` tables
pub(crate) fn deserialize_servers<'de, D>(deserializer: D) -> Result<Vec<ServerAddress>, D::Error>
where
    D: Deserializer<'de>,
{
    let spec = ServerSpec::deserialize(deserializer)?;
    let servers = match spec {
        ServerSpec::Line(line) => ServerAddress::parse_list(&line),
        ServerSpec::List(entries) => entries
            .into_iter()
            .map(ServerEntry::normalize)
            .collect::<Result<Vec<_>, _>>()
            .map(dedup),
    };
    servers.map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_forms() {
        let cases = [
            ("localhost", ServerAddress::new("localhost", DEFAULT_PORT)),
            ("localhost:7000", ServerAddress::new("localhost", 7000)),
            ("  10.0.0.1:6380 ", ServerAddress::new("10.0.0.1", 6380)),
            ("redis://cache.local:6390", ServerAddress::new("cache.local", 6390)),
            ("tcp://cache.local?weight=3", ServerAddress::new("cache.local", DEFAULT_PORT)),
            ("redis://user@cache.local:1/2", ServerAddress::new("cache.local", 1)),
            ("[::1]:6381", ServerAddress::new("::1", 6381)),
            ("[::1]", ServerAddress::new("::1", DEFAULT_PORT)),
        ];

        for (input, expected) in cases {
            assert_eq!(
                ServerAddress::parse(input).unwrap(),
                expected,
                "Failed to parse: {}",
                input
            );
        }
    }

    #[test]
    fn test_parse_rejects_missing_host() {
        for input in ["", "   ", ":6379", "redis://", "[]:6379"] {
            assert!(
                ServerAddress::parse(input).is_err(),
                "Should reject: {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!(ServerAddress::parse("localhost:http").is_err());
        assert!(ServerAddress::parse("localhost:70000").is_err());
        assert!(ServerAddress::parse("[::1]x").is_err());
    }

    #[test]
    fn test_parse_list_dedups_in_order() {
        let servers = ServerAddress::parse_list("b:1, a, b:1, a:6379,c").unwrap();
        assert_eq!(
            servers,
            vec![
                ServerAddress::new("b", 1),
                ServerAddress::new("a", DEFAULT_PORT),
                ServerAddress::new("c", DEFAULT_PORT),
            ]
        );
    }

    #[test]
    fn test_display_brackets_ipv6() {
        assert_eq!(ServerAddress::new("::1", 1).to_string(), "[::1]:1");
        assert_eq!(ServerAddress::new("host", 2).to_string(), "host:2");
    }
}
