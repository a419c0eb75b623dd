use std::net::ToSocketAddrs;
use std::str::FromStr;
use std::{fmt, vec};

/// Represents a host and port combination.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct HostPort {
    /// The hostname or IP address.
    pub host: String,
    /// The port number.
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        HostPort {
            host: host.into(),
            port,
        }
    }

    pub fn from_socket_addr(addr: std::net::SocketAddr) -> Self {
        HostPort {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }

    /// The endpoint a single-node deployment listens on when no host list is
    /// given.
    pub fn default_local() -> Self {
        HostPort::new("localhost", 8080)
    }
}

impl ToSocketAddrs for HostPort {
    type Iter = vec::IntoIter<std::net::SocketAddr>;
    fn to_socket_addrs(&self) -> std::io::Result<Self::Iter> {
        (self.host.as_str(), self.port).to_socket_addrs()
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostPort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 {
            return Err("Invalid HostPort format".to_string());
        }
        let host = parts[0].to_string();
        let port = parts[1].parse::<u16>().map_err(|e| e.to_string())?;
        Ok(HostPort { host, port })
    }
}

/// Parses a comma-separated `host:port,host:port` list, as passed on the
/// command line. An empty input yields the default local endpoint.
pub fn parse_host_list(s: &str) -> Result<Vec<HostPort>, String> {
    if s.is_empty() {
        return Ok(vec![HostPort::default_local()]);
    }
    s.split(',').map(HostPort::from_str).collect()
}
