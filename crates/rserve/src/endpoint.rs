use std::fmt;

use crate::error::RserveError;

/// Address of a local Rserve daemon.
///
/// QAP1 has no authentication worth the name, so the only hosts accepted are
/// `localhost` and the empty host (which means `localhost`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parse and validate a `host:port` address.
    pub fn parse(addr: &str) -> Result<Self, RserveError> {
        let (host, port) = split_host_port(addr)?;

        if !host.is_empty() && host != "localhost" {
            return Err(RserveError::Config(
                "remote evaluation channel must be local".into(),
            ));
        }

        let port: u16 = port
            .parse()
            .map_err(|e| RserveError::Config(format!("invalid port '{port}': {e}")))?;

        Ok(Self {
            host: "localhost".to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address string suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Split `host:port` or `[host]:port`. The port may be empty here; the
/// caller rejects that when parsing it.
fn split_host_port(addr: &str) -> Result<(&str, &str), RserveError> {
    let missing_port = || RserveError::Config(format!("address '{addr}': missing port"));

    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| RserveError::Config(format!("address '{addr}': missing ']'")))?;
        let port = tail.strip_prefix(':').ok_or_else(missing_port)?;
        return Ok((host, port));
    }

    let (host, port) = addr.rsplit_once(':').ok_or_else(missing_port)?;
    if host.contains(':') {
        return Err(RserveError::Config(format!(
            "address '{addr}': too many colons"
        )));
    }
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_config_err(addr: &str) -> bool {
        matches!(Endpoint::parse(addr), Err(RserveError::Config(_)))
    }

    #[test]
    fn accepts_localhost() {
        let ep = Endpoint::parse("localhost:6311").unwrap();
        assert_eq!(ep.host(), "localhost");
        assert_eq!(ep.port(), 6311);
        assert_eq!(ep.to_string(), "localhost:6311");
    }

    #[test]
    fn empty_host_means_localhost() {
        let ep = Endpoint::parse(":6311").unwrap();
        assert_eq!(ep.socket_addr(), "localhost:6311");
    }

    #[test]
    fn rejects_remote_hosts() {
        for addr in ["remote.example.com:6311", "10.0.0.5:6311", "[2001:db8::1]:6311"] {
            match Endpoint::parse(addr) {
                Err(RserveError::Config(msg)) => {
                    assert_eq!(msg, "remote evaluation channel must be local", "{addr}")
                }
                other => panic!("expected config error for {addr}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_bad_ports() {
        for addr in ["localhost", "localhost:", "localhost:zzz", "localhost:70000", "localhost:-1"] {
            assert!(is_config_err(addr), "expected error for '{addr}'");
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(is_config_err(""));
        assert!(is_config_err("a:b:c"));
        assert!(is_config_err("[localhost"));
    }
}
