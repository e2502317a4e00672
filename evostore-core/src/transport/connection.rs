use crate::error::{EvoError, Result};
use std::fmt;
use std::str::FromStr;

/// Network fabric named by a connection string. Every fabric is carried as
/// HTTP/1.1 over TCP; the name only selects how addresses are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fabric {
    Tcp,
    Http,
    OfiTcp,
}

impl Fabric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fabric::Tcp => "tcp",
            Fabric::Http => "http",
            Fabric::OfiTcp => "ofi+tcp",
        }
    }
}

impl FromStr for Fabric {
    type Err = EvoError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Fabric::Tcp),
            "http" => Ok(Fabric::Http),
            "ofi+tcp" | "ofi+sockets" => Ok(Fabric::OfiTcp),
            other => Err(EvoError::Connection(format!(
                "unsupported transport '{}': expected tcp, http or ofi+tcp",
                other
            ))),
        }
    }
}

impl fmt::Display for Fabric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"<transport>://<host>:<port>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub fabric: Fabric,
    pub address: String,
}

impl ConnectionString {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let (scheme, rest) = trimmed.split_once("://").ok_or_else(|| {
            EvoError::Connection(format!(
                "invalid connection string '{}': expected <transport>://<host>:<port>",
                trimmed
            ))
        })?;

        Ok(Self {
            fabric: scheme.parse()?,
            address: parse_host_port(rest.trim_end_matches('/'), "address")?,
        })
    }

    /// Parses `value` as a full connection string or a bare `host:port` on `fabric`.
    pub fn parse_for(fabric: Fabric, value: &str) -> Result<Self> {
        if value.contains("://") {
            let parsed = Self::parse(value)?;
            if parsed.fabric != fabric {
                return Err(EvoError::Connection(format!(
                    "address '{}' uses transport {} but {} was requested",
                    value, parsed.fabric, fabric
                )));
            }
            return Ok(parsed);
        }

        Ok(Self {
            fabric,
            address: parse_host_port(value, "address")?,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.fabric, self.address)
    }
}

pub fn parse_host_port(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    let invalid = || {
        EvoError::Connection(format!(
            "invalid {} '{}': expected host:port",
            field, trimmed
        ))
    };

    let (host_raw, port_raw) = trimmed.rsplit_once(':').ok_or_else(invalid)?;
    let host = host_raw.trim();
    let port = port_raw.trim();
    if host.is_empty() || port.is_empty() {
        return Err(invalid());
    }

    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        return Err(invalid());
    }

    let parsed_port = port.parse::<u16>().map_err(|_| {
        EvoError::Connection(format!(
            "invalid {} '{}': port must be u16",
            field, trimmed
        ))
    })?;

    Ok(format!("{}:{}", host, parsed_port))
}
