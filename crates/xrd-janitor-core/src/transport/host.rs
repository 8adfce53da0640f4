use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static HOST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Matches: host, user@host, host:port, user@host:port
    Regex::new(r"^(?:([^@]*)@)?([^:/@]+)(?::([^:/@]*))?$").expect("Invalid host regex")
});

static USER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_]([a-z0-9_-]{0,31}|[a-z0-9_-]{0,30}\$)$").expect("Invalid user regex")
});

static OWNER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z_][a-z0-9_-]*):([a-z_][a-z0-9_-]*)$").expect("Invalid owner regex")
});

/// `[user@]host[:port]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    pub host: String,
    pub user: String,
    pub port: u16,
}

impl Host {
    pub fn parse(spec: &str, default_user: &str, default_port: u16) -> Result<Host> {
        let invalid = |reason: String| Error::InvalidServer {
            spec: spec.to_string(),
            reason,
        };

        let caps = HOST_REGEX
            .captures(spec)
            .ok_or_else(|| invalid("host name is missing".to_string()))?;

        let user = match caps.get(1) {
            Some(user) if USER_REGEX.is_match(user.as_str()) => user.as_str().to_string(),
            Some(user) => return Err(invalid(format!("user \"{}\" is not valid", user.as_str()))),
            None => default_user.to_string(),
        };

        let port = match caps.get(3) {
            Some(port) => port
                .as_str()
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| invalid(format!("port \"{}\" is not valid", port.as_str())))?,
            None => default_port,
        };

        Ok(Host {
            host: caps[2].to_string(),
            user,
            port,
        })
    }

    /// `localhost` means a plain local move without ssh.
    pub fn is_local(&self) -> bool {
        self.host == "localhost"
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// `user:group` applied to created files, links and directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerGroup {
    pub user: String,
    pub group: String,
}

impl FromStr for OwnerGroup {
    type Err = Error;

    fn from_str(value: &str) -> Result<OwnerGroup> {
        let caps = OWNER_REGEX
            .captures(value)
            .ok_or_else(|| Error::InvalidOwner(value.to_string()))?;
        Ok(OwnerGroup {
            user: caps[1].to_string(),
            group: caps[2].to_string(),
        })
    }
}

impl fmt::Display for OwnerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.group)
    }
}
