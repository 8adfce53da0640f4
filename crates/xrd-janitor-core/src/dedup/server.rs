use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::link::squash_separators;
use crate::transport::Host;

static SERVER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Matches: [user@]host[:port]/name/space
    Regex::new(r"^([^/]+)(/.*)$").expect("Invalid server regex")
});

static RELATIVE_SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|/)\.{1,2}(/|$)").expect("Invalid segment regex"));

/// `[user@]host[:port]/name/space` naming one storage server's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub host: Host,
    /// Always of the form `/name/space/`.
    pub namespace: String,
}

impl ServerSpec {
    pub fn parse(spec: &str, default_user: &str, default_port: u16) -> Result<ServerSpec> {
        let caps = SERVER_REGEX.captures(spec).ok_or_else(|| Error::InvalidServer {
            spec: spec.to_string(),
            reason: "there is no name space defined".to_string(),
        })?;
        let namespace = &caps[2];

        if RELATIVE_SEGMENT_REGEX.is_match(namespace) {
            return Err(Error::InvalidServer {
                spec: spec.to_string(),
                reason: format!("relative paths are not allowed: \"{}\"", namespace),
            });
        }

        Ok(ServerSpec {
            host: Host::parse(&caps[1], default_user, default_port)?,
            namespace: squash_separators(&format!("{}/", namespace)),
        })
    }

    pub fn name(&self) -> &str {
        &self.host.host
    }

    /// `entry` with this server's namespace prefix removed.
    pub fn logical_key<'a>(&self, entry: &'a str) -> &'a str {
        entry.strip_prefix(self.namespace.as_str()).unwrap_or(entry)
    }
}

impl fmt::Display for ServerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_spec() {
        let server = ServerSpec::parse("alice@xrd1.example.com:2222/xrd//space", "root", 22).unwrap();
        assert_eq!(server.name(), "xrd1.example.com");
        assert_eq!(server.host.user, "alice");
        assert_eq!(server.host.port, 2222);
        assert_eq!(server.namespace, "/xrd/space/");
    }

    #[test]
    fn test_parse_server_spec_requires_namespace() {
        assert!(ServerSpec::parse("xrd1.example.com", "root", 22).is_err());
        assert!(ServerSpec::parse("xrd1/xrd/../etc", "root", 22).is_err());
        assert!(ServerSpec::parse("xrd1/xrd/./space", "root", 22).is_err());
        assert!(ServerSpec::parse("xrd1/xrd/..", "root", 22).is_err());
        assert!(ServerSpec::parse("/xrd/space", "root", 22).is_err());
        assert!(ServerSpec::parse("xrd1/xrd/..hidden", "root", 22).is_ok());
    }

    #[test]
    fn test_logical_key() {
        let server = ServerSpec::parse("se2/bobsxrd/space", "root", 22).unwrap();
        assert_eq!(server.logical_key("/bobsxrd/space/02/file"), "02/file");
        assert_eq!(server.logical_key("/elsewhere/file"), "/elsewhere/file");
    }
}
