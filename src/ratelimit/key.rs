//! Client key derivation.

use std::net::IpAddr;

/// The identity a request is rate limited under.
///
/// An explicit user id always wins over the peer address, so a client that
/// sends a user id is limited under that id instead of its IP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    /// Requests that carry a user identifier
    User(String),
    /// Requests identified by the remote address; `None` if it is unknown
    Ip(Option<IpAddr>),
}

impl ClientKey {
    /// Resolve the key from an optional user id and the peer address.
    ///
    /// Blank user ids are ignored.
    pub fn resolve(user: Option<&str>, remote: Option<IpAddr>) -> Self {
        match user.filter(|u| !u.trim().is_empty()) {
            Some(user) => ClientKey::User(user.to_string()),
            None => ClientKey::Ip(remote),
        }
    }

    /// The string form used as the store key.
    pub fn to_string_key(&self) -> String {
        match self {
            ClientKey::User(user) => format!("user:{}", user),
            ClientKey::Ip(Some(ip)) => format!("ip:{}", ip),
            ClientKey::Ip(None) => "ip:unknown".to_string(),
        }
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_takes_precedence_over_ip() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let key = ClientKey::resolve(Some("alice"), Some(ip));
        assert_eq!(key, ClientKey::User("alice".to_string()));
        assert_eq!(key.to_string(), "user:alice");
    }

    #[test]
    fn test_falls_back_to_ip() {
        let ip: IpAddr = "192.168.1.7".parse().unwrap();
        assert_eq!(ClientKey::resolve(None, Some(ip)).to_string(), "ip:192.168.1.7");

        let v6: IpAddr = "::1".parse().unwrap();
        assert_eq!(ClientKey::resolve(None, Some(v6)).to_string(), "ip:::1");
    }

    #[test]
    fn test_blank_user_is_ignored() {
        let ip: IpAddr = "10.0.0.2".parse().unwrap();
        assert_eq!(ClientKey::resolve(Some("  "), Some(ip)).to_string(), "ip:10.0.0.2");
        assert_eq!(ClientKey::resolve(Some(""), None).to_string(), "ip:unknown");
    }
}
