//! Participant types: who a connection is and which session it joined.

use std::fmt;

/// Opaque identifier of a quiz session, taken verbatim from the upgrade
/// request. Never validated beyond being present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// What a verified credential says about its holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable external user id.
    pub user_id: String,
    /// The platform instance that issued the credential.
    pub instance_name: String,
}

/// One connected participant.
///
/// `login` starts empty and is set by the client's join message; until
/// then the connection may chat but not take part in a quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub login: String,
    pub user_id: String,
    pub session_id: SessionId,
    pub instance_name: String,
}

impl Participant {
    pub fn new(identity: Identity, session_id: SessionId) -> Self {
        Self {
            login: String::new(),
            user_id: identity.user_id,
            session_id,
            instance_name: identity.instance_name,
        }
    }

    /// Whether the participant has set a display login.
    pub fn has_joined(&self) -> bool {
        !self.login.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_participant_has_no_login() {
        let identity = Identity {
            user_id: "u-1".into(),
            instance_name: "campus".into(),
        };
        let mut p = Participant::new(identity, SessionId::new("s-1"));
        assert!(!p.has_joined());
        assert_eq!(p.user_id, "u-1");
        assert_eq!(p.session_id.as_str(), "s-1");

        p.login = "alice".into();
        assert!(p.has_joined());
    }

    #[test]
    fn test_session_id_display_is_raw() {
        assert_eq!(SessionId::from("room 42").to_string(), "room 42");
    }
}
