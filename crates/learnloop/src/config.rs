//! Server configuration.

use std::str::FromStr;
use std::time::Duration;

use learnloop_quiz::QuizConfig;
use learnloop_session::KeyCacheConfig;
use learnloop_transport::TransportConfig;

use crate::LearnLoopError;

/// Who receives a "send to all".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BroadcastScope {
    /// Every connection in the process, whatever its session.
    #[default]
    Hub,
    /// Only connections in the sender's session.
    Session,
}

impl FromStr for BroadcastScope {
    type Err = LearnLoopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hub" => Ok(Self::Hub),
            "session" => Ok(Self::Session),
            other => Err(LearnLoopError::Config(format!(
                "broadcast scope must be \"hub\" or \"session\", got {other:?}"
            ))),
        }
    }
}

/// Timing and buffering for each connection's two flows.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Deadline for a single write to the peer.
    ///
    /// Default: 10 seconds.
    pub write_wait: Duration,

    /// How long the inbound flow waits for any frame before giving up on
    /// the peer.
    ///
    /// Default: 60 seconds.
    pub pong_wait: Duration,

    /// Interval between liveness pings. Must be less than `pong_wait`.
    ///
    /// Default: 54 seconds (9/10 of `pong_wait`).
    pub ping_period: Duration,

    /// Upper bound of the random delay added before the first ping, so
    /// connections accepted together do not ping in lockstep.
    ///
    /// Default: 2 seconds.
    pub ping_jitter: Duration,

    /// Capacity of the outbound queue. A connection whose queue is full
    /// when a message arrives is dropped.
    ///
    /// Default: 256.
    pub send_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            ping_jitter: Duration::from_secs(2),
            send_queue_capacity: 256,
        }
    }
}

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    ///
    /// Default: `127.0.0.1:8080`.
    pub bind_addr: String,

    pub broadcast_scope: BroadcastScope,

    /// Fetch credential key sets over plain HTTP.
    pub dev_mode: bool,

    pub transport: TransportConfig,
    pub connection: ConnectionConfig,
    pub quiz: QuizConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            broadcast_scope: BroadcastScope::default(),
            dev_mode: false,
            transport: TransportConfig::default(),
            connection: ConnectionConfig::default(),
            quiz: QuizConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads overrides from the process environment.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `LEARNLOOP_ADDR` | `bind_addr` (`:8080` means all interfaces) |
    /// | `LEARNLOOP_DEV` | `dev_mode` (`1`/`true`/`yes`) |
    /// | `LEARNLOOP_QUESTION_TIMEOUT_SECS` | `quiz.question_timeout` |
    /// | `LEARNLOOP_BROADCAST_SCOPE` | `broadcast_scope` (`hub`/`session`) |
    pub fn from_env() -> Result<Self, LearnLoopError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LearnLoopError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("LEARNLOOP_ADDR") {
            config.bind_addr = if addr.starts_with(':') {
                format!("0.0.0.0{addr}")
            } else {
                addr
            };
        }
        if let Some(dev) = lookup("LEARNLOOP_DEV") {
            config.dev_mode = matches!(
                dev.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
        if let Some(secs) = lookup("LEARNLOOP_QUESTION_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                LearnLoopError::Config(format!(
                    "LEARNLOOP_QUESTION_TIMEOUT_SECS must be a whole number, got {secs:?}"
                ))
            })?;
            config.quiz.question_timeout = Duration::from_secs(secs);
        }
        if let Some(scope) = lookup("LEARNLOOP_BROADCAST_SCOPE") {
            config.broadcast_scope = scope.parse()?;
        }

        Ok(config)
    }

    /// Key cache settings for [`JwtAuthenticator`](learnloop_session::JwtAuthenticator).
    pub fn key_cache(&self) -> KeyCacheConfig {
        KeyCacheConfig {
            dev_mode: self.dev_mode,
            ..KeyCacheConfig::default()
        }
    }
}
