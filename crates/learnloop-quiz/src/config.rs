//! Quiz engine configuration.

use std::time::Duration;

/// Settings for every quiz game in the process.
///
/// The armed timer (`question_timeout`) and the value advertised to
/// clients (`advertised_timeout_secs`) are configured separately. Clients
/// use the advertised value for their countdown display; the server
/// closes the question when the armed timer fires.
#[derive(Debug, Clone)]
pub struct QuizConfig {
    /// How long a question stays open before it is closed automatically.
    ///
    /// Default: 30 seconds.
    pub question_timeout: Duration,

    /// The `timeout` field sent in every question-started message.
    ///
    /// Default: 30.
    pub advertised_timeout_secs: u64,

    /// Capacity of each game actor's command channel.
    ///
    /// Default: 64.
    pub channel_size: usize,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            question_timeout: Duration::from_secs(30),
            advertised_timeout_secs: 30,
            channel_size: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiz_config_default() {
        let config = QuizConfig::default();
        assert_eq!(config.question_timeout, Duration::from_secs(30));
        assert_eq!(config.advertised_timeout_secs, 30);
        assert_eq!(config.channel_size, 64);
    }
}
