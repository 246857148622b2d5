use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_TIME_LIMIT_SECS: i64 = 20;

/// Runtime tunables, read once at startup and injected into handlers.
#[derive(Debug, Clone)]
pub struct QuizConfig {
    /// Seconds a user has to answer an issued question.
    pub time_limit_secs: i64,
}

impl QuizConfig {
    pub fn from_env() -> Self {
        let time_limit_secs = std::env::var("QUESTION_TIME_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIME_LIMIT_SECS);
        Self { time_limit_secs }
    }

    /// Expiry deadline for a question issued at `now`. Fixed at creation,
    /// never extended.
    pub fn deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.time_limit_secs)
    }
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
        }
    }
}
