//! Producer used by the demo: waits, then echoes its input with a timestamp.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use querygate_cache::{ProducerFailure, QueryFn, QueryKey};
use std::time::Duration;
use tracing::debug;

/// Answers `"<input> - <ISO timestamp>"` after `delay`.
#[derive(Debug, Clone)]
pub struct DelayedEcho {
    delay: Duration,
}

impl DelayedEcho {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl QueryFn<String> for DelayedEcho {
    async fn fetch(&self, key: &QueryKey) -> Result<String, ProducerFailure> {
        let input = key.last_str().unwrap_or_default().to_string();
        debug!(key = %key, delay_ms = self.delay.as_millis() as u64, "Echo fetch started");
        tokio::time::sleep(self.delay).await;
        Ok(format!(
            "{} - {}",
            input,
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querygate_cache::query_key;

    #[tokio::test]
    async fn test_echo_formats_input_and_timestamp() {
        let echo = DelayedEcho::new(Duration::from_millis(1));
        let value = echo.fetch(&query_key!["enabled", "abc"]).await.unwrap();
        let (input, stamp) = value.split_once(" - ").unwrap();
        assert_eq!(input, "abc");
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
        assert!(stamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_echo_handles_empty_input() {
        let echo = DelayedEcho::new(Duration::from_millis(1));
        let value = echo.fetch(&query_key!["skipToken", ""]).await.unwrap();
        assert!(value.starts_with(" - "));
    }
}
