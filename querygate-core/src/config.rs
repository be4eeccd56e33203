//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::entry::Staleness;
use crate::error::{ConfigError, QueryResult};

/// Upper bound on time-based staleness (one week).
pub const MAX_STALE_TIME: Duration = Duration::from_secs(7 * 24 * 3600);

/// Configuration for a query client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Staleness applied to keys whose requests do not override it.
    pub default_staleness: Staleness,
    /// Abort the producer task of a fetch that was dropped or superseded.
    ///
    /// Settlement is already discarded by generation; this only stops the
    /// producer from running to completion.
    pub abort_stale_fetches: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_staleness: Staleness::Never,
            abort_stale_fetches: true,
        }
    }
}

impl QueryConfig {
    /// Create a new query config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default staleness policy.
    pub fn with_staleness(mut self, staleness: Staleness) -> Self {
        self.default_staleness = staleness;
        self
    }

    /// Enable or disable aborting stale producer tasks.
    pub fn with_abort_stale_fetches(mut self, abort: bool) -> Self {
        self.abort_stale_fetches = abort;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> QueryResult<()> {
        if let Staleness::After(max_age) = self.default_staleness {
            if max_age > MAX_STALE_TIME {
                return Err(ConfigError::InvalidValue {
                    field: "default_staleness".to_string(),
                    value: format!("{:?}", max_age),
                    reason: "use Staleness::Never instead of stale times above one week"
                        .to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}
