//! Worker retry policy.
//!
//! Fetch workers retry failed range retrievals until cancellation; how long
//! they pause between attempts is a policy injected into the worker loop.
//! The default is immediate retry. Policies never give up: abandoning a
//! sub-range would violate exactly-once delivery, so only cancellation
//! stops a retry loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay policy applied between failed retrieval attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Retry immediately with no pause.
    Immediate,

    /// Fixed pause between attempts.
    Fixed {
        /// Delay duration.
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },

    /// Exponentially growing pause, capped.
    Exponential {
        /// Delay before the first retry.
        #[serde(with = "humantime_serde")]
        initial_delay: Duration,

        /// Upper bound on the delay.
        #[serde(with = "humantime_serde")]
        max_delay: Duration,

        /// Growth factor per attempt (default: 2.0).
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
}

const fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Immediate
    }
}

impl RetryPolicy {
    /// Delay before the given retry attempt (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed { delay } => *delay,
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                #[allow(clippy::cast_possible_wrap)] // attempt count won't exceed i32
                let secs =
                    initial_delay.as_secs_f64() * multiplier.powi(attempt.saturating_sub(1) as i32);
                // Cap in float space: from_secs_f64 panics on overflow.
                Duration::from_secs_f64(secs.min(max_delay.as_secs_f64()))
            },
        }
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_never_pauses() {
        let policy = RetryPolicy::Immediate;
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(100), Duration::ZERO);
    }

    #[test]
    fn exponential_grows_and_caps() {
        let policy = RetryPolicy::Exponential {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[test]
    fn deserializes_from_toml() {
        let policy: RetryPolicy = toml::from_str(
            r#"
            type = "exponential"
            initial_delay = "500ms"
            max_delay = "30s"
            "#,
        )
        .expect("parse policy");
        assert_eq!(
            policy.delay_for_attempt(1),
            Duration::from_millis(500)
        );
        assert_eq!(policy.delay_for_attempt(100), Duration::from_secs(30));
    }
}
