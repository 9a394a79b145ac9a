use std::time::Duration;

/// Exponential reconnect schedule. Pure: timers live in the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub growth_factor: f64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            growth_factor: 2.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect `attempt` (1-based): `base * factor^(attempt - 1)`.
    /// `None` once `attempt` exceeds the ceiling.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.growth_factor.powi(exponent);
        Some(Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX))
    }

    /// Count one more failure on top of `failures_so_far` and decide.
    pub fn decide(&self, failures_so_far: u32) -> ReconnectDecision {
        let attempt = failures_so_far.saturating_add(1);
        match self.delay_for_attempt(attempt) {
            Some(delay) => ReconnectDecision::Retry { attempt, delay },
            None => ReconnectDecision::GiveUp { attempts: attempt },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(500),
            growth_factor: 2.0,
            max_attempts: 10,
        }
    }

    #[test]
    fn delays_grow_geometrically() {
        let policy = policy();
        let delays: Vec<u128> = (1..=5)
            .map(|n| policy.delay_for_attempt(n).unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000]);
    }

    #[test]
    fn delays_strictly_increase_up_to_the_ceiling() {
        let policy = ReconnectPolicy {
            growth_factor: 1.5,
            ..policy()
        };
        let mut previous = Duration::ZERO;
        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_for_attempt(attempt).unwrap();
            assert!(delay > previous, "attempt {} did not grow", attempt);
            previous = delay;
        }
        assert_eq!(policy.delay_for_attempt(policy.max_attempts + 1), None);
    }

    #[test]
    fn decide_gives_up_past_the_ceiling() {
        let policy = policy();
        assert_eq!(
            policy.decide(0),
            ReconnectDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(500)
            }
        );
        assert!(matches!(
            policy.decide(9),
            ReconnectDecision::Retry { attempt: 10, .. }
        ));
        assert_eq!(policy.decide(10), ReconnectDecision::GiveUp { attempts: 11 });
    }

    #[test]
    fn huge_exponents_saturate() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(3600),
            growth_factor: 1e6,
            max_attempts: u32::MAX,
        };
        assert_eq!(policy.delay_for_attempt(400), Some(Duration::MAX));
    }
}
