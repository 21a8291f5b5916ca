use std::time::Duration;

use rand::Rng;

/// Reconnect backoff schedule: exponential with jitter, capped.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt.
    pub initial: Duration,
    /// Upper bound on the delay between attempts.
    pub max: Duration,
    /// Growth factor applied per failed attempt.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before reconnect attempt `attempt` (0-based), with ±20% jitter
    /// so a fleet of clients does not reconnect in lockstep.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial.as_secs_f64() * self.multiplier.powi(attempt.min(32) as i32);
        let capped = base.min(self.max.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_secs_f64((capped * jitter).min(self.max.as_secs_f64()))
    }
}

/// Configuration for an RPC peer.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Reconnect automatically after a connection loss. Client-side only;
    /// accepted peers never reconnect.
    pub auto_reconnect: bool,
    /// Backoff schedule used between reconnect attempts.
    pub backoff: BackoffConfig,
    /// Default deadline for outgoing calls. `None` means calls wait
    /// indefinitely (until cancellation or connection loss).
    pub call_timeout: Option<Duration>,
    /// Queue calls issued before the connection is `Ready` instead of
    /// failing them with `NotConnected`. The queue is bounded by
    /// `max_queued_calls`; overflow rejects the newest call.
    pub queue_calls_before_ready: bool,
    /// Upper bound on the pre-ready call queue.
    pub max_queued_calls: usize,
    /// Deadline for the introspection exchange performed before `Ready`.
    pub handshake_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            backoff: BackoffConfig::default(),
            call_timeout: Some(Duration::from_secs(30)),
            queue_calls_before_ready: true,
            max_queued_calls: 64,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = BackoffConfig {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
            multiplier: 2.0,
        };

        // Jitter is ±20%, so compare against the widest bounds.
        let first = backoff.delay(0);
        assert!(first >= Duration::from_millis(80), "got {first:?}");
        assert!(first <= Duration::from_millis(120), "got {first:?}");

        let third = backoff.delay(2);
        assert!(third >= Duration::from_millis(320), "got {third:?}");
        assert!(third <= Duration::from_millis(480), "got {third:?}");

        // Far past the cap, the delay never exceeds max.
        for attempt in 10..20 {
            assert!(backoff.delay(attempt) <= backoff.max);
        }
    }

    #[test]
    fn default_config_queues_before_ready() {
        let config = RpcConfig::default();
        assert!(config.queue_calls_before_ready);
        assert!(!config.auto_reconnect);
        assert!(config.call_timeout.is_some());
    }
}
