//! Per-connection rate limiting (§10.4): a token bucket for inbound control
//! messages and a separate one for inbound audio bytes, so a noisy client
//! can't starve others by spamming either channel.

use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use voice_agent_config::RateLimitConfig;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("message rate exceeded")]
    MessageRate,

    #[error("audio byte rate exceeded")]
    AudioRate,
}

struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rate_per_sec: f64, burst_multiplier: f64) -> Self {
        let capacity = rate_per_sec * burst_multiplier;
        Self { capacity, tokens: capacity, refill_per_sec: rate_per_sec, last_refill: Instant::now() }
    }

    fn try_take(&mut self, cost: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }
}

/// One rate limiter per connection (§4.4, §5: "limiter state is per
/// connection, never shared"). `enabled = false` makes every check a no-op,
/// matching the config toggle.
pub struct RateLimiter {
    enabled: bool,
    messages: Mutex<Bucket>,
    audio_bytes: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let burst = config.burst_multiplier as f64;
        Self {
            enabled: config.enabled,
            messages: Mutex::new(Bucket::new(config.messages_per_second as f64, burst)),
            audio_bytes: Mutex::new(Bucket::new(config.audio_bytes_per_second as f64, burst)),
        }
    }

    pub fn check_message(&self) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }
        if self.messages.lock().try_take(1.0) {
            Ok(())
        } else {
            Err(RateLimitError::MessageRate)
        }
    }

    pub fn check_audio(&self, bytes: usize) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }
        if self.audio_bytes.lock().try_take(bytes as f64) {
            Ok(())
        } else {
            Err(RateLimitError::AudioRate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(messages_per_second: u32, audio_bytes_per_second: u32) -> RateLimitConfig {
        RateLimitConfig { enabled: true, messages_per_second, audio_bytes_per_second, burst_multiplier: 1.0 }
    }

    #[test]
    fn allows_bursts_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new(&config(2, 1000));
        assert!(limiter.check_message().is_ok());
        assert!(limiter.check_message().is_ok());
        assert!(limiter.check_message().is_err());
    }

    #[test]
    fn audio_rate_tracks_bytes_not_messages() {
        let limiter = RateLimiter::new(&config(1000, 100));
        assert!(limiter.check_audio(60).is_ok());
        assert!(limiter.check_audio(60).is_err());
    }

    #[test]
    fn disabled_limiter_never_rejects() {
        let mut cfg = config(1, 1);
        cfg.enabled = false;
        let limiter = RateLimiter::new(&cfg);
        for _ in 0..10 {
            assert!(limiter.check_message().is_ok());
            assert!(limiter.check_audio(1000).is_ok());
        }
    }
}
