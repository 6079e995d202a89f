use rand::Rng;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;

/// Exponential Backoff mit Full Jitter für alle Store-Aufrufe.
///
/// Wiederholt nur transiente Fehler (Throttling). Ohne `max_attempts`
/// wird unbegrenzt wiederholt, die Wartezeit ist durch `max_delay_ms` gedeckelt.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RetryPolicy {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Obergrenze der Wartezeit vor Versuch `attempt` (1-basiert)
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Zufällige Wartezeit in `[0, ceiling]`
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }

    /// Führe `op` aus und wiederhole bei transienten Fehlern
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if let Some(max) = self.max_attempts {
                        if attempt >= max {
                            tracing::warn!(
                                operation,
                                attempt,
                                error = %err,
                                "Retry budget exhausted"
                            );
                            return Err(err);
                        }
                    }
                    let delay = self.jittered_delay(attempt);
                    tracing::debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
