// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exponential backoff for transient upstream failures. Adapted from
//! the desktop build's LLM provider retry shape, generalized to any
//! fallible async operation rather than one completion API.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Backoff parameters for a retried operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// A config that never retries — used for call sites where a
    /// caller's own retry semantics (e.g. the Manager's best-effort
    /// `refresh_all_user_tokens`) already tolerate individual failures.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Retries `operation` up to `config.max_attempts` times, applying
/// exponential backoff between attempts, as long as `is_retryable`
/// returns true for the error. The first attempt always runs; the last
/// attempt's error (or success) is returned verbatim.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    config: RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_attempts || !is_retryable(&err) {
                    if attempt > 1 {
                        warn!(attempt, "retryable operation exhausted its attempts");
                    }
                    return Err(err);
                }
                let delay = config.delay_for_attempt(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
