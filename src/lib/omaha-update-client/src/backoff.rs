// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::{
    storage::{namespaced, Storage},
    time::TimeSource,
};
use futures::lock::Mutex;
use log::error;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

const FAILED_ATTEMPTS_KEY: &str = "backoffFailedAttempts";

// 2^20 times any sane base delay is already past any sane max delay.
const MAX_EXPONENT: u32 = 20;

/// Turns a count of consecutive failures into the time of the next attempt.
///
/// The delay for `n` recorded failures is `base * 2^n`, clamped to `[base, max]`.  The failure
/// count lives in the scheduler's own slice of `Storage` (keyed by the namespace given at
/// construction) so that it survives restarts independently of its owner's state.
pub struct ExponentialBackoffScheduler<ST, TS> {
    storage: Rc<Mutex<ST>>,
    failed_attempts_key: String,
    time_source: TS,
    base_delay: Duration,
    max_delay: Duration,
    generated_delay: Option<Duration>,
}

impl<ST, TS> ExponentialBackoffScheduler<ST, TS>
where
    ST: Storage,
    TS: TimeSource,
{
    pub fn new(
        namespace: &str,
        storage: Rc<Mutex<ST>>,
        time_source: TS,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        ExponentialBackoffScheduler {
            storage,
            failed_attempts_key: namespaced(namespace, FAILED_ATTEMPTS_KEY),
            time_source,
            base_delay,
            max_delay: max_delay.max(base_delay),
            generated_delay: None,
        }
    }

    pub fn get_current_time(&self) -> SystemTime {
        self.time_source.now()
    }

    pub fn time_source(&self) -> &TS {
        &self.time_source
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// The delay used after `failed_attempts` consecutive failures.
    pub fn delay_for_attempts(&self, failed_attempts: u32) -> Duration {
        let factor = 1u32 << failed_attempts.min(MAX_EXPONENT);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
            .max(self.base_delay)
    }

    pub async fn num_failed_attempts(&self) -> u32 {
        let storage = self.storage.lock().await;
        match storage.get_int(&self.failed_attempts_key).await {
            Some(count) if count > 0 => count.min(u32::MAX as i64) as u32,
            _ => 0,
        }
    }

    /// Returns `now + delay` for the current failure count, and remembers the delay.  The failure
    /// count itself is not touched.
    pub async fn calculate_next_timestamp(&mut self) -> SystemTime {
        let delay = self.delay_for_attempts(self.num_failed_attempts().await);
        self.generated_delay = Some(delay);
        self.get_current_time() + delay
    }

    /// The delay most recently produced by `calculate_next_timestamp()`.  Before one has been
    /// produced by this instance, the delay the persisted failure count would produce.
    pub async fn generated_delay(&self) -> Duration {
        match self.generated_delay {
            Some(delay) => delay,
            None => self.delay_for_attempts(self.num_failed_attempts().await),
        }
    }

    pub async fn increase_failed_attempts(&mut self) {
        let count = self.num_failed_attempts().await.saturating_add(1);
        self.write_failed_attempts(count).await;
    }

    pub async fn reset_failed_attempts(&mut self) {
        self.write_failed_attempts(0).await;
    }

    async fn write_failed_attempts(&mut self, count: u32) {
        let mut storage = self.storage.lock().await;
        if let Err(e) = storage.set_int(&self.failed_attempts_key, count.into()).await {
            error!("Unable to persist {}: {}", self.failed_attempts_key, e);
            return;
        }
        if let Err(e) = storage.commit().await {
            error!("Unable to commit backoff state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::MemStorage, time::MockTimeSource};
    use futures::executor::block_on;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn new_scheduler(
        storage: Rc<Mutex<MemStorage>>,
        time_source: MockTimeSource,
    ) -> ExponentialBackoffScheduler<MemStorage, MockTimeSource> {
        ExponentialBackoffScheduler::new("omaha", storage, time_source, HOUR, 5 * HOUR)
    }

    #[test]
    fn test_delay_bounded_and_non_decreasing() {
        let scheduler = new_scheduler(
            Rc::new(Mutex::new(MemStorage::new())),
            MockTimeSource::new_from_now(),
        );
        let mut last = Duration::ZERO;
        for attempts in 0..100 {
            let delay = scheduler.delay_for_attempts(attempts);
            assert!(delay >= HOUR && delay <= 5 * HOUR, "{:?} out of range", delay);
            assert!(delay >= last, "{:?} < {:?}", delay, last);
            last = delay;
        }
        assert_eq!(scheduler.delay_for_attempts(0), HOUR);
        assert_eq!(scheduler.delay_for_attempts(1), 2 * HOUR);
        assert_eq!(scheduler.delay_for_attempts(2), 4 * HOUR);
        assert_eq!(scheduler.delay_for_attempts(3), 5 * HOUR);
        assert_eq!(scheduler.delay_for_attempts(u32::MAX), 5 * HOUR);
    }

    #[test]
    fn test_calculate_next_timestamp_does_not_count_a_failure() {
        block_on(async {
            let time_source = MockTimeSource::new_from_now();
            let mut scheduler =
                new_scheduler(Rc::new(Mutex::new(MemStorage::new())), time_source.clone());

            let now = time_source.now();
            assert_eq!(scheduler.calculate_next_timestamp().await, now + HOUR);
            assert_eq!(scheduler.calculate_next_timestamp().await, now + HOUR);
            assert_eq!(scheduler.num_failed_attempts().await, 0);
            assert_eq!(scheduler.generated_delay().await, HOUR);
        });
    }

    #[test]
    fn test_failures_grow_the_delay_and_reset_clears_it() {
        block_on(async {
            let time_source = MockTimeSource::new_from_now();
            let mut scheduler =
                new_scheduler(Rc::new(Mutex::new(MemStorage::new())), time_source.clone());
            let now = time_source.now();

            scheduler.increase_failed_attempts().await;
            scheduler.increase_failed_attempts().await;
            assert_eq!(scheduler.num_failed_attempts().await, 2);
            assert_eq!(scheduler.calculate_next_timestamp().await, now + 4 * HOUR);

            scheduler.reset_failed_attempts().await;
            assert_eq!(scheduler.num_failed_attempts().await, 0);
            assert_eq!(scheduler.calculate_next_timestamp().await, now + HOUR);
        });
    }

    #[test]
    fn test_failed_attempts_persist_under_namespace() {
        block_on(async {
            let storage = Rc::new(Mutex::new(MemStorage::new()));
            let mut scheduler = new_scheduler(Rc::clone(&storage), MockTimeSource::new_from_now());
            scheduler.increase_failed_attempts().await;

            let storage = storage.lock().await;
            assert_eq!(storage.get_int("omaha.backoffFailedAttempts").await, Some(1));
            assert!(storage.committed());
        });
    }

    #[test]
    fn test_generated_delay_before_any_calculation_uses_persisted_count() {
        block_on(async {
            let storage = Rc::new(Mutex::new(MemStorage::new()));
            storage.lock().await.set_int("omaha.backoffFailedAttempts", 1).await.unwrap();

            let scheduler = new_scheduler(storage, MockTimeSource::new_from_now());
            assert_eq!(scheduler.generated_delay().await, 2 * HOUR);
        });
    }
}
