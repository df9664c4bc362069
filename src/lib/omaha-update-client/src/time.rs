// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Wall-clock access for the client.  All of the persisted timestamps are absolute wall-clock
//! values, so everything that needs "now" goes through a [`TimeSource`] that tests can control.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

/// A source of the current wall-clock time.
pub trait TimeSource {
    fn now(&self) -> SystemTime;
}

/// The real system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardTimeSource;

impl TimeSource for StandardTimeSource {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A manually driven clock.  Clones share the same underlying time, so a test can keep one
/// handle and move time forward for the component that owns the other.
#[derive(Clone, Debug)]
pub struct MockTimeSource {
    now: Rc<Cell<SystemTime>>,
}

impl MockTimeSource {
    pub fn new(now: SystemTime) -> Self {
        MockTimeSource { now: Rc::new(Cell::new(now)) }
    }

    pub fn new_from_now() -> Self {
        Self::new(SystemTime::now())
    }

    pub fn set(&self, now: SystemTime) {
        self.now.set(now);
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> SystemTime {
        self.now.get()
    }
}

/// Milliseconds since the unix epoch, negative for times before it.
pub fn to_millis(time: SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(since) => since.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Inverse of [`to_millis`].
pub fn from_millis(millis: i64) -> SystemTime {
    if millis >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_millis(millis as u64)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
    }
}

/// How far `later` is ahead of `earlier`, or zero if it isn't.
pub fn saturating_duration_since(later: SystemTime, earlier: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_round_trip() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_millis(1_600_000_000_123);
        assert_eq!(to_millis(time), 1_600_000_000_123);
        assert_eq!(from_millis(1_600_000_000_123), time);
    }

    #[test]
    fn test_millis_before_epoch() {
        let time = SystemTime::UNIX_EPOCH - Duration::from_millis(5);
        assert_eq!(to_millis(time), -5);
        assert_eq!(from_millis(-5), time);
    }

    #[test]
    fn test_mock_time_source_shared_between_clones() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        let time_source = MockTimeSource::new(start);
        let other = time_source.clone();

        time_source.advance(Duration::from_secs(5));
        assert_eq!(other.now(), start + Duration::from_secs(5));

        other.set(start);
        assert_eq!(time_source.now(), start);
    }

    #[test]
    fn test_saturating_duration_since() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        assert_eq!(saturating_duration_since(t + Duration::from_secs(3), t), Duration::from_secs(3));
        assert_eq!(saturating_duration_since(t, t + Duration::from_secs(3)), Duration::ZERO);
    }
}
