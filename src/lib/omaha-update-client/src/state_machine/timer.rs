// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::time::saturating_duration_since;
use futures::future::BoxFuture;
use futures::prelude::*;
use std::time::{Duration, SystemTime};

/// Waits until the next scheduled run of the state machine is due.
pub trait Timer {
    /// Returns a future that completes after `delay`.
    fn wait(&mut self, delay: Duration) -> BoxFuture<'static, ()>;

    /// Returns a future that completes once `next` is reached, judging by `now`.  Completes
    /// immediately if `next` is already in the past.
    fn wait_until(&mut self, now: SystemTime, next: SystemTime) -> BoxFuture<'static, ()> {
        self.wait(saturating_duration_since(next, now))
    }
}

/// A timer that never waits.
pub struct StubTimer;

impl Timer for StubTimer {
    fn wait(&mut self, _delay: Duration) -> BoxFuture<'static, ()> {
        future::ready(()).boxed()
    }
}

#[cfg(test)]
pub use mock::MockTimer;

#[cfg(test)]
mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// A timer that asserts it is asked to wait exactly the expected durations, in order.
    ///
    /// Once the expectations run out, every wait blocks forever, so a loop driven by this timer
    /// stalls instead of spinning.
    #[derive(Debug, Default)]
    pub struct MockTimer {
        expected: VecDeque<Duration>,
    }

    impl MockTimer {
        pub fn new() -> Self {
            MockTimer::default()
        }

        pub fn expect(&mut self, delay: Duration) {
            self.expected.push_back(delay);
        }

        pub fn is_done(&self) -> bool {
            self.expected.is_empty()
        }
    }

    impl Timer for MockTimer {
        fn wait(&mut self, delay: Duration) -> BoxFuture<'static, ()> {
            match self.expected.pop_front() {
                Some(expected) => {
                    assert_eq!(delay, expected, "unexpected wait");
                    future::ready(()).boxed()
                }
                None => future::pending().boxed(),
            }
        }
    }
}
