// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use futures::future::BoxFuture;
use futures::prelude::*;
use omaha_update_client::state_machine::timer::Timer;
use std::time::Duration;

pub struct TokioTimer;

impl Timer for TokioTimer {
    fn wait(&mut self, delay: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(delay).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Instant, SystemTime};

    #[tokio::test]
    async fn test_wait() {
        let start = Instant::now();
        TokioTimer.wait(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_wait_until_past_is_immediate() {
        let now = SystemTime::now();
        let start = Instant::now();
        TokioTimer.wait_until(now, now - Duration::from_secs(60)).await;
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
