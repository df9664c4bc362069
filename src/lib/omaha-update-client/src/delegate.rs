// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::{
    backoff::ExponentialBackoffScheduler, request_generator::RequestGenerator, storage::Storage,
    time::TimeSource,
};
use std::time::SystemTime;

#[cfg(test)]
mod mock;
#[cfg(test)]
pub use mock::MockDelegate;

/// The outcome of one attempt to POST the pending request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PostResult {
    /// There was no pending request.
    NoRequest,
    /// The request (and the follow-up ping, after an install event) was accepted.
    Sent,
    /// The request failed and will be retried with backoff.
    Failed,
    /// The next attempt isn't due yet.
    Scheduled,
}

/// The platform-specific facts and capabilities the state machine depends on.
///
/// The completion hooks default to doing nothing; they exist so that hosts and tests can observe
/// the state machine's progress.
pub trait OmahaDelegate {
    type Storage: Storage;
    type TimeSource: TimeSource;

    /// Whether the application was preloaded on the device's system image.
    fn is_in_system_image(&self) -> bool;

    /// The backoff scheduler used for POST attempts.  It must share the state machine's storage.
    fn scheduler(&mut self) -> &mut ExponentialBackoffScheduler<Self::Storage, Self::TimeSource>;

    /// A new unique ID, used for request and session IDs.
    fn generate_uuid(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Whether the user is actively using the application.  New requests are only registered
    /// while it is.
    fn is_app_being_used(&self) -> bool;

    /// Arrange for the state machine to be run again at `next`.
    fn schedule_service(&mut self, now: SystemTime, next: SystemTime);

    /// The request generator for this product, or None if requests can't be made (for example
    /// on an unofficial build).
    fn create_request_generator(&self) -> Option<RequestGenerator>;

    fn on_handle_post_request_done(&mut self, _result: PostResult, _install_event_was_sent: bool) {}

    fn on_register_new_request_done(&mut self, _next_request: SystemTime, _next_post: SystemTime) {}

    fn on_save_state_done(&mut self, _next_request: SystemTime, _next_post: SystemTime) {}
}
