// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use futures::lock::Mutex;
use omaha_update_client::{
    backoff::ExponentialBackoffScheduler,
    common::format_system_time,
    delegate::{OmahaDelegate, PostResult},
    request_generator::{DeviceConfig, RequestGenerator},
    state_machine::{PREF_NAMESPACE, POST_BASE_DELAY, POST_MAX_DELAY},
    storage::Storage,
    time::TimeSource,
};
use std::cell::Cell;
use std::rc::Rc;
use std::time::SystemTime;
use tracing::{info, warn};

/// The host's answers to the state machine's questions.
///
/// Scheduling a wake-up records it in a shared cell that the service loop takes from after
/// every run.
pub struct HostDelegate<ST, TS> {
    scheduler: ExponentialBackoffScheduler<ST, TS>,
    device_config: Option<DeviceConfig>,
    in_system_image: bool,
    app_in_use: bool,
    next_wakeup: Rc<Cell<Option<SystemTime>>>,
}

impl<ST, TS> HostDelegate<ST, TS>
where
    ST: Storage,
    TS: TimeSource,
{
    /// Without a `device_config` (on unofficial builds) no requests are made.
    pub fn new(
        storage: Rc<Mutex<ST>>,
        time_source: TS,
        device_config: Option<DeviceConfig>,
        in_system_image: bool,
        app_in_use: bool,
    ) -> Self {
        HostDelegate {
            scheduler: ExponentialBackoffScheduler::new(
                PREF_NAMESPACE,
                storage,
                time_source,
                POST_BASE_DELAY,
                POST_MAX_DELAY,
            ),
            device_config,
            in_system_image,
            app_in_use,
            next_wakeup: Rc::new(Cell::new(None)),
        }
    }

    /// A handle on the most recently scheduled wake-up.
    pub fn next_wakeup(&self) -> Rc<Cell<Option<SystemTime>>> {
        Rc::clone(&self.next_wakeup)
    }
}

impl<ST, TS> OmahaDelegate for HostDelegate<ST, TS>
where
    ST: Storage,
    TS: TimeSource,
{
    type Storage = ST;
    type TimeSource = TS;

    fn is_in_system_image(&self) -> bool {
        self.in_system_image
    }

    fn scheduler(&mut self) -> &mut ExponentialBackoffScheduler<ST, TS> {
        &mut self.scheduler
    }

    fn is_app_being_used(&self) -> bool {
        self.app_in_use
    }

    fn schedule_service(&mut self, now: SystemTime, next: SystemTime) {
        info!(
            "Scheduling next run at {} ({}s from now)",
            format_system_time(next),
            next.duration_since(now).map(|d| d.as_secs()).unwrap_or(0)
        );
        self.next_wakeup.set(Some(next));
    }

    fn create_request_generator(&self) -> Option<RequestGenerator> {
        self.device_config.clone().map(RequestGenerator::new)
    }

    fn on_handle_post_request_done(&mut self, result: PostResult, install_event_was_sent: bool) {
        match result {
            PostResult::Failed => warn!("POST failed, will retry"),
            _ => info!(?result, install_event_was_sent, "Handled pending request"),
        }
    }

    fn on_save_state_done(&mut self, next_request: SystemTime, next_post: SystemTime) {
        info!(
            "Saved state, next request at {}, next POST attempt at {}",
            format_system_time(next_request),
            format_system_time(next_post)
        );
    }
}
