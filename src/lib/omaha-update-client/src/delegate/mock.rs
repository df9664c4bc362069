// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use super::{OmahaDelegate, PostResult};
use crate::{
    backoff::ExponentialBackoffScheduler,
    request_generator::{DeviceConfig, FormFactor, RequestGenerator},
    state_machine::{PREF_NAMESPACE, POST_BASE_DELAY, POST_MAX_DELAY},
    storage::MemStorage,
    time::MockTimeSource,
};
use futures::lock::Mutex;
use std::rc::Rc;
use std::time::SystemTime;

fn test_device_config() -> DeviceConfig {
    DeviceConfig {
        server_url: "https://omaha.test/service/update2".to_string(),
        handset_app_id: "{handset}".to_string(),
        tablet_app_id: "{tablet}".to_string(),
        version: "86.0.4240.99".to_string(),
        brand: "GGLS".to_string(),
        client: "android-google".to_string(),
        channel: "stable".to_string(),
        language: "en-US".to_string(),
        os_version: "11".to_string(),
        arch: "arm64".to_string(),
        form_factor: FormFactor::Handset,
        label: "Chrome".to_string(),
        manufacturer: "Google".to_string(),
        model: "Pixel".to_string(),
        sdk_level: 30,
    }
}

/// A mock OmahaDelegate with settable facts, deterministic UUIDs ("uuid-1", "uuid-2", ..., or
/// empty ones when `empty_uuids` is set), and a record of every hook call.
pub struct MockDelegate {
    pub scheduler: ExponentialBackoffScheduler<MemStorage, MockTimeSource>,
    pub in_system_image: bool,
    pub app_being_used: bool,
    pub device_config: Option<DeviceConfig>,
    pub uuid_count: u32,
    pub empty_uuids: bool,
    pub scheduled: Vec<(SystemTime, SystemTime)>,
    pub post_results: Vec<(PostResult, bool)>,
    pub registered: Vec<(SystemTime, SystemTime)>,
    pub saves: Vec<(SystemTime, SystemTime)>,
}

impl MockDelegate {
    pub fn new(storage: Rc<Mutex<MemStorage>>, time_source: MockTimeSource) -> Self {
        MockDelegate {
            scheduler: ExponentialBackoffScheduler::new(
                PREF_NAMESPACE,
                storage,
                time_source,
                POST_BASE_DELAY,
                POST_MAX_DELAY,
            ),
            in_system_image: false,
            app_being_used: true,
            device_config: Some(test_device_config()),
            uuid_count: 0,
            empty_uuids: false,
            scheduled: vec![],
            post_results: vec![],
            registered: vec![],
            saves: vec![],
        }
    }
}

impl OmahaDelegate for MockDelegate {
    type Storage = MemStorage;
    type TimeSource = MockTimeSource;

    fn is_in_system_image(&self) -> bool {
        self.in_system_image
    }

    fn scheduler(&mut self) -> &mut ExponentialBackoffScheduler<MemStorage, MockTimeSource> {
        &mut self.scheduler
    }

    fn generate_uuid(&mut self) -> String {
        if self.empty_uuids {
            return String::new();
        }
        self.uuid_count += 1;
        format!("uuid-{}", self.uuid_count)
    }

    fn is_app_being_used(&self) -> bool {
        self.app_being_used
    }

    fn schedule_service(&mut self, now: SystemTime, next: SystemTime) {
        self.scheduled.push((now, next));
    }

    fn create_request_generator(&self) -> Option<RequestGenerator> {
        self.device_config.clone().map(RequestGenerator::new)
    }

    fn on_handle_post_request_done(&mut self, result: PostResult, install_event_was_sent: bool) {
        self.post_results.push((result, install_event_was_sent));
    }

    fn on_register_new_request_done(&mut self, next_request: SystemTime, next_post: SystemTime) {
        self.registered.push((next_request, next_post));
    }

    fn on_save_state_done(&mut self, next_request: SystemTime, next_post: SystemTime) {
        self.saves.push((next_request, next_post));
    }
}
