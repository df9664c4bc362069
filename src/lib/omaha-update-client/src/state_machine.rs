// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::{
    common::{format_system_time, Version, VersionConfig},
    delegate::{OmahaDelegate, PostResult},
    error::{ErrorKind, RequestFailure},
    http_request::HttpRequest,
    protocol::{
        request::{InstallSource, RequestData},
        response::ResponseParser,
        INVALID_SERVER_DATE,
    },
    request_generator::{install_age_days, RequestGenerator},
    storage::{namespaced, Storage},
    time::{from_millis, saturating_duration_since, to_millis},
};
use futures::lock::Mutex;
use hyper::{header::CONTENT_TYPE, Body, Request, StatusCode};
use log::{error, info, warn};
use std::convert::TryFrom;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

pub mod timer;

/// Namespace of every key the state machine persists.
pub const PREF_NAMESPACE: &str = "omaha";

/// Delay before retrying a failed POST, doubled with every consecutive failure.
pub const POST_BASE_DELAY: Duration = Duration::from_secs(60 * 60);
pub const POST_MAX_DELAY: Duration = Duration::from_secs(5 * 60 * 60);

/// How often a new ping is registered while the application is in use.
pub const BETWEEN_REQUESTS: Duration = Duration::from_secs(5 * 60 * 60);

const KEY_INSTALL_SOURCE: &str = "installSource";
const KEY_LATEST_VERSION: &str = "latestVersion";
const KEY_MARKET_URL: &str = "marketURL";
const KEY_SERVER_DATE: &str = "serverDate";
const KEY_PERSISTED_REQUEST_ID: &str = "persistedRequestID";
const KEY_SEND_INSTALL_EVENT: &str = "sendInstallEvent";
const KEY_TIMESTAMP_FOR_NEW_REQUEST: &str = "timestampForNewRequest";
const KEY_TIMESTAMP_FOR_NEXT_POST_ATTEMPT: &str = "timestampForNextPostAttempt";
const KEY_TIMESTAMP_OF_INSTALL: &str = "timestampOfInstall";
const KEY_TIMESTAMP_OF_REQUEST: &str = "timestampOfRequest";

const INVALID_TIMESTAMP: i64 = -1;
const INVALID_REQUEST_ID: &str = "invalid";

const REQUEST_AGE_HEADER: &str = "X-RequestAge";
const XML_CONTENT_TYPE: &str = "application/xml";

fn key(name: &str) -> String {
    namespaced(PREF_NAMESPACE, name)
}

/// Result of an on-demand update check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateStatus {
    /// The installed version is the latest one.
    Updated,
    /// A newer version is available.
    Outdated,
    /// The server couldn't be reached.
    Offline,
    /// Anything else went wrong.
    Failed,
}

pub struct StateMachineBuilder<D, H>
where
    D: OmahaDelegate,
{
    delegate: D,
    http: H,
    storage: Rc<Mutex<D::Storage>>,
    disabled: bool,
}

impl<D, H> StateMachineBuilder<D, H>
where
    D: OmahaDelegate,
    H: HttpRequest,
{
    /// `storage` must be the same store that the delegate's scheduler was created with.
    pub fn new(delegate: D, http: H, storage: Rc<Mutex<D::Storage>>) -> Self {
        StateMachineBuilder { delegate, http, storage, disabled: false }
    }

    /// A disabled state machine never makes requests from `run()`.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn build(self) -> StateMachine<D, H> {
        StateMachine {
            delegate: self.delegate,
            http: self.http,
            storage: self.storage,
            disabled: self.disabled,
            request_generator: None,
            state_restored: false,
            install_source: InstallSource::default(),
            timestamp_of_install: SystemTime::UNIX_EPOCH,
            timestamp_for_new_request: SystemTime::UNIX_EPOCH,
            timestamp_for_next_post_attempt: SystemTime::UNIX_EPOCH,
            send_install_event: true,
            current_request: None,
            version_config: VersionConfig::default(),
        }
    }
}

/// Keeps at most one request to the Omaha server pending, posts it when it's due, and persists
/// everything needed to carry on after a restart.
///
/// The first request after install reports the install event; once that is accepted, a ping with
/// an update check follows in the same session.  After that, a new ping is registered every
/// `BETWEEN_REQUESTS` while the application is in use.  Failed POSTs are retried with
/// exponential backoff using the same request ID, so the server can deduplicate them.
pub struct StateMachine<D, H>
where
    D: OmahaDelegate,
{
    delegate: D,
    http: H,
    storage: Rc<Mutex<D::Storage>>,
    disabled: bool,

    /// Created on first use, and only if the delegate can provide one.
    request_generator: Option<RequestGenerator>,

    state_restored: bool,
    install_source: InstallSource,
    timestamp_of_install: SystemTime,
    timestamp_for_new_request: SystemTime,
    timestamp_for_next_post_attempt: SystemTime,
    send_install_event: bool,
    current_request: Option<RequestData>,
    version_config: VersionConfig,
}

impl<D, H> StateMachine<D, H>
where
    D: OmahaDelegate,
    H: HttpRequest,
{
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut D {
        &mut self.delegate
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn http_mut(&mut self) -> &mut H {
        &mut self.http
    }

    pub fn storage(&self) -> &Rc<Mutex<D::Storage>> {
        &self.storage
    }

    pub fn now(&mut self) -> SystemTime {
        self.delegate.scheduler().get_current_time()
    }

    pub fn install_source(&self) -> InstallSource {
        self.install_source
    }

    pub fn timestamp_of_install(&self) -> SystemTime {
        self.timestamp_of_install
    }

    pub fn timestamp_for_new_request(&self) -> SystemTime {
        self.timestamp_for_new_request
    }

    pub fn timestamp_for_next_post_attempt(&self) -> SystemTime {
        self.timestamp_for_next_post_attempt
    }

    pub fn is_send_install_event(&self) -> bool {
        self.send_install_event
    }

    pub fn current_request(&self) -> Option<&RequestData> {
        self.current_request.as_ref()
    }

    pub fn version_config(&self) -> &VersionConfig {
        &self.version_config
    }

    fn has_request_generator(&mut self) -> bool {
        if self.request_generator.is_none() {
            self.request_generator = self.delegate.create_request_generator();
        }
        self.request_generator.is_some()
    }

    /// One pass of the state machine: register a new request if one is due, POST the pending
    /// request if its next attempt is due, schedule the next pass, and save state.
    pub async fn run(&mut self) {
        if self.disabled {
            info!("Omaha client is disabled, not running");
            return;
        }
        if !self.has_request_generator() {
            info!("No request generator available, not running");
            return;
        }

        self.restore_state().await;

        let now = self.now();
        let mut next: Option<SystemTime> = None;

        if self.delegate.is_app_being_used() {
            self.register_new_request_if_necessary(now).await;
            next = Some(self.timestamp_for_new_request);
        }

        if self.current_request.is_some() {
            match self.handle_post_request().await {
                PostResult::Failed | PostResult::Scheduled => {
                    let next_post = self.timestamp_for_next_post_attempt;
                    next = Some(next.map_or(next_post, |next| next.min(next_post)));
                }
                PostResult::Sent | PostResult::NoRequest => {}
            }
        }

        if let Some(next) = next {
            info!("Next run at {}", format_system_time(next));
            self.delegate.schedule_service(now, next);
        }

        self.save_state().await;
    }

    async fn register_new_request_if_necessary(&mut self, now: SystemTime) {
        let register = match &self.current_request {
            Some(request) => request.age(now) >= BETWEEN_REQUESTS,
            None => now >= self.timestamp_for_new_request,
        };
        if register {
            self.register_new_request(now).await;
        }
    }

    /// A new ID from the delegate, or a random one if the delegate came up empty.
    fn generate_id(&mut self) -> String {
        let id = self.delegate.generate_uuid();
        if id.is_empty() {
            warn!("Delegate generated an empty ID, using a random one");
            uuid::Uuid::new_v4().to_string()
        } else {
            id
        }
    }

    async fn register_new_request(&mut self, now: SystemTime) {
        let request_id = self.generate_id();
        let request =
            RequestData::new(self.send_install_event, now, request_id, self.install_source);
        info!("Registered new request {:?}", request);
        self.current_request = Some(request);

        self.delegate.scheduler().reset_failed_attempts().await;
        self.timestamp_for_next_post_attempt = now;
        self.timestamp_for_new_request = now + BETWEEN_REQUESTS;

        self.delegate.on_register_new_request_done(
            self.timestamp_for_new_request,
            self.timestamp_for_next_post_attempt,
        );
    }

    /// POST the pending request if its next attempt is due.
    ///
    /// After the install event is accepted, the install flag is cleared and a ping is registered
    /// and posted right away within the same session.  If that second POST fails, the ping stays
    /// pending and the install event is not sent again.
    pub async fn handle_post_request(&mut self) -> PostResult {
        if self.current_request.is_none() {
            self.delegate.on_handle_post_request_done(PostResult::NoRequest, false);
            return PostResult::NoRequest;
        }

        let now = self.now();
        if now < self.timestamp_for_next_post_attempt {
            self.delegate.on_handle_post_request_done(PostResult::Scheduled, false);
            return PostResult::Scheduled;
        }

        let session_id = self.generate_id();
        let mut install_event_was_sent = false;
        let mut succeeded = self.generate_and_post_request(now, &session_id).await;
        if succeeded && self.send_install_event {
            self.send_install_event = false;
            install_event_was_sent = true;
            self.register_new_request(now).await;
            succeeded = self.generate_and_post_request(now, &session_id).await;
        }

        let result = if succeeded { PostResult::Sent } else { PostResult::Failed };
        self.delegate.on_handle_post_request_done(result, install_event_was_sent);
        result
    }

    async fn generate_and_post_request(&mut self, now: SystemTime, session_id: &str) -> bool {
        let request = match self.current_request.clone() {
            Some(request) => request,
            None => return false,
        };
        match self.try_post_request(now, session_id, &request).await {
            Ok(version_config) => {
                info!("Request accepted, latest version: {:?}", version_config.latest_version);
                self.version_config = version_config;
                self.current_request = None;
                let scheduler = self.delegate.scheduler();
                scheduler.reset_failed_attempts().await;
                self.timestamp_for_new_request = scheduler.get_current_time() + BETWEEN_REQUESTS;
                self.timestamp_for_next_post_attempt = scheduler.calculate_next_timestamp().await;
                true
            }
            Err(e) => {
                warn!("Request failed: {:#}", anyhow::Error::new(e));
                let scheduler = self.delegate.scheduler();
                self.timestamp_for_next_post_attempt = scheduler.calculate_next_timestamp().await;
                scheduler.increase_failed_attempts().await;
                false
            }
        }
    }

    async fn try_post_request(
        &mut self,
        now: SystemTime,
        session_id: &str,
        request: &RequestData,
    ) -> Result<VersionConfig, RequestFailure> {
        let generator = match &self.request_generator {
            Some(generator) => generator,
            None => return Err(RequestFailure::NoRequestGenerator),
        };
        let install_age =
            install_age_days(now, self.timestamp_of_install, request.is_send_install_event());
        let last_check_date = self.version_config.server_date.unwrap_or(INVALID_SERVER_DATE);
        let xml = generator.generate_xml(
            session_id,
            generator.version_name(),
            install_age,
            last_check_date,
            request,
        )?;
        let server_url = generator.server_url().to_string();
        let parser = ResponseParser::new(generator.app_id(), !request.is_send_install_event());

        let failed_attempts = self.delegate.scheduler().num_failed_attempts().await;
        let request_age = if request.is_send_install_event() && failed_attempts > 0 {
            Some(request.age(now))
        } else {
            None
        };

        let response = post_request(&mut self.http, &server_url, xml, request_age).await?;
        parser.parse_response(&response)
    }

    /// Load the persisted state.  Only the first call on an instance does anything.
    pub async fn restore_state(&mut self) {
        if self.state_restored {
            return;
        }
        let now = self.now();

        let (
            install_source,
            timestamp_for_new_request,
            timestamp_for_next_post_attempt,
            timestamp_of_install,
            send_install_event,
            timestamp_of_request,
            persisted_request_id,
            version_config,
        ) = {
            let storage = self.storage.lock().await;
            (
                storage.get_string(&key(KEY_INSTALL_SOURCE)).await,
                storage.get_int(&key(KEY_TIMESTAMP_FOR_NEW_REQUEST)).await,
                storage.get_int(&key(KEY_TIMESTAMP_FOR_NEXT_POST_ATTEMPT)).await,
                storage.get_int(&key(KEY_TIMESTAMP_OF_INSTALL)).await,
                storage.get_bool(&key(KEY_SEND_INSTALL_EVENT)).await,
                storage.get_int(&key(KEY_TIMESTAMP_OF_REQUEST)).await,
                storage.get_string(&key(KEY_PERSISTED_REQUEST_ID)).await,
                read_version_config(&*storage).await,
            )
        };

        self.install_source = match install_source.map(|s| s.parse::<InstallSource>()) {
            Some(Ok(install_source)) => install_source,
            other => {
                if let Some(Err(e)) = other {
                    warn!("Ignoring persisted install source: {}", e);
                }
                if self.delegate.is_in_system_image() {
                    InstallSource::SystemImage
                } else {
                    InstallSource::Organic
                }
            }
        };
        self.timestamp_for_new_request = timestamp_for_new_request.map_or(now, from_millis);
        self.timestamp_for_next_post_attempt =
            timestamp_for_next_post_attempt.map_or(now, from_millis);
        self.timestamp_of_install = timestamp_of_install.map_or(now, from_millis);
        self.send_install_event = send_install_event.unwrap_or(true);

        self.current_request = match timestamp_of_request {
            Some(timestamp) if timestamp != INVALID_TIMESTAMP => {
                let request_id = match persisted_request_id {
                    Some(id) if !id.is_empty() && id != INVALID_REQUEST_ID => id,
                    _ => self.generate_id(),
                };
                Some(RequestData::new(
                    self.send_install_event,
                    from_millis(timestamp),
                    request_id,
                    self.install_source,
                ))
            }
            _ => None,
        };
        self.version_config = version_config;

        // Persisted timestamps are wall-clock values; never trust one further in the future than
        // the current schedule could have produced.
        if saturating_duration_since(self.timestamp_for_new_request, now) > BETWEEN_REQUESTS {
            warn!(
                "Next request at {} is too far ahead, resetting",
                format_system_time(self.timestamp_for_new_request)
            );
            self.timestamp_for_new_request = now;
        }
        let generated_delay = self.delegate.scheduler().generated_delay().await;
        if saturating_duration_since(self.timestamp_for_next_post_attempt, now) > generated_delay {
            warn!(
                "Next POST at {} is too far ahead, resetting",
                format_system_time(self.timestamp_for_next_post_attempt)
            );
            self.timestamp_for_next_post_attempt = now;
        }

        self.state_restored = true;
    }

    /// Persist the full state and commit it.  Write failures are logged, not returned.
    pub async fn save_state(&mut self) {
        {
            let mut storage = self.storage.lock().await;
            let (timestamp_of_request, request_id) = match &self.current_request {
                Some(request) => {
                    (to_millis(request.creation_timestamp()), request.request_id().to_string())
                }
                None => (INVALID_TIMESTAMP, INVALID_REQUEST_ID.to_string()),
            };

            log_write_error(
                KEY_SEND_INSTALL_EVENT,
                storage.set_bool(&key(KEY_SEND_INSTALL_EVENT), self.send_install_event).await,
            );
            log_write_error(
                KEY_TIMESTAMP_OF_INSTALL,
                storage
                    .set_int(&key(KEY_TIMESTAMP_OF_INSTALL), to_millis(self.timestamp_of_install))
                    .await,
            );
            log_write_error(
                KEY_TIMESTAMP_FOR_NEXT_POST_ATTEMPT,
                storage
                    .set_int(
                        &key(KEY_TIMESTAMP_FOR_NEXT_POST_ATTEMPT),
                        to_millis(self.timestamp_for_next_post_attempt),
                    )
                    .await,
            );
            log_write_error(
                KEY_TIMESTAMP_FOR_NEW_REQUEST,
                storage
                    .set_int(
                        &key(KEY_TIMESTAMP_FOR_NEW_REQUEST),
                        to_millis(self.timestamp_for_new_request),
                    )
                    .await,
            );
            log_write_error(
                KEY_TIMESTAMP_OF_REQUEST,
                storage.set_int(&key(KEY_TIMESTAMP_OF_REQUEST), timestamp_of_request).await,
            );
            log_write_error(
                KEY_PERSISTED_REQUEST_ID,
                storage.set_string(&key(KEY_PERSISTED_REQUEST_ID), &request_id).await,
            );
            log_write_error(
                KEY_INSTALL_SOURCE,
                storage.set_string(&key(KEY_INSTALL_SOURCE), self.install_source.as_str()).await,
            );
            write_version_config(&mut *storage, &self.version_config).await;

            if let Err(e) = storage.commit().await {
                error!("Unable to commit Omaha state: {}", e);
            }
        }

        self.delegate
            .on_save_state_done(self.timestamp_for_new_request, self.timestamp_for_next_post_attempt);
    }

    /// Ask the server right now whether a newer version is available, outside of the pending
    /// request cycle.  Nothing about the check is persisted.
    pub async fn check_for_updates(&mut self) -> UpdateStatus {
        if !self.has_request_generator() {
            warn!("No request generator available, can't check for updates");
            return UpdateStatus::Failed;
        }
        self.restore_state().await;

        match self.try_check_for_updates().await {
            Ok(status) => status,
            Err(e) => {
                let status = match e.kind() {
                    ErrorKind::Connectivity => UpdateStatus::Offline,
                    ErrorKind::Other => UpdateStatus::Failed,
                };
                warn!("Update check failed ({:?}): {:#}", status, anyhow::Error::new(e));
                status
            }
        }
    }

    async fn try_check_for_updates(&mut self) -> Result<UpdateStatus, RequestFailure> {
        let now = self.now();
        let session_id = self.generate_id();
        let request_id = self.generate_id();
        let request = RequestData::new(false, now, request_id, self.install_source);

        let generator = match &self.request_generator {
            Some(generator) => generator,
            None => return Err(RequestFailure::NoRequestGenerator),
        };
        let local_version = generator.version_name().to_string();
        let xml = generator.generate_xml(
            &session_id,
            &local_version,
            install_age_days(now, self.timestamp_of_install, false),
            self.version_config.server_date.unwrap_or(INVALID_SERVER_DATE),
            &request,
        )?;
        let server_url = generator.server_url().to_string();
        let parser = ResponseParser::new(generator.app_id(), true);

        let response = post_request(&mut self.http, &server_url, xml, None).await?;
        let version_config = parser.parse_response(&response)?;
        if version_config.is_no_update() {
            return Ok(UpdateStatus::Updated);
        }

        let versions = Version::parse_four_part(&local_version)
            .and_then(|local| Ok((local, Version::parse_four_part(&version_config.latest_version)?)));
        match versions {
            Ok((local, latest)) if local < latest => {
                info!("Version {} is available, running {}", latest, local);
                Ok(UpdateStatus::Outdated)
            }
            Ok(_) => Ok(UpdateStatus::Updated),
            Err(e) => {
                warn!(
                    "Unable to compare versions {:?} and {:?}: {}",
                    local_version, version_config.latest_version, e
                );
                Ok(UpdateStatus::Failed)
            }
        }
    }
}

async fn post_request<H: HttpRequest>(
    http: &mut H,
    server_url: &str,
    xml: String,
    request_age: Option<Duration>,
) -> Result<String, RequestFailure> {
    let mut builder = Request::post(server_url).header(CONTENT_TYPE, XML_CONTENT_TYPE);
    if let Some(age) = request_age {
        builder = builder.header(REQUEST_AGE_HEADER, age.as_secs().to_string());
    }
    let request = builder.body(Body::from(xml)).map_err(RequestFailure::BuildRequest)?;

    let response = http.request(request).await?;
    if response.status() != StatusCode::OK {
        return Err(RequestFailure::HttpStatus(response.status()));
    }
    Ok(String::from_utf8_lossy(response.body()).into_owned())
}

fn log_write_error<E: std::fmt::Display>(name: &str, result: Result<(), E>) {
    if let Err(e) = result {
        error!("Unable to persist {}: {}", name, e);
    }
}

async fn read_version_config<ST: Storage>(storage: &ST) -> VersionConfig {
    let server_date = match storage.get_int(&key(KEY_SERVER_DATE)).await {
        Some(date) if date != INVALID_SERVER_DATE as i64 => {
            i32::try_from(date).map_err(|_| warn!("Ignoring persisted server date {}", date)).ok()
        }
        _ => None,
    };
    VersionConfig {
        latest_version: storage.get_string(&key(KEY_LATEST_VERSION)).await.unwrap_or_default(),
        download_url: storage.get_string(&key(KEY_MARKET_URL)).await.unwrap_or_default(),
        server_date,
        update_status: None,
    }
}

async fn write_version_config<ST: Storage>(storage: &mut ST, config: &VersionConfig) {
    log_write_error(
        KEY_LATEST_VERSION,
        storage.set_string(&key(KEY_LATEST_VERSION), &config.latest_version).await,
    );
    log_write_error(
        KEY_MARKET_URL,
        storage.set_string(&key(KEY_MARKET_URL), &config.download_url).await,
    );
    log_write_error(
        KEY_SERVER_DATE,
        storage
            .set_int(&key(KEY_SERVER_DATE), config.server_date.unwrap_or(INVALID_SERVER_DATE).into())
            .await,
    );
}

/// Whether the install event has yet to be accepted by the server, judging by persisted state
/// alone.
pub async fn is_probably_fresh_install<ST: Storage>(storage: &ST) -> bool {
    storage.get_bool(&key(KEY_SEND_INSTALL_EVENT)).await.unwrap_or(true)
}
