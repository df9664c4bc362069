// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::{common::format_system_time, time::saturating_duration_since};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// How the application came to be installed on the device.  Reported to the server with every
/// request, and fixed once determined.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstallSource {
    /// Preloaded as part of the device's system image.
    SystemImage,
    /// Installed by the user.
    Organic,
}

impl InstallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallSource::SystemImage => "system_image",
            InstallSource::Organic => "organic",
        }
    }
}

impl Default for InstallSource {
    fn default() -> Self {
        InstallSource::Organic
    }
}

impl fmt::Display for InstallSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[error("unknown install source: {0:?}")]
pub struct UnknownInstallSource(String);

impl FromStr for InstallSource {
    type Err = UnknownInstallSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system_image" => Ok(InstallSource::SystemImage),
            "organic" => Ok(InstallSource::Organic),
            other => Err(UnknownInstallSource(other.to_string())),
        }
    }
}

/// One logical request to the server: either the install event or a ping + update check.
///
/// The request ID stays the same across every retry of the same logical request, which lets the
/// server drop duplicates.
#[derive(Clone, Eq, PartialEq)]
pub struct RequestData {
    creation_timestamp: SystemTime,
    send_install_event: bool,
    request_id: String,
    install_source: InstallSource,
}

impl RequestData {
    pub fn new(
        send_install_event: bool,
        creation_timestamp: SystemTime,
        request_id: impl Into<String>,
        install_source: InstallSource,
    ) -> Self {
        RequestData {
            creation_timestamp,
            send_install_event,
            request_id: request_id.into(),
            install_source,
        }
    }

    pub fn creation_timestamp(&self) -> SystemTime {
        self.creation_timestamp
    }

    pub fn is_send_install_event(&self) -> bool {
        self.send_install_event
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn install_source(&self) -> InstallSource {
        self.install_source
    }

    /// How long ago this request was created, zero if `now` is before its creation.
    pub fn age(&self, now: SystemTime) -> Duration {
        saturating_duration_since(now, self.creation_timestamp)
    }
}

impl fmt::Debug for RequestData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestData")
            .field("creation_timestamp", &format_system_time(self.creation_timestamp))
            .field("send_install_event", &self.send_install_event)
            .field("request_id", &self.request_id)
            .field("install_source", &self.install_source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_source_strings() {
        assert_eq!(InstallSource::SystemImage.as_str(), "system_image");
        assert_eq!(InstallSource::Organic.to_string(), "organic");
        assert_eq!("system_image".parse::<InstallSource>(), Ok(InstallSource::SystemImage));
        assert_eq!("organic".parse::<InstallSource>(), Ok(InstallSource::Organic));
        assert!("ondemand".parse::<InstallSource>().is_err());
    }

    #[test]
    fn test_request_age() {
        let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        let request = RequestData::new(false, created, "id", InstallSource::Organic);
        assert_eq!(request.age(created + Duration::from_secs(30)), Duration::from_secs(30));
        assert_eq!(request.age(created - Duration::from_secs(30)), Duration::ZERO);
    }
}
