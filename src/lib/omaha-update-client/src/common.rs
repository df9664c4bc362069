// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The omaha_update_client::common module contains those types that are common to many parts of
//! the library.  Many of these don't belong to a specific sub-module.

use crate::time::to_millis;
use chrono::{TimeZone, Utc};
use itertools::Itertools;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Omaha only supports versions in the form of A.B.C.D, A.B.C, A.B or A.  This is a utility
/// wrapper around that form of version.
#[derive(Clone)]
pub struct Version(pub Vec<u32>);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().format("."))
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The Debug trait just forwards to the Display trait implementation for this type
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("Too many numbers in version, the maximum is 4.")]
    TooManyNumbers,
    #[error("Expected exactly 4 numbers in version, got {0}.")]
    NotFourNumbers(usize),
    #[error("Invalid version component: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nums = s.split('.').map(|s| s.parse::<u32>()).collect::<Result<Vec<u32>, _>>()?;
        if nums.len() > 4 {
            return Err(VersionParseError::TooManyNumbers);
        }
        Ok(Version(nums))
    }
}

impl From<Vec<u32>> for Version {
    fn from(v: Vec<u32>) -> Self {
        Version(v)
    }
}

macro_rules! impl_from {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Version {
                fn from(v: $t) -> Self {
                    Version(v.to_vec())
                }
            }
        )+
    }
}
impl_from!(&[u32], [u32; 1], [u32; 2], [u32; 3], [u32; 4]);

impl Version {
    /// Parse a full product version, which must have exactly four numeric components.  This is
    /// the form used when comparing the installed version against the latest one from the server.
    pub fn parse_four_part(s: &str) -> Result<Self, VersionParseError> {
        let version = s.trim().parse::<Version>()?;
        if version.0.len() != 4 {
            return Err(VersionParseError::NotFourNumbers(version.0.len()));
        }
        Ok(version)
    }

    /// Return a slice that trims any trailing 0 from the Vec for comparison.
    /// This is needed so that "1.0.0" is equal to "1.0".
    fn key(&self) -> &[u32] {
        let mut len = self.0.len();
        while len > 0 && self.0[len - 1] == 0 {
            len -= 1;
        }
        &self.0[..len]
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(other.key())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The server's answer to the last successful request.
///
/// Only `latest_version`, `download_url` and `server_date` are persisted; `update_status` is
/// only meaningful for the on-demand check that produced it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VersionConfig {
    /// Latest version the server knows about, empty if the response carried none.
    pub latest_version: String,

    /// Where the latest version can be downloaded from, empty if the response carried none.
    pub download_url: String,

    /// The server's day count (`<daystart elapsed_days>`), None if unknown.
    pub server_date: Option<i32>,

    /// The `status` of the `<updatecheck>` in the response, e.g. "noupdate".
    pub update_status: Option<String>,
}

impl VersionConfig {
    pub fn is_no_update(&self) -> bool {
        self.update_status.as_deref() == Some(crate::protocol::UPDATE_STATUS_NO_UPDATE)
    }
}

/// Format a SystemTime as an RFC 3339 string, for logs and Debug output.
///
/// Times that chrono can't represent (such as corrupted persisted timestamps) are formatted as
/// milliseconds since the unix epoch instead.
pub fn format_system_time(time: SystemTime) -> String {
    let millis = to_millis(time);
    match Utc.timestamp_millis_opt(millis).single() {
        Some(datetime) => datetime.to_rfc3339(),
        None => format!("{}ms since epoch", millis),
    }
}
