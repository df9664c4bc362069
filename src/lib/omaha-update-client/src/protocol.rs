// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Constants and data types of the Omaha v3 XML protocol, as spoken by the Android updater.
//!
//! See https://github.com/google/omaha/blob/HEAD/doc/ServerProtocolV3.md

pub mod request;
pub mod response;

pub const PROTOCOL_V3: &str = "3.0";

/// Value of the `updater` attribute of every request.
pub const UPDATER: &str = "Android";

/// Value of the `platform` attribute of the `<os>` element.
pub const OS_PLATFORM: &str = "android";

/// Asks the server to deduplicate pings by client-regulated date.
pub const DEDUP_CLIENT_REGULATED: &str = "cr";

/// `ad`/`rd` value, and persisted value, for a server date that is not known.
pub const INVALID_SERVER_DATE: i32 = -2;

/// `installage` value sent along with the install event.
pub const INSTALL_AGE_IMMEDIATELY_AFTER_INSTALLING: i64 = -1;

/// Event type and result of the install event.
pub const EVENT_TYPE_INSTALL_COMPLETE: &str = "2";
pub const EVENT_RESULT_SUCCESS: &str = "1";

pub const STATUS_OK: &str = "ok";
pub const UPDATE_STATUS_NO_UPDATE: &str = "noupdate";
