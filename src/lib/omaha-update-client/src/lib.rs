// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Client for the Omaha update server, as used by an installed application to report its
//! installation, ping the server periodically, and learn about newer versions.
//!
//! The [`state_machine::StateMachine`] is the core: it keeps one pending request at a time,
//! retries it with exponential backoff, and persists everything it needs to resume after a
//! restart.  Platform specifics are supplied through [`delegate::OmahaDelegate`].

pub mod backoff;
pub mod common;
pub mod delegate;
pub mod error;
pub mod http_request;
pub mod protocol;
pub mod request_generator;
pub mod service;
pub mod state_machine;
pub mod storage;
pub mod time;
