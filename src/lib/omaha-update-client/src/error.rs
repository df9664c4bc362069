// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::http_request;
use hyper::StatusCode;
use thiserror::Error;

/// The only distinction callers act on: could the server be reached at all.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Network unreachable, connection refused, or timed out.
    Connectivity,
    /// Everything else: serialization, bad HTTP status, unparseable response.
    Other,
}

/// Why generating, sending, or parsing one request failed.
#[derive(Debug, Error)]
pub enum RequestFailure {
    #[error("No request generator available")]
    NoRequestGenerator,

    #[error("Unable to serialize request")]
    Serialization(#[source] xml::writer::Error),

    #[error("Unable to build HTTP request")]
    BuildRequest(#[source] http::Error),

    #[error("HTTP request failed")]
    Http(#[from] http_request::Error),

    #[error("Received {0} instead of 200 (OK) from the server")]
    HttpStatus(StatusCode),

    #[error("Response is not well-formed XML")]
    MalformedXml(#[source] xml::reader::Error),

    #[error("Unexpected response: {0}")]
    Parse(#[from] ParseError),
}

impl RequestFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestFailure::Http(e) if e.is_connectivity() => ErrorKind::Connectivity,
            _ => ErrorKind::Other,
        }
    }
}

/// The response was well-formed XML, but not the response we asked for.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ParseError {
    #[error("root element is <{0}>, expected <response>")]
    UnexpectedRoot(String),

    #[error("unsupported protocol version {0:?}")]
    ProtocolVersion(Option<String>),

    #[error("invalid <daystart> elapsed_days {0:?}")]
    InvalidDaystart(String),

    #[error("no <app> element in response")]
    MissingApp,

    #[error("no <app> with appid {expected:?}, found {found:?}")]
    AppIdMismatch { expected: String, found: Vec<String> },

    #[error("<app> status {0:?}")]
    AppStatus(String),

    #[error("<{element}> status {status:?}")]
    ElementStatus { element: &'static str, status: Option<String> },

    #[error("no <updatecheck> element in response")]
    MissingUpdateCheck,

    #[error("<updatecheck> status {0:?}")]
    UpdateCheckStatus(Option<String>),

    #[error("no <url codebase> in <updatecheck>")]
    MissingUrl,

    #[error("no <manifest version> in <updatecheck>")]
    MissingManifest,
}
