// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use futures::future::BoxFuture;
use futures::prelude::*;
use hyper::{client::HttpConnector, Body, Client, Request, Response};
use hyper_rustls::HttpsConnector;
use omaha_update_client::http_request::{Error, HttpRequest, CONNECTION_TIMEOUT};
use std::time::Duration;

/// HttpRequest over a hyper client with rustls, using the system's root certificates.
///
/// Getting the response headers and reading the body are each bounded by `timeout`.
pub struct HyperHttpRequest {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    timeout: Duration,
}

impl HyperHttpRequest {
    pub fn new() -> Self {
        Self::with_timeout(CONNECTION_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder().build(HttpsConnector::with_native_roots());
        HyperHttpRequest { client, timeout }
    }
}

impl HttpRequest for HyperHttpRequest {
    fn request(&mut self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Vec<u8>>, Error>> {
        let client = self.client.clone();
        let timeout = self.timeout;
        async move {
            let response = tokio::time::timeout(timeout, client.request(req))
                .await
                .map_err(|_| Error::new_timeout())??;
            let (parts, body) = response.into_parts();
            let body = tokio::time::timeout(timeout, hyper::body::to_bytes(body))
                .await
                .map_err(|_| Error::new_timeout())??;
            Ok(Response::from_parts(parts, body.to_vec()))
        }
        .boxed()
    }
}
