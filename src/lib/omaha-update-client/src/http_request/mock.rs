// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use super::{Error, HttpRequest};
use futures::future::BoxFuture;
use futures::prelude::*;
use hyper::{Body, HeaderMap, Method, Request, Response, Uri};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;

/// A request as seen by the mock, with the body already collected.
#[derive(Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct MockHttpRequest {
    // Every request made using this mock, oldest first.
    requests: Vec<RecordedRequest>,
    // The queue of fake responses for the upcoming requests.
    responses: VecDeque<Result<Response<Vec<u8>>, Error>>,
}

impl HttpRequest for MockHttpRequest {
    fn request(&mut self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Vec<u8>>, Error>> {
        async move {
            let (parts, body) = req.into_parts();
            let body = hyper::body::to_bytes(body).await.expect("collect request body");
            self.requests.push(RecordedRequest {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            });

            match self.responses.pop_front() {
                Some(response) => response,
                // No response to return, generate a 500 internal server error
                None => Ok(Response::builder().status(500).body(vec![]).unwrap()),
            }
        }
        .boxed()
    }
}

impl MockHttpRequest {
    pub fn new(res: Response<Vec<u8>>) -> Self {
        let mut mock = Self::empty();
        mock.add_response(res);
        mock
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add_response(&mut self, res: Response<Vec<u8>>) {
        self.responses.push_back(Ok(res));
    }

    /// Queue a 200 response with the given body.
    pub fn add_body(&mut self, body: impl Into<Vec<u8>>) {
        self.add_response(Response::new(body.into()));
    }

    pub fn add_error(&mut self, error: Error) {
        self.responses.push_back(Err(error));
    }

    pub fn requests(&self) -> &[RecordedRequest] {
        &self.requests
    }

    pub fn take_requests(&mut self) -> Vec<RecordedRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn last_request(&self) -> &RecordedRequest {
        self.requests.last().expect("no request was made")
    }

    pub fn assert_method(&self, method: &Method) {
        assert_eq!(method, &self.last_request().method);
    }

    pub fn assert_uri(&self, uri: &str) {
        assert_eq!(&uri.parse::<Uri>().unwrap(), &self.last_request().uri);
    }

    pub fn assert_header(&self, key: &str, value: &str) {
        let headers = &self.last_request().headers;
        assert!(headers.contains_key(key), "missing header {}", key);
        assert_eq!(headers[key], value);
    }

    pub fn assert_body_str(&self, body: &str) {
        assert_eq!(body, self.last_request().body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_request::mock_errors;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mock() {
        let res_body = vec![1, 2, 3];
        let mut mock = MockHttpRequest::new(Response::new(res_body.clone()));

        let uri = "https://mock.uri/";
        let req = Request::post(uri).header("X-Custom-Foo", "Bar").body(Body::from("body")).unwrap();
        block_on(async {
            let response = mock.request(req).await.unwrap();
            assert_eq!(res_body, *response.body());
        });
        mock.assert_method(&Method::POST);
        mock.assert_uri(uri);
        mock.assert_header("X-Custom-Foo", "Bar");
        mock.assert_body_str("body");
    }

    #[test]
    fn test_missing_response() {
        let mut mock = MockHttpRequest::new(Response::new(vec![1, 2, 3]));
        block_on(async {
            mock.request(Request::default()).await.unwrap();
            let response2 = mock.request(Request::default()).await.unwrap();
            assert_eq!(response2.status(), hyper::StatusCode::INTERNAL_SERVER_ERROR);
        });
        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn test_queued_error() {
        let mut mock = MockHttpRequest::empty();
        mock.add_error(mock_errors::make_connect_error());
        let result = block_on(mock.request(Request::default()));
        assert!(result.unwrap_err().is_connectivity());
    }
}
