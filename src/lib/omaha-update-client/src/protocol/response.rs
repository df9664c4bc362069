// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::{
    common::VersionConfig,
    error::{ParseError, RequestFailure},
    protocol::{PROTOCOL_V3, STATUS_OK, UPDATE_STATUS_NO_UPDATE},
};
use std::collections::HashMap;
use xml::reader::{EventReader, XmlEvent};

/// A parsed XML element: just enough of a tree to validate the response shape.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: HashMap<String, String>,
    children: Vec<Element>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }
}

fn parse_tree(xml: &str) -> Result<Element, RequestFailure> {
    let mut stack: Vec<Element> = vec![];
    let mut root = None;
    for event in EventReader::new(xml.as_bytes()) {
        match event.map_err(RequestFailure::MalformedXml)? {
            XmlEvent::StartElement { name, attributes, .. } => stack.push(Element {
                name: name.local_name,
                attributes: attributes
                    .into_iter()
                    .map(|attr| (attr.name.local_name, attr.value))
                    .collect(),
                children: vec![],
            }),
            XmlEvent::EndElement { .. } => {
                // The reader rejects unbalanced documents, so there is always an open element.
                if let Some(element) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
            }
            _ => {}
        }
    }
    // An empty document is reported by the reader as an error, so there is a root here.
    Ok(root.unwrap_or_default())
}

/// Parses and validates the server's reply to one request.
///
/// What the response must contain depends on what was sent: the install event only gets an
/// `<event>` acknowledgement, while a ping + update check must be answered with an
/// `<updatecheck>`.
#[derive(Clone, Debug)]
pub struct ResponseParser {
    app_id: String,
    expect_update_check: bool,
}

impl ResponseParser {
    pub fn new(app_id: impl Into<String>, expect_update_check: bool) -> Self {
        ResponseParser { app_id: app_id.into(), expect_update_check }
    }

    pub fn parse_response(&self, xml: &str) -> Result<VersionConfig, RequestFailure> {
        let root = parse_tree(xml)?;
        if root.name != "response" {
            return Err(ParseError::UnexpectedRoot(root.name).into());
        }
        if root.attr("protocol") != Some(PROTOCOL_V3) {
            return Err(ParseError::ProtocolVersion(root.attr("protocol").map(str::to_string)).into());
        }

        let server_date = match root.child("daystart").and_then(|daystart| daystart.attr("elapsed_days")) {
            Some(days) => Some(
                days.trim()
                    .parse::<i32>()
                    .map_err(|_| ParseError::InvalidDaystart(days.to_string()))?,
            ),
            None => None,
        };

        let app = self.find_app(&root)?;
        if let Some(status) = app.attr("status") {
            if status != STATUS_OK {
                return Err(ParseError::AppStatus(status.to_string()).into());
            }
        }
        for &element in &["event", "ping"] {
            for child in app.children(element) {
                if child.attr("status") != Some(STATUS_OK) {
                    return Err(ParseError::ElementStatus {
                        element,
                        status: child.attr("status").map(str::to_string),
                    }
                    .into());
                }
            }
        }

        let mut config = VersionConfig { server_date, ..VersionConfig::default() };
        let update_check = match app.child("updatecheck") {
            Some(update_check) => update_check,
            None if self.expect_update_check => return Err(ParseError::MissingUpdateCheck.into()),
            None => return Ok(config),
        };

        match update_check.attr("status") {
            Some(UPDATE_STATUS_NO_UPDATE) => {
                config.update_status = Some(UPDATE_STATUS_NO_UPDATE.to_string());
            }
            Some(STATUS_OK) => {
                config.download_url = update_check
                    .child("urls")
                    .and_then(|urls| urls.children("url").find_map(|url| url.attr("codebase")))
                    .ok_or(ParseError::MissingUrl)?
                    .to_string();
                config.latest_version = update_check
                    .child("manifest")
                    .and_then(|manifest| manifest.attr("version"))
                    .ok_or(ParseError::MissingManifest)?
                    .to_string();
                config.update_status = Some(STATUS_OK.to_string());
            }
            other => {
                return Err(ParseError::UpdateCheckStatus(other.map(str::to_string)).into());
            }
        }
        Ok(config)
    }

    fn find_app<'a>(&self, root: &'a Element) -> Result<&'a Element, ParseError> {
        let mut found = vec![];
        for app in root.children("app") {
            match app.attr("appid") {
                Some(id) if id.eq_ignore_ascii_case(&self.app_id) => return Ok(app),
                Some(id) => found.push(id.to_string()),
                None => {}
            }
        }
        if found.is_empty() {
            Err(ParseError::MissingApp)
        } else {
            Err(ParseError::AppIdMismatch { expected: self.app_id.clone(), found })
        }
    }
}
