// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::{
    error::RequestFailure,
    protocol::{
        request::RequestData, DEDUP_CLIENT_REGULATED, EVENT_RESULT_SUCCESS,
        EVENT_TYPE_INSTALL_COMPLETE, INSTALL_AGE_IMMEDIATELY_AFTER_INSTALLING, OS_PLATFORM,
        PROTOCOL_V3, UPDATER,
    },
    time::saturating_duration_since,
};
use std::time::{Duration, SystemTime};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Which of the two published application IDs this device reports as.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormFactor {
    Handset,
    Tablet,
}

impl Default for FormFactor {
    fn default() -> Self {
        FormFactor::Handset
    }
}

/// Everything about the product and the device that goes into a request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceConfig {
    pub server_url: String,
    pub handset_app_id: String,
    pub tablet_app_id: String,
    /// The installed product version, e.g. "86.0.4240.99".
    pub version: String,
    pub brand: String,
    pub client: String,
    pub channel: String,
    pub language: String,
    pub os_version: String,
    pub arch: String,
    pub form_factor: FormFactor,
    /// The application label and device identification carried in the `ap` attribute.
    pub label: String,
    pub manufacturer: String,
    pub model: String,
    pub sdk_level: u32,
}

/// Serializes requests for one product on one device.
#[derive(Clone, Debug)]
pub struct RequestGenerator {
    config: DeviceConfig,
}

impl RequestGenerator {
    pub fn new(config: DeviceConfig) -> Self {
        RequestGenerator { config }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    pub fn version_name(&self) -> &str {
        &self.config.version
    }

    pub fn app_id(&self) -> &str {
        match self.config.form_factor {
            FormFactor::Handset => &self.config.handset_app_id,
            FormFactor::Tablet => &self.config.tablet_app_id,
        }
    }

    /// The `ap` attribute: "label;sdk;manufacturer;model".
    pub fn additional_parameters(&self) -> String {
        format!(
            "{};{};{};{}",
            sanitize(&self.config.label),
            self.config.sdk_level,
            sanitize(&self.config.manufacturer),
            sanitize(&self.config.model)
        )
    }

    /// Serialize one request.
    ///
    /// `install_age` is sent as is (see [`install_age_days`]), and `last_check_date` is the
    /// server's day count from the previous response, or `INVALID_SERVER_DATE`.
    pub fn generate_xml(
        &self,
        session_id: &str,
        version_name: &str,
        install_age: i64,
        last_check_date: i32,
        data: &RequestData,
    ) -> Result<String, RequestFailure> {
        let mut buffer = vec![];
        let mut writer = EmitterConfig::new().create_writer(&mut buffer);
        self.write_request(&mut writer, session_id, version_name, install_age, last_check_date, data)
            .map_err(RequestFailure::Serialization)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn write_request<W: std::io::Write>(
        &self,
        writer: &mut EventWriter<W>,
        session_id: &str,
        version_name: &str,
        install_age: i64,
        last_check_date: i32,
        data: &RequestData,
    ) -> Result<(), xml::writer::Error> {
        let request_id = braced(data.request_id());
        let session_id = braced(session_id);
        let channel = sanitize(&self.config.channel);
        writer.write(
            XmlEvent::start_element("request")
                .attr("protocol", PROTOCOL_V3)
                .attr("updater", UPDATER)
                .attr("updaterversion", version_name)
                .attr("updaterchannel", &channel)
                .attr("ismachine", "1")
                .attr("requestid", &request_id)
                .attr("sessionid", &session_id)
                .attr("installsource", data.install_source().as_str())
                .attr("dedup", DEDUP_CLIENT_REGULATED),
        )?;

        writer.write(
            XmlEvent::start_element("os")
                .attr("platform", OS_PLATFORM)
                .attr("version", &self.config.os_version)
                .attr("arch", &self.config.arch),
        )?;
        writer.write(XmlEvent::end_element())?;

        let brand = sanitize(&self.config.brand);
        let install_age = install_age.to_string();
        let additional_parameters = self.additional_parameters();
        writer.write(
            XmlEvent::start_element("app")
                .attr("brand", &brand)
                .attr("client", &self.config.client)
                .attr("appid", self.app_id())
                .attr("version", version_name)
                .attr("nextversion", "")
                .attr("lang", &self.config.language)
                .attr("installage", &install_age)
                .attr("ap", &additional_parameters),
        )?;

        if data.is_send_install_event() {
            writer.write(
                XmlEvent::start_element("event")
                    .attr("eventtype", EVENT_TYPE_INSTALL_COMPLETE)
                    .attr("eventresult", EVENT_RESULT_SUCCESS),
            )?;
            writer.write(XmlEvent::end_element())?;
        } else {
            writer.write(XmlEvent::start_element("updatecheck"))?;
            writer.write(XmlEvent::end_element())?;

            let date = last_check_date.to_string();
            writer.write(
                XmlEvent::start_element("ping")
                    .attr("active", "1")
                    .attr("ad", &date)
                    .attr("rd", &date),
            )?;
            writer.write(XmlEvent::end_element())?;
        }

        // </app>
        writer.write(XmlEvent::end_element())?;
        // </request>
        writer.write(XmlEvent::end_element())
    }
}

/// Days since install, or -1 when reporting the install itself.
pub fn install_age_days(now: SystemTime, install_time: SystemTime, send_install_event: bool) -> i64 {
    if send_install_event {
        INSTALL_AGE_IMMEDIATELY_AFTER_INSTALLING
    } else {
        (saturating_duration_since(now, install_time).as_secs() / DAY.as_secs()) as i64
    }
}

/// Drops every character that isn't an ASCII letter or digit, a space, or one of `.-_`.
pub fn sanitize(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_')).collect()
}

fn braced(id: &str) -> String {
    format!("{{{}}}", id)
}
