// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::{anyhow, Context as _, Error};
use omaha_update_client::{
    common::Version,
    request_generator::{DeviceConfig, FormFactor},
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FormFactorConfig {
    Handset,
    Tablet,
}

impl Default for FormFactorConfig {
    fn default() -> Self {
        FormFactorConfig::Handset
    }
}

impl From<FormFactorConfig> for FormFactor {
    fn from(form_factor: FormFactorConfig) -> Self {
        match form_factor {
            FormFactorConfig::Handset => FormFactor::Handset,
            FormFactorConfig::Tablet => FormFactor::Tablet,
        }
    }
}

/// Identification of the device, reported in the `ap` attribute.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeviceInfo {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub sdk_level: u32,
}

/// The product configuration file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server_url: String,
    pub handset_app_id: String,
    pub tablet_app_id: String,

    /// The installed version, or a file to read it from.  `version` wins if both are given.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub version_file: Option<PathBuf>,

    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    #[serde(default)]
    pub form_factor: FormFactorConfig,
    #[serde(default)]
    pub device: DeviceInfo,

    #[serde(default)]
    pub in_system_image: bool,
    #[serde(default = "default_official_build")]
    pub official_build: bool,
    #[serde(default)]
    pub disabled: bool,
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_arch() -> String {
    std::env::consts::ARCH.to_string()
}

fn default_official_build() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(contents)?;
        if config.server_url.is_empty() {
            return Err(anyhow!("server_url must not be empty"));
        }
        Ok(config)
    }

    /// The installed version, which must be a four part version.
    pub fn version(&self) -> Result<String, Error> {
        let version = match (&self.version, &self.version_file) {
            (Some(version), _) => version.trim().to_string(),
            (None, Some(path)) => fs::read_to_string(path)
                .with_context(|| format!("Unable to read version file {}", path.display()))?
                .trim()
                .to_string(),
            (None, None) => return Err(anyhow!("Neither version nor version_file is configured")),
        };
        Version::parse_four_part(&version)
            .with_context(|| format!("Invalid version {:?}", version))?;
        Ok(version)
    }

    pub fn device_config(&self, version: String) -> DeviceConfig {
        DeviceConfig {
            server_url: self.server_url.clone(),
            handset_app_id: self.handset_app_id.clone(),
            tablet_app_id: self.tablet_app_id.clone(),
            version,
            brand: self.brand.clone(),
            client: self.client.clone(),
            channel: self.channel.clone(),
            language: self.language.clone(),
            os_version: self.os_version.clone(),
            arch: self.arch.clone(),
            form_factor: self.form_factor.into(),
            label: self.device.label.clone(),
            manufacturer: self.device.manufacturer.clone(),
            model: self.device.model.clone(),
            sdk_level: self.device.sdk_level,
        }
    }
}
