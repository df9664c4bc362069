// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::Context as _;
use futures::future::BoxFuture;
use futures::prelude::*;
use omaha_update_client::storage::Storage;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unable to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to serialize storage")]
    Serialize(#[from] serde_json::Error),
}

/// Key-value storage kept in a single JSON file.
///
/// Writes only touch the in-memory copy.  `commit()` writes the whole map to a temporary file
/// next to the real one, syncs it and renames it into place, so the file is always either the
/// previous or the new version.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    data: BTreeMap<String, Value>,
}

impl FileStorage {
    /// Open the storage at `path`, starting out empty if the file doesn't exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, anyhow::Error> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Corrupt storage file {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Unable to read {}", path.display()));
            }
        };
        Ok(FileStorage { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored key and value, in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(key, value)| (key.as_str(), value))
    }

    fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    fn write(&self) -> Result<(), StorageError> {
        let contents = serde_json::to_string_pretty(&self.data)?;
        let temp_path = self.path.with_extension("tmp");
        let write_error = |source| StorageError::Write { path: self.path.clone(), source };
        let mut file = fs::File::create(&temp_path).map_err(write_error)?;
        file.write_all(contents.as_bytes()).map_err(write_error)?;
        file.sync_all().map_err(write_error)?;
        drop(file);
        fs::rename(&temp_path, &self.path).map_err(write_error)
    }
}

impl Storage for FileStorage {
    type Error = StorageError;

    fn get_string<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        future::ready(self.data.get(key).and_then(Value::as_str).map(str::to_string)).boxed()
    }

    fn get_int<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<i64>> {
        future::ready(self.data.get(key).and_then(Value::as_i64)).boxed()
    }

    fn get_bool<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<bool>> {
        future::ready(self.data.get(key).and_then(Value::as_bool)).boxed()
    }

    fn set_string<'a>(
        &'a mut self,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<(), Self::Error>> {
        self.set(key, Value::from(value));
        future::ok(()).boxed()
    }

    fn set_int<'a>(&'a mut self, key: &'a str, value: i64) -> BoxFuture<'a, Result<(), Self::Error>> {
        self.set(key, Value::from(value));
        future::ok(()).boxed()
    }

    fn set_bool<'a>(
        &'a mut self,
        key: &'a str,
        value: bool,
    ) -> BoxFuture<'a, Result<(), Self::Error>> {
        self.set(key, Value::from(value));
        future::ok(()).boxed()
    }

    fn remove<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<(), Self::Error>> {
        self.data.remove(key);
        future::ok(()).boxed()
    }

    fn commit(&mut self) -> BoxFuture<'_, Result<(), Self::Error>> {
        future::ready(self.write()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("state.json")).unwrap();
        assert_eq!(storage.entries().count(), 0);
    }

    #[test]
    fn test_commit_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        block_on(async {
            let mut storage = FileStorage::open(&path).unwrap();
            storage.set_string("omaha.persistedRequestID", "id").await.unwrap();
            storage.set_int("omaha.timestampOfInstall", 1_600_000_000_000).await.unwrap();
            storage.set_bool("omaha.sendInstallEvent", false).await.unwrap();
            storage.set_int("omaha.serverDate", -2).await.unwrap();
            storage.commit().await.unwrap();
        });
        assert!(!dir.path().join("state.tmp").exists());

        block_on(async {
            let storage = FileStorage::open(&path).unwrap();
            assert_eq!(
                storage.get_string("omaha.persistedRequestID").await,
                Some("id".to_string())
            );
            assert_eq!(storage.get_int("omaha.timestampOfInstall").await, Some(1_600_000_000_000));
            assert_eq!(storage.get_bool("omaha.sendInstallEvent").await, Some(false));
            assert_eq!(storage.get_int("omaha.serverDate").await, Some(-2));
            // Type mismatches read as missing.
            assert_eq!(storage.get_int("omaha.persistedRequestID").await, None);
        });
    }

    #[test]
    fn test_uncommitted_writes_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        block_on(async {
            let mut storage = FileStorage::open(&path).unwrap();
            storage.set_bool("key", true).await.unwrap();
            storage.commit().await.unwrap();
            storage.remove("key").await.unwrap();
            storage.set_bool("other", true).await.unwrap();
        });

        let storage = FileStorage::open(&path).unwrap();
        let keys: Vec<&str> = storage.entries().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["key"]);
    }

    #[test]
    fn test_commit_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        block_on(async {
            let mut storage = FileStorage::open(&path).unwrap();
            storage.set_string("omaha.latestVersion", "86.0.4240.99").await.unwrap();
            storage.set_string("omaha.marketURL", "https://market.test/chrome").await.unwrap();
            storage.commit().await.unwrap();
            storage.remove("omaha.marketURL").await.unwrap();
            storage.commit().await.unwrap();
        });
        assert!(!dir.path().join("state.tmp").exists());

        let on_disk: BTreeMap<String, Value> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk["omaha.latestVersion"], Value::from("86.0.4240.99"));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        assert!(FileStorage::open(&path).is_err());
    }

    #[test]
    fn test_commit_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path().join("missing/state.json")).unwrap();
        block_on(storage.set_int("key", 1)).unwrap();
        assert_matches!(block_on(storage.commit()), Err(StorageError::Write { .. }));
    }
}
