// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use futures::future::BoxFuture;

mod memory;
pub use memory::MemStorage;

/// The Storage trait is used to access typed key=value storage, for persisting protocol state and
/// other data between runs of the client.
///
/// Each write is applied per key; nothing is guaranteed to be durable until `commit()` has
/// completed.  The store may be shared with the rest of the host application, so callers keep
/// their keys under a namespace (see [`namespaced`]).
pub trait Storage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Get a string from the backing store.  Returns None if there is no value for the given key,
    /// or if the value is not a string.
    fn get_string<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>>;

    /// Get an int from the backing store.  Returns None if there is no value for the given key,
    /// or if the value is not an int.
    fn get_int<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<i64>>;

    /// Get a boolean from the backing store.  Returns None if there is no value for the given
    /// key, or if the value is not a boolean.
    fn get_bool<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<bool>>;

    /// Set a value to be stored in the backing store.  The implementation should cache the value
    /// until the |commit()| fn is called, and then persist all cached values at that time.
    fn set_string<'a>(
        &'a mut self,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<(), Self::Error>>;

    /// Set a value to be stored in the backing store.  The implementation should cache the value
    /// until the |commit()| fn is called, and then persist all cached values at that time.
    fn set_int<'a>(&'a mut self, key: &'a str, value: i64) -> BoxFuture<'a, Result<(), Self::Error>>;

    /// Set a value to be stored in the backing store.  The implementation should cache the value
    /// until the |commit()| fn is called, and then persist all cached values at that time.
    fn set_bool<'a>(
        &'a mut self,
        key: &'a str,
        value: bool,
    ) -> BoxFuture<'a, Result<(), Self::Error>>;

    /// Remove the value for |key| from the backing store.
    fn remove<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<(), Self::Error>>;

    /// Persist all cached values to storage.
    fn commit(&mut self) -> BoxFuture<'_, Result<(), Self::Error>>;
}

/// Build the full key for `name` within `namespace`.
pub fn namespaced(namespace: &str, name: &str) -> String {
    format!("{}.{}", namespace, name)
}
