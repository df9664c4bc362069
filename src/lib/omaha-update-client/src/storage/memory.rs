// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use super::Storage;
use futures::future::BoxFuture;
use futures::prelude::*;
use std::collections::HashMap;
use std::convert::Infallible;

#[derive(Clone, Debug, PartialEq)]
enum Value {
    String(String),
    Int(i64),
    Bool(bool),
}

/// The MemStorage struct is an in-memory-only implementation of the Storage trait, to be used in
/// testing scenarios, and by hosts that do not need state to survive a restart.
#[derive(Debug, Default)]
pub struct MemStorage {
    data: HashMap<String, Value>,
    committed: bool,
}

impl MemStorage {
    pub fn new() -> Self {
        MemStorage::default()
    }

    /// Whether `commit()` has been called since the last write.
    pub fn committed(&self) -> bool {
        self.committed
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
        self.committed = false;
    }
}

impl Storage for MemStorage {
    type Error = Infallible;

    fn get_string<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        let value = match self.data.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        future::ready(value).boxed()
    }

    fn get_int<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<i64>> {
        let value = match self.data.get(key) {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        };
        future::ready(value).boxed()
    }

    fn get_bool<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<bool>> {
        let value = match self.data.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        };
        future::ready(value).boxed()
    }

    fn set_string<'a>(
        &'a mut self,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<(), Self::Error>> {
        self.set(key, Value::String(value.to_string()));
        future::ok(()).boxed()
    }

    fn set_int<'a>(&'a mut self, key: &'a str, value: i64) -> BoxFuture<'a, Result<(), Self::Error>> {
        self.set(key, Value::Int(value));
        future::ok(()).boxed()
    }

    fn set_bool<'a>(
        &'a mut self,
        key: &'a str,
        value: bool,
    ) -> BoxFuture<'a, Result<(), Self::Error>> {
        self.set(key, Value::Bool(value));
        future::ok(()).boxed()
    }

    fn remove<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<(), Self::Error>> {
        self.data.remove(key);
        self.committed = false;
        future::ok(()).boxed()
    }

    fn commit(&mut self) -> BoxFuture<'_, Result<(), Self::Error>> {
        self.committed = true;
        future::ok(()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_set_get() {
        block_on(async {
            let mut storage = MemStorage::new();
            storage.set_string("string", "value").await.unwrap();
            storage.set_int("int", -42).await.unwrap();
            storage.set_bool("bool", true).await.unwrap();

            assert_eq!(storage.get_string("string").await, Some("value".to_string()));
            assert_eq!(storage.get_int("int").await, Some(-42));
            assert_eq!(storage.get_bool("bool").await, Some(true));
            assert_eq!(storage.len(), 3);
        });
    }

    #[test]
    fn test_type_mismatch_reads_as_none() {
        block_on(async {
            let mut storage = MemStorage::new();
            storage.set_int("key", 1).await.unwrap();
            assert_eq!(storage.get_string("key").await, None);
            assert_eq!(storage.get_bool("key").await, None);
        });
    }

    #[test]
    fn test_remove_and_commit() {
        block_on(async {
            let mut storage = MemStorage::new();
            storage.set_string("key", "value").await.unwrap();
            assert!(!storage.committed());
            storage.commit().await.unwrap();
            assert!(storage.committed());

            storage.remove("key").await.unwrap();
            assert!(!storage.committed());
            assert_eq!(storage.get_string("key").await, None);
            assert!(storage.is_empty());
        });
    }
}
