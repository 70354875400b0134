// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::FileStore;
use crate::storage::{Storage, StorageError};

#[test]
fn set_get_remove_roundtrip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = FileStore::open(dir.path().join("kv.json"), None)?;

    assert_eq!(store.get("token"), None);
    store.set("token", "abc")?;
    assert_eq!(store.get("token"), Some("abc".to_owned()));
    store.remove("token");
    assert_eq!(store.get("token"), None);
    Ok(())
}

#[test]
fn values_survive_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("kv.json");

    {
        let store = FileStore::open(&path, None)?;
        store.set("username", "ada")?;
        store.set("role", "admin")?;
    }

    let reopened = FileStore::open(&path, None)?;
    assert_eq!(reopened.get("username"), Some("ada".to_owned()));
    assert_eq!(reopened.get("role"), Some("admin".to_owned()));
    Ok(())
}

#[test]
fn quota_exceeded_rolls_back() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = FileStore::open(dir.path().join("kv.json"), Some(64))?;

    store.set("small", "x")?;
    let big = "y".repeat(200);
    match store.set("big", &big) {
        Err(StorageError::QuotaExceeded { .. }) => {}
        other => anyhow::bail!("expected quota failure, got {other:?}"),
    }
    // The failed write left both memory and disk untouched.
    assert_eq!(store.get("big"), None);
    assert_eq!(store.get("small"), Some("x".to_owned()));
    Ok(())
}

#[test]
fn overwrite_rolls_back_to_previous_value_on_quota() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = FileStore::open(dir.path().join("kv.json"), Some(64))?;

    store.set("key", "short")?;
    let big = "z".repeat(200);
    assert!(store.set("key", &big).is_err());
    assert_eq!(store.get("key"), Some("short".to_owned()));
    Ok(())
}

#[test]
fn missing_parent_directory_is_created() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested/state/kv.json");
    let store = FileStore::open(&path, None)?;
    store.set("k", "v")?;
    assert!(path.exists());
    Ok(())
}
