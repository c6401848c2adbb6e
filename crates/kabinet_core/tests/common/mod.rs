//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use kabinet_core::{document, BTreeDatabase, Config, FixedDatabase, HashDatabase, TableDatabase};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use tempfile::TempDir;

/// A store inside a temporary directory that lives as long as it does.
pub struct TestStore<S> {
    /// The store under test.
    pub db: S,
    dir: TempDir,
    file: String,
}

impl<S> TestStore<S> {
    fn create(file: &str, open: impl FnOnce(PathBuf) -> S) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let db = open(dir.path().join(file));
        Self {
            db,
            dir,
            file: file.to_owned(),
        }
    }

    /// Path of the store's file.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join(&self.file)
    }

    /// Path of another file in the same directory.
    pub fn sibling(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }
}

impl<S> Deref for TestStore<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.db
    }
}

impl<S> DerefMut for TestStore<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.db
    }
}

pub fn hash_store(config: Config) -> TestStore<HashDatabase> {
    TestStore::create("test.tch", |path| {
        HashDatabase::open(path, config).expect("Failed to open hash store")
    })
}

pub fn btree_store(config: Config) -> TestStore<BTreeDatabase> {
    TestStore::create("test.tcb", |path| {
        BTreeDatabase::open(path, config).expect("Failed to open ordered store")
    })
}

pub fn fixed_store(config: Config) -> TestStore<FixedDatabase> {
    TestStore::create("test.tcf", |path| {
        FixedDatabase::open(path, config).expect("Failed to open fixed-width store")
    })
}

pub fn table_store(config: Config) -> TestStore<TableDatabase> {
    TestStore::create("test.tct", |path| {
        TableDatabase::open(path, config).expect("Failed to open document store")
    })
}

/// Three people sharing a last name.
pub fn load_people(db: &mut TableDatabase) {
    db.store(
        "dana",
        document([("first", "Dana"), ("middle", "Ann Leslie"), ("last", "Gray"), ("age", "34")]),
    )
    .expect("store dana");
    db.store("james", document([("first", "James"), ("last", "Gray"), ("age", "33")]))
        .expect("store james");
    db.store("jim", document([("first", "Jim"), ("last", "Gray"), ("age", "53")]))
        .expect("store jim");
}

pub fn keys(list: &[&str]) -> Vec<Vec<u8>> {
    list.iter().map(|key| key.as_bytes().to_vec()).collect()
}
