//! Benchmark utilities.

use kabinet_core::{document, Config, Document, TableDatabase};
use rand::Rng;
use tempfile::TempDir;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` zero-padded keys, so byte order matches numeric order.
pub fn generate_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| format!("key{i:08}").into_bytes()).collect()
}

/// A person document with a numeric age and a name drawn from a small set.
pub fn person(index: usize) -> Document {
    const NAMES: [&str; 5] = ["Dana", "James", "Jim", "Ann", "Leslie"];
    let age = (index * 7) % 80 + 18;
    document([
        ("first", NAMES[index % NAMES.len()].to_owned()),
        ("last", format!("Gray{}", index % 13)),
        ("age", age.to_string()),
    ])
}

/// A document store in a temporary directory, loaded with `count` people.
///
/// # Panics
///
/// Panics if the store cannot be created or written.
pub fn people_table(count: usize) -> (TempDir, TableDatabase) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut db = TableDatabase::open(dir.path().join("bench.tct"), Config::default())
        .expect("Failed to open document store");
    for index in 0..count {
        db.store(format!("person{index:08}"), person(index))
            .expect("Failed to store person");
    }
    (dir, db)
}
