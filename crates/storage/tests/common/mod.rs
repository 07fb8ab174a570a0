pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{TestStore, seeded_bytes, sha256_hash, split_file};
