//! File-backed implementation of the core `KvStore` contract.
//! One JSON document per key, replaced atomically on every write.

pub mod file_store;

pub use file_store::JsonFileStore;
