//! Core types for the Cairn script heap.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by the allocator, the C ABI and the test fixtures:
//! block layout constants, heap configuration, error types and the
//! statistics snapshot.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod layout;
pub mod stats;

pub use config::HeapConfig;
pub use error::{ConfigError, Corruption, HeapError, MisuseKind};
pub use stats::AllocStats;
