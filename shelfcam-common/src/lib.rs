//! # shelfcam Common Library
//!
//! Shared code for the shelfcam robot image tools including:
//! - Error types
//! - Configuration loading and root folder resolution
//! - Store layout (named directories for one robot)
//! - Image and run archive filename encoding
//! - Content store abstraction (filesystem and in-memory)

pub mod config;
pub mod error;
pub mod layout;
pub mod naming;
pub mod store;

pub use error::{Error, Result};
pub use layout::StoreLayout;
pub use store::{ContentStore, Entry, EntryKind, FsStore, MemStore};
