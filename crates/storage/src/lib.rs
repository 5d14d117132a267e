//! Storage backends for both ends of a conversion: the read-only vault that
//! notes and assets are discovered in, and the output tree that Org files and
//! copied assets are written to.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::{relative_between, validate as validate_path};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
