//! Parsing of vault notes: frontmatter metadata, outbound references and
//! content fingerprints, plus scanning of links in converted Org text.

mod consts;
pub mod error;
mod fingerprint;
pub mod frontmatter;
mod metadata;
mod note;
pub mod org;
mod references;

pub use crate::consts::NOTE_EXTENSIONS;
pub use crate::fingerprint::Fingerprint;
pub use crate::metadata::{Metadata, RESERVED_KEYS};
pub use crate::note::Note;
pub use crate::org::{OrgLink, rewrite_links, scan_links};
pub use crate::references::{Reference, asset_extension, is_external, scan_markdown, split_fragment};
