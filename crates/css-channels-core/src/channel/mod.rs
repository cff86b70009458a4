//! Release channels
//!
//! # Concepts
//!
//! - **Channel**: a named build of the distribution (stable, latest, preview, ...)
//! - **Variant**: the compiler flavour a channel is built with (default, p, v, c)
//! - **Preview**: a timestamped, never protected channel instance
//!
//! # Layout
//!
//! ```text
//! dist/                       <remote root>/
//! ├── stable/                 ├── index.html
//! ├── latest/                 ├── stable/
//! ├── preview-2024-01-01-…/   ├── latest/
//! ├── p/                      ├── preview-2024-01-01-…/
//! ├── v/                      ├── p/
//! └── c/                      └── v/
//! ```

mod channel_registry;
mod types;

pub use channel_registry::{ChannelRegistry, DEFAULT_DEPLOY_CHANNEL};
pub use types::{
    is_preview_folder, Channel, Variant, INDEX_DOCUMENT, PREVIEW_PREFIX, STAMP_FORMAT,
    STAMP_PLACEHOLDER,
};
