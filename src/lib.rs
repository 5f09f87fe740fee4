//! Read-only byte stream over the primary data of one file inside a raw NTFS
//! volume, addressed by file reference or by path, without mounting it.

pub mod api;
pub mod cli;
pub mod context;
pub mod copy;
pub mod cursor;
pub mod disk;
pub mod error;
pub mod mft;
pub mod models;
pub mod path;
pub mod stream;
pub mod volume;

#[cfg(test)]
mod test_helpers;

pub use cli::Parameters;
pub use error::{Error, Result};
pub use stream::StreamHandle;
