//! On-disk NTFS structures: boot sector, file records, attributes, run lists,
//! directory index nodes and the `$UpCase` table.

pub mod attributes;
pub mod boot;
pub mod index;
pub mod parser;
pub mod record;
pub mod runs;
pub mod upcase;
pub mod utils;
