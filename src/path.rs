use std::cmp::Ordering;
use std::io::{Read, Seek};

use log::{debug, trace};

use crate::cursor::AttributeCursor;
use crate::error::{Error, Result};
use crate::mft::attributes::{ATTR_INDEX_ALLOCATION, ATTR_INDEX_ROOT};
use crate::mft::index::{parse_index_block, IndexEntry, IndexRoot};
use crate::mft::parser::FIXUP_STRIDE;
use crate::mft::record::{FileRecord, FileReference};
use crate::mft::upcase::UpcaseTable;
use crate::volume::Volume;

const I30: &str = "$I30";
const MAX_INDEX_DEPTH: usize = 64;

/// One resolved path component: the directory searched and the index entry
/// that matched.
#[derive(Debug, Clone)]
pub struct PathStep {
    pub directory: FileReference,
    pub entry: IndexEntry,
}

impl PathStep {
    pub fn file_reference(&self) -> FileReference {
        self.entry.file_reference
    }
}

/// Splits a volume path on `\` and `/`, dropping a drive prefix, empty and `.`
/// components and folding `..`.
pub fn split_components(path: &str) -> Vec<&str> {
    let bytes = path.as_bytes();
    let path = if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        &path[2..]
    } else {
        path
    };

    let mut components: Vec<&str> = Vec::new();
    for part in path.split(['\\', '/']) {
        match part {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            name => components.push(name),
        }
    }
    components
}

/// Walks `path` from the root directory through each directory's `$I30` index.
/// Returns one step per component; an empty path yields no steps.
pub fn resolve<D: Read + Seek>(
    volume: &mut Volume<D>,
    upcase: &UpcaseTable,
    path: &str,
) -> Result<Vec<PathStep>> {
    let components = split_components(path);
    debug!("resolving '{}' ({} components)", path, components.len());

    let mut steps: Vec<PathStep> = Vec::with_capacity(components.len());
    let mut current = FileReference::ROOT;

    for component in components {
        let directory = volume.load_record(current)?;
        let name: Vec<u16> = component.encode_utf16().collect();
        let entry = lookup(volume, upcase, &directory, &name)?.ok_or_else(|| {
            Error::metadata(format!(
                "'{}' not found in directory record {}",
                component,
                directory.reference.record_number()
            ))
        })?;

        trace!("'{}' -> record {}", component, entry.file_reference);
        current = entry.file_reference;
        steps.push(PathStep {
            directory: directory.reference,
            entry,
        });
    }
    Ok(steps)
}

/// B-tree search of one directory index for `name` under NTFS collation.
fn lookup<D: Read + Seek>(
    volume: &mut Volume<D>,
    upcase: &UpcaseTable,
    directory: &FileRecord,
    name: &[u16],
) -> Result<Option<IndexEntry>> {
    let number = directory.reference.record_number();
    let root_value = directory
        .find_attribute(ATTR_INDEX_ROOT, I30)
        .and_then(|a| a.resident_value())
        .ok_or_else(|| Error::metadata(format!("record {} is not a directory", number)))?;
    let root = IndexRoot::parse(root_value)?;

    let block_size = root.index_block_size as usize;
    let cluster_size = volume.geometry().cluster_size;
    // Sub-node VCNs count clusters, or 512-byte units when blocks are smaller than a cluster.
    let vcn_unit = if block_size as u64 >= cluster_size {
        cluster_size
    } else {
        FIXUP_STRIDE as u64
    };

    let allocation: Option<AttributeCursor> = match directory.find_attribute(ATTR_INDEX_ALLOCATION, I30) {
        Some(attr) => Some(volume.open_cursor(attr)?),
        None => None,
    };
    let mut entries = root.entries;

    for _ in 0..MAX_INDEX_DEPTH {
        let mut next_vcn = None;
        for entry in entries {
            if entry.is_end() {
                next_vcn = entry.subnode_vcn;
                break;
            }
            let key = entry
                .file_name
                .as_ref()
                .ok_or_else(|| Error::metadata(format!("index of record {} has an entry without key", number)))?;
            match upcase.compare(name, &key.name_units) {
                Ordering::Equal => return Ok(Some(entry)),
                Ordering::Less => {
                    next_vcn = entry.subnode_vcn;
                    break;
                }
                Ordering::Greater => {}
            }
        }

        let Some(vcn) = next_vcn else {
            return Ok(None);
        };

        let cursor = allocation
            .as_ref()
            .ok_or_else(|| Error::metadata(format!("record {} has sub-nodes but no $INDEX_ALLOCATION", number)))?;

        let offset = vcn
            .checked_mul(vcn_unit)
            .ok_or_else(|| Error::metadata(format!("index VCN {} overflows", vcn)))?;
        trace!("record {}: index block VCN {} at {:#x}", number, vcn, offset);
        let mut block = cursor.read_at(volume.disk_mut(), offset, block_size).map_err(|e| {
            Error::metadata(format!("cannot read index block VCN {} of record {}: {}", vcn, number, e))
        })?;
        entries = parse_index_block(&mut block, vcn)?;
    }

    Err(Error::metadata(format!("index of record {} is deeper than {} levels", number, MAX_INDEX_DEPTH)))
}
