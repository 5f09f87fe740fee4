// Directory index ($I30) node decoding: INDEX_ROOT values and INDX blocks.

use byteorder::{ByteOrder, LittleEndian};

use super::attributes::FileNameAttribute;
use super::parser::{apply_fixups, FixupResult};
use super::record::FileReference;
use crate::error::{Error, Result};

pub const INDEX_ENTRY_SUBNODE: u32 = 0x01;
pub const INDEX_ENTRY_END: u32 = 0x02;

const ENTRY_HEADER_LEN: usize = 16;
const INDX_NODE_OFFSET: usize = 0x18;
const ROOT_NODE_OFFSET: usize = 0x10;

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub file_reference: FileReference,
    pub flags: u32,
    /// `$FILE_NAME` key; absent on the terminating entry.
    pub file_name: Option<FileNameAttribute>,
    pub subnode_vcn: Option<u64>,
}

impl IndexEntry {
    pub fn is_end(&self) -> bool {
        self.flags & INDEX_ENTRY_END != 0
    }
}

/// Decoded `$INDEX_ROOT` value.
#[derive(Debug, Clone)]
pub struct IndexRoot {
    pub indexed_type: u32,
    pub collation_rule: u32,
    pub index_block_size: u32,
    pub clusters_per_index_block: u8,
    pub entries: Vec<IndexEntry>,
}

impl IndexRoot {
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < ROOT_NODE_OFFSET + 16 {
            return Err(Error::metadata("index root too small"));
        }
        Ok(Self {
            indexed_type: LittleEndian::read_u32(&value[0..4]),
            collation_rule: LittleEndian::read_u32(&value[4..8]),
            index_block_size: LittleEndian::read_u32(&value[8..12]),
            clusters_per_index_block: value[12],
            entries: parse_node(value, ROOT_NODE_OFFSET)?,
        })
    }
}

/// Applies fixups to an `INDX` block read from `$INDEX_ALLOCATION` and decodes
/// its entries.
pub fn parse_index_block(block: &mut [u8], expected_vcn: u64) -> Result<Vec<IndexEntry>> {
    if block.len() < INDX_NODE_OFFSET + 16 || &block[0..4] != b"INDX" {
        return Err(Error::metadata(format!("index block at VCN {} has no INDX signature", expected_vcn)));
    }
    let usa_offset = LittleEndian::read_u16(&block[4..6]);
    let usa_count = LittleEndian::read_u16(&block[6..8]);
    if apply_fixups(block, usa_offset, usa_count) != FixupResult::Ok {
        return Err(Error::metadata(format!("index block at VCN {}: fixup failure", expected_vcn)));
    }
    let vcn = LittleEndian::read_u64(&block[16..24]);
    if vcn != expected_vcn {
        return Err(Error::metadata(format!(
            "index block claims VCN {}, expected {}",
            vcn, expected_vcn
        )));
    }
    parse_node(block, INDX_NODE_OFFSET)
}

/// Index node header at `node_offset`; entry offsets are relative to it.
fn parse_node(data: &[u8], node_offset: usize) -> Result<Vec<IndexEntry>> {
    let header = data
        .get(node_offset..node_offset + 16)
        .ok_or_else(|| Error::metadata("index node header out of bounds"))?;
    let entries_offset = LittleEndian::read_u32(&header[0..4]) as usize;
    let index_length = LittleEndian::read_u32(&header[4..8]) as usize;

    let start = node_offset + entries_offset;
    let end = node_offset + index_length;
    if start > end || end > data.len() {
        return Err(Error::metadata("index entries out of bounds"));
    }
    parse_entries(&data[start..end])
}

fn parse_entries(data: &[u8]) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos + ENTRY_HEADER_LEN <= data.len() {
        let entry_len = LittleEndian::read_u16(&data[pos + 8..pos + 10]) as usize;
        let key_len = LittleEndian::read_u16(&data[pos + 10..pos + 12]) as usize;
        let flags = LittleEndian::read_u32(&data[pos + 12..pos + 16]);

        if entry_len < ENTRY_HEADER_LEN || pos + entry_len > data.len() {
            return Err(Error::metadata(format!("bad index entry length {}", entry_len)));
        }
        let entry = &data[pos..pos + entry_len];

        let subnode_vcn = if flags & INDEX_ENTRY_SUBNODE != 0 {
            if entry_len < ENTRY_HEADER_LEN + 8 {
                return Err(Error::metadata("index entry too short for its sub-node VCN"));
            }
            Some(LittleEndian::read_u64(&entry[entry_len - 8..]))
        } else {
            None
        };

        let is_end = flags & INDEX_ENTRY_END != 0;
        let file_name = if is_end || key_len == 0 {
            None
        } else {
            let key = entry
                .get(ENTRY_HEADER_LEN..ENTRY_HEADER_LEN + key_len)
                .ok_or_else(|| Error::metadata("index key out of bounds"))?;
            Some(FileNameAttribute::parse(key).ok_or_else(|| Error::metadata("unreadable index key"))?)
        };

        entries.push(IndexEntry {
            file_reference: FileReference::new(LittleEndian::read_u64(&entry[0..8])),
            flags,
            file_name,
            subnode_vcn,
        });
        if is_end {
            return Ok(entries);
        }
        pos += entry_len;
    }
    Err(Error::metadata("index node has no terminating entry"))
}
