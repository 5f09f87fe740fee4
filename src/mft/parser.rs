use byteorder::{ByteOrder, LittleEndian};

use super::attributes::{Attribute, ATTR_END};
use crate::error::{Error, Result};

/// Update sequence stride; independent of the volume's sector size.
pub const FIXUP_STRIDE: usize = 512;

#[derive(Debug, PartialEq)]
pub enum FixupResult {
    Ok,
    TornWrite,
    Failed,
}

/// Restores the last two bytes of every 512-byte stride of a multi-sector
/// structure (FILE record, INDX block) from its update sequence array.
pub fn apply_fixups(data: &mut [u8], usa_offset: u16, usa_count: u16) -> FixupResult {
    if data.is_empty() || data.len() % FIXUP_STRIDE != 0 {
        return FixupResult::Failed;
    }
    let usa_offset = usa_offset as usize;
    let usa_count = usa_count as usize;
    let strides = data.len() / FIXUP_STRIDE;
    if usa_count < 2 || usa_count - 1 < strides || usa_offset + usa_count * 2 > data.len() {
        return FixupResult::Failed;
    }

    let usn_0 = data[usa_offset];
    let usn_1 = data[usa_offset + 1];
    let mut torn_write = false;

    for i in 1..=strides {
        let sector_tail = i * FIXUP_STRIDE - 2;
        if data[sector_tail] != usn_0 || data[sector_tail + 1] != usn_1 {
            torn_write = true;
        }
        let fixup_off = usa_offset + i * 2;
        data[sector_tail] = data[fixup_off];
        data[sector_tail + 1] = data[fixup_off + 1];
    }
    if torn_write {
        FixupResult::TornWrite
    } else {
        FixupResult::Ok
    }
}

/// Walks the attribute chain of a fixed-up record between `first_offset` and
/// `used_end`.
pub fn parse_attributes(record: &[u8], first_offset: usize, used_end: usize) -> Result<Vec<Attribute>> {
    let used_end = used_end.min(record.len());
    let mut attributes = Vec::new();
    let mut attr_offset = first_offset;

    while attr_offset + 8 <= used_end {
        let attr_type = LittleEndian::read_u32(&record[attr_offset..attr_offset + 4]);
        if attr_type == ATTR_END || attr_type == 0 {
            break;
        }

        let attr_len = LittleEndian::read_u32(&record[attr_offset + 4..attr_offset + 8]) as usize;
        if attr_len == 0 || attr_offset.checked_add(attr_len).map_or(true, |end| end > used_end) {
            return Err(Error::metadata(format!(
                "attribute {:#x} at offset {:#x} exceeds the used part of the record",
                attr_type, attr_offset
            )));
        }

        attributes.push(Attribute::parse(&record[attr_offset..attr_offset + attr_len])?);
        attr_offset += attr_len;
    }
    Ok(attributes)
}
