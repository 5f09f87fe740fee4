use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};

use super::record::FileReference;
use super::runs::{parse_data_runs, DataRun};
use super::utils::{filetime_to_datetime, utf16_units};
use crate::error::{Error, Result};

pub const ATTR_STANDARD_INFORMATION: u32 = 0x10;
pub const ATTR_ATTRIBUTE_LIST: u32 = 0x20;
pub const ATTR_FILE_NAME: u32 = 0x30;
pub const ATTR_DATA: u32 = 0x80;
pub const ATTR_INDEX_ROOT: u32 = 0x90;
pub const ATTR_INDEX_ALLOCATION: u32 = 0xA0;
pub const ATTR_END: u32 = 0xFFFF_FFFF;

pub const ATTR_FLAG_COMPRESSED: u16 = 0x0001;
pub const ATTR_FLAG_ENCRYPTED: u16 = 0x4000;

const RESIDENT_HEADER_LEN: usize = 24;
const NON_RESIDENT_HEADER_LEN: usize = 0x40;

#[derive(Debug, Clone)]
pub enum AttributeBody {
    Resident(Vec<u8>),
    NonResident {
        start_vcn: u64,
        last_vcn: u64,
        allocated_size: u64,
        data_size: u64,
        initialized_size: u64,
        runs: Vec<DataRun>,
    },
}

/// One typed, optionally named attribute of a file record.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub type_code: u32,
    pub name: String,
    pub name_length: u8,
    pub flags: u16,
    pub id: u16,
    pub body: AttributeBody,
}

impl Attribute {
    /// Decodes the attribute occupying `data` (exactly its declared length).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RESIDENT_HEADER_LEN {
            return Err(Error::metadata("attribute shorter than its header"));
        }
        let type_code = LittleEndian::read_u32(&data[0..4]);
        let non_resident = data[8] != 0;
        let name_length = data[9];
        let name_off = LittleEndian::read_u16(&data[10..12]) as usize;
        let flags = LittleEndian::read_u16(&data[12..14]);
        let id = LittleEndian::read_u16(&data[14..16]);

        let name = if name_length == 0 {
            String::new()
        } else {
            let name_end = name_off + name_length as usize * 2;
            let bytes = data
                .get(name_off..name_end)
                .ok_or_else(|| Error::metadata(format!("name of attribute {:#x} out of bounds", type_code)))?;
            String::from_utf16_lossy(&utf16_units(bytes))
        };

        let body = if non_resident {
            if data.len() < NON_RESIDENT_HEADER_LEN {
                return Err(Error::metadata(format!(
                    "non-resident attribute {:#x} shorter than its header",
                    type_code
                )));
            }
            let start_vcn = LittleEndian::read_u64(&data[0x10..0x18]);
            let dr_off = LittleEndian::read_u16(&data[0x20..0x22]) as usize;
            if dr_off < NON_RESIDENT_HEADER_LEN || dr_off >= data.len() {
                return Err(Error::metadata(format!(
                    "bad data run offset {:#x} in attribute {:#x}",
                    dr_off, type_code
                )));
            }
            AttributeBody::NonResident {
                start_vcn,
                last_vcn: LittleEndian::read_u64(&data[0x18..0x20]),
                allocated_size: LittleEndian::read_u64(&data[0x28..0x30]),
                data_size: LittleEndian::read_u64(&data[0x30..0x38]),
                initialized_size: LittleEndian::read_u64(&data[0x38..0x40]),
                runs: parse_data_runs(&data[dr_off..], start_vcn)?,
            }
        } else {
            let value_len = LittleEndian::read_u32(&data[16..20]) as usize;
            let value_off = LittleEndian::read_u16(&data[20..22]) as usize;
            let value = value_off
                .checked_add(value_len)
                .and_then(|end| data.get(value_off..end))
                .ok_or_else(|| Error::metadata(format!("value of attribute {:#x} out of bounds", type_code)))?;
            AttributeBody::Resident(value.to_vec())
        };

        Ok(Self {
            type_code,
            name,
            name_length,
            flags,
            id,
            body,
        })
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.body, AttributeBody::Resident(_))
    }

    /// Byte length of the attribute's content as declared by its header.
    pub fn declared_length(&self) -> u64 {
        match &self.body {
            AttributeBody::Resident(value) => value.len() as u64,
            AttributeBody::NonResident { data_size, .. } => *data_size,
        }
    }

    pub fn start_vcn(&self) -> u64 {
        match &self.body {
            AttributeBody::Resident(_) => 0,
            AttributeBody::NonResident { start_vcn, .. } => *start_vcn,
        }
    }

    pub fn resident_value(&self) -> Option<&[u8]> {
        match &self.body {
            AttributeBody::Resident(value) => Some(value),
            AttributeBody::NonResident { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct StandardInformation {
    pub creation_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    pub mft_modified_time: DateTime<Utc>,
    pub accessed_time: DateTime<Utc>,
    pub file_attributes: u32,
}

impl StandardInformation {
    pub fn parse(data: &[u8]) -> Option<Self> {
        // 48 bytes is the NT 4 layout; later versions only append fields
        if data.len() < 48 {
            return None;
        }
        Some(Self {
            creation_time: filetime_to_datetime(LittleEndian::read_u64(&data[0..8])),
            modified_time: filetime_to_datetime(LittleEndian::read_u64(&data[8..16])),
            mft_modified_time: filetime_to_datetime(LittleEndian::read_u64(&data[16..24])),
            accessed_time: filetime_to_datetime(LittleEndian::read_u64(&data[24..32])),
            file_attributes: LittleEndian::read_u32(&data[32..36]),
        })
    }
}

pub const NAMESPACE_WIN32: u8 = 1;
pub const NAMESPACE_DOS: u8 = 2;
pub const NAMESPACE_WIN32_AND_DOS: u8 = 3;

#[derive(Debug, Clone)]
pub struct FileNameAttribute {
    pub parent_directory_reference: FileReference,
    pub creation_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    pub mft_modified_time: DateTime<Utc>,
    pub accessed_time: DateTime<Utc>,
    pub logical_size: u64,
    pub file_flags: u32,
    pub name_type: u8,
    pub name_units: Vec<u16>,
    pub name: String,
}

impl FileNameAttribute {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 66 {
            return None;
        }

        let name_length = data[64] as usize;
        let name_type = data[65];
        let name_offset = 66;
        let name_bytes_len = name_length * 2;
        if data.len() < name_offset + name_bytes_len {
            return None;
        }

        let name_units = utf16_units(&data[name_offset..name_offset + name_bytes_len]);
        let name = String::from_utf16_lossy(&name_units);

        Some(Self {
            parent_directory_reference: FileReference::new(LittleEndian::read_u64(&data[0..8])),
            creation_time: filetime_to_datetime(LittleEndian::read_u64(&data[8..16])),
            modified_time: filetime_to_datetime(LittleEndian::read_u64(&data[16..24])),
            mft_modified_time: filetime_to_datetime(LittleEndian::read_u64(&data[24..32])),
            accessed_time: filetime_to_datetime(LittleEndian::read_u64(&data[32..40])),
            logical_size: LittleEndian::read_u64(&data[48..56]),
            file_flags: LittleEndian::read_u32(&data[56..60]),
            name_type,
            name_units,
            name,
        })
    }

    /// Win32 names beat DOS 8.3 and POSIX ones.
    pub fn is_preferred(&self) -> bool {
        self.name_type == NAMESPACE_WIN32 || self.name_type == NAMESPACE_WIN32_AND_DOS
    }
}

/// One entry of an `$ATTRIBUTE_LIST` value.
#[derive(Debug, Clone)]
pub struct AttributeListEntry {
    pub type_code: u32,
    pub name_length: u8,
    pub start_vcn: u64,
    pub reference: FileReference,
    pub attribute_id: u16,
}

impl AttributeListEntry {
    pub fn parse_list(data: &[u8]) -> Result<Vec<Self>> {
        let mut entries = Vec::new();
        let mut curr = 0usize;
        while curr + 26 <= data.len() {
            let type_code = LittleEndian::read_u32(&data[curr..curr + 4]);
            if type_code == 0 || type_code == ATTR_END {
                break;
            }
            let entry_len = LittleEndian::read_u16(&data[curr + 4..curr + 6]) as usize;
            if entry_len < 26 || curr + entry_len > data.len() {
                return Err(Error::metadata(format!("bad attribute list entry length {}", entry_len)));
            }
            let name_length = data[curr + 6];
            let name_off = data[curr + 7] as usize;
            if name_off + name_length as usize * 2 > entry_len {
                return Err(Error::metadata("attribute list name out of bounds"));
            }
            entries.push(Self {
                type_code,
                name_length,
                start_vcn: LittleEndian::read_u64(&data[curr + 8..curr + 16]),
                reference: FileReference::new(LittleEndian::read_u64(&data[curr + 16..curr + 24])),
                attribute_id: LittleEndian::read_u16(&data[curr + 24..curr + 26]),
            });
            curr += entry_len;
        }
        Ok(entries)
    }
}
