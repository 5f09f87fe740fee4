use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use super::attributes::{
    Attribute, AttributeBody, FileNameAttribute, StandardInformation, ATTR_FILE_NAME,
    ATTR_STANDARD_INFORMATION,
};
use super::parser::{apply_fixups, parse_attributes, FixupResult};
use super::runs::check_contiguous;
use crate::error::{Error, Result};

/// 48-bit record number plus 16-bit sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileReference(u64);

impl FileReference {
    pub const MFT: FileReference = FileReference(0);
    pub const ROOT: FileReference = FileReference(5);
    pub const UPCASE: FileReference = FileReference(10);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn from_parts(record_number: u64, sequence: u16) -> Self {
        Self((record_number & 0xFFFF_FFFF_FFFF) | ((sequence as u64) << 48))
    }

    pub fn record_number(&self) -> u64 {
        self.0 & 0xFFFF_FFFF_FFFF
    }

    /// 0 means "any sequence".
    pub fn sequence(&self) -> u16 {
        (self.0 >> 48) as u16
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.record_number(), self.sequence())
    }
}

#[derive(Debug, Clone)]
pub struct MftRecordHeader {
    pub signature: [u8; 4],
    pub update_sequence_offset: u16,
    pub update_sequence_size: u16,
    pub logfile_sequence_number: u64,
    pub sequence_number: u16,
    pub hard_link_count: u16,
    pub first_attribute_offset: u16,
    pub flags: u16, // 0x01 = in use, 0x02 = directory
    pub real_size: u32,
    pub allocated_size: u32,
    pub base_record_reference: FileReference,
}

impl MftRecordHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 48 {
            return None;
        }

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&data[0..4]);
        if &signature != b"FILE" && &signature != b"BAAD" {
            return None;
        }

        Some(Self {
            signature,
            update_sequence_offset: LittleEndian::read_u16(&data[4..6]),
            update_sequence_size: LittleEndian::read_u16(&data[6..8]),
            logfile_sequence_number: LittleEndian::read_u64(&data[8..16]),
            sequence_number: LittleEndian::read_u16(&data[16..18]),
            hard_link_count: LittleEndian::read_u16(&data[18..20]),
            first_attribute_offset: LittleEndian::read_u16(&data[20..22]),
            flags: LittleEndian::read_u16(&data[22..24]),
            real_size: LittleEndian::read_u32(&data[24..28]),
            allocated_size: LittleEndian::read_u32(&data[28..32]),
            base_record_reference: FileReference::new(LittleEndian::read_u64(&data[32..40])),
        })
    }

    pub fn is_in_use(&self) -> bool {
        self.flags & 0x01 != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & 0x02 != 0
    }

    fn validate(&self, record_number: u64, record_size: usize) -> Result<()> {
        let fail = |msg: &str| Err(Error::metadata(format!("record {}: {}", record_number, msg)));
        if &self.signature != b"FILE" {
            return fail("signature is BAAD");
        }
        if self.real_size < 48 {
            return fail("used size smaller than the record header");
        }
        if self.real_size as usize > record_size {
            return fail("used size exceeds the record size");
        }
        if self.first_attribute_offset as usize + 8 > self.real_size as usize {
            return fail("first attribute lies outside the used part");
        }
        Ok(())
    }
}

/// One loaded catalog entry with its attributes in declaration order
/// (extension-record attributes appended after the base ones).
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub reference: FileReference,
    pub header: MftRecordHeader,
    pub attributes: Vec<Attribute>,
}

impl FileRecord {
    /// Decodes a raw record read from the catalog. Fixups are applied in place.
    /// A non-zero sequence in `reference` must match the record.
    pub fn parse(reference: FileReference, mut raw: Vec<u8>) -> Result<Self> {
        let number = reference.record_number();
        let header = MftRecordHeader::parse(&raw)
            .ok_or_else(|| Error::metadata(format!("record {}: no FILE signature", number)))?;
        header.validate(number, raw.len())?;

        match apply_fixups(&mut raw, header.update_sequence_offset, header.update_sequence_size) {
            FixupResult::Ok => {}
            FixupResult::TornWrite => {
                return Err(Error::metadata(format!("record {}: torn write (fixup mismatch)", number)))
            }
            FixupResult::Failed => {
                return Err(Error::metadata(format!("record {}: malformed update sequence array", number)))
            }
        }

        if !header.is_in_use() {
            return Err(Error::metadata(format!("record {} is not in use", number)));
        }
        if reference.sequence() != 0 && reference.sequence() != header.sequence_number {
            return Err(Error::metadata(format!(
                "record {}: sequence mismatch (expected {}, found {})",
                number,
                reference.sequence(),
                header.sequence_number
            )));
        }

        let attributes = parse_attributes(
            &raw,
            header.first_attribute_offset as usize,
            header.real_size as usize,
        )?;
        Ok(Self {
            reference: FileReference::from_parts(number, header.sequence_number),
            header,
            attributes,
        })
    }

    /// First attribute of `type_code` called `name` (empty for the unnamed one),
    /// in declaration order.
    pub fn find_attribute(&self, type_code: u32, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.type_code == type_code && a.name == name)
    }

    pub fn first_attribute(&self, type_code: u32) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.type_code == type_code)
    }

    pub fn is_directory(&self) -> bool {
        self.header.is_directory()
    }

    pub fn standard_information(&self) -> Option<StandardInformation> {
        self.first_attribute(ATTR_STANDARD_INFORMATION)
            .and_then(Attribute::resident_value)
            .and_then(StandardInformation::parse)
    }

    /// Best `$FILE_NAME`: the first Win32 one, otherwise the first of any namespace.
    pub fn file_name(&self) -> Option<FileNameAttribute> {
        let mut best: Option<FileNameAttribute> = None;
        for attr in self.attributes.iter().filter(|a| a.type_code == ATTR_FILE_NAME) {
            let Some(fname) = attr.resident_value().and_then(FileNameAttribute::parse) else {
                continue;
            };
            if fname.is_preferred() {
                return Some(fname);
            }
            if best.is_none() {
                best = Some(fname);
            }
        }
        best
    }

    /// Appends the attributes found in an extension record.
    pub fn absorb_extension(&mut self, extension: FileRecord) -> Result<()> {
        let base = extension.header.base_record_reference;
        if base.record_number() != self.reference.record_number() {
            return Err(Error::metadata(format!(
                "record {} is not an extension of record {}",
                extension.reference.record_number(),
                self.reference.record_number()
            )));
        }
        self.attributes.extend(extension.attributes);
        Ok(())
    }

    /// Joins non-resident pieces of the same (type, name) split over several
    /// records into the piece starting at VCN 0.
    pub fn stitch_fragments(&mut self) -> Result<()> {
        let mut merged: Vec<Attribute> = Vec::with_capacity(self.attributes.len());
        let mut pieces: Vec<Attribute> = Vec::new();

        for attr in self.attributes.drain(..) {
            if attr.is_resident() || attr.start_vcn() == 0 {
                merged.push(attr);
            } else {
                pieces.push(attr);
            }
        }
        if pieces.is_empty() {
            self.attributes = merged;
            return Ok(());
        }

        pieces.sort_by_key(|p| p.start_vcn());
        for piece in pieces {
            let owner = merged
                .iter_mut()
                .find(|a| !a.is_resident() && a.type_code == piece.type_code && a.name == piece.name)
                .ok_or_else(|| {
                    Error::metadata(format!(
                        "record {}: fragment of attribute {:#x} at VCN {} has no head",
                        self.reference.record_number(),
                        piece.type_code,
                        piece.start_vcn()
                    ))
                })?;
            if let (
                AttributeBody::NonResident { runs, last_vcn, .. },
                AttributeBody::NonResident { runs: more, last_vcn: piece_last, .. },
            ) = (&mut owner.body, piece.body)
            {
                runs.extend(more);
                *last_vcn = (*last_vcn).max(piece_last);
            }
        }

        for attr in &merged {
            if let AttributeBody::NonResident { runs, .. } = &attr.body {
                check_contiguous(runs).map_err(|e| {
                    Error::metadata(format!(
                        "record {}: attribute {:#x}: {}",
                        self.reference.record_number(),
                        attr.type_code,
                        e
                    ))
                })?;
            }
        }
        self.attributes = merged;
        Ok(())
    }
}
