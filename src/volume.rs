use std::io::{Read, Seek};

use log::{debug, trace};

use crate::cursor::AttributeCursor;
use crate::disk::DiskReader;
use crate::error::{Error, Result};
use crate::mft::attributes::{
    Attribute, AttributeBody, AttributeListEntry, ATTR_ATTRIBUTE_LIST, ATTR_DATA,
};
use crate::mft::boot::BootGeometry;
use crate::mft::record::{FileRecord, FileReference};
use crate::mft::runs::{read_runs, DataRun};

/// Where the catalog's records live: the `$MFT` unnamed `$DATA` run list.
#[derive(Debug, Clone)]
struct MftMap {
    runs: Vec<DataRun>,
    size: u64,
}

impl MftMap {
    fn from_record(mft: &FileRecord) -> Result<Self> {
        let data = mft
            .find_attribute(ATTR_DATA, "")
            .ok_or_else(|| Error::metadata("$MFT has no unnamed $DATA attribute"))?;
        match &data.body {
            AttributeBody::NonResident { runs, data_size, .. } if !runs.is_empty() => Ok(Self {
                runs: runs.clone(),
                size: *data_size,
            }),
            _ => Err(Error::metadata("$MFT $DATA attribute is not a non-resident run list")),
        }
    }
}

/// Disk access plus the loaded master catalog. Records are loaded on demand
/// and owned by the caller.
///
/// Field order is release order: the catalog goes before the disk handle.
pub struct Volume<D> {
    mft: FileRecord,
    mft_map: MftMap,
    disk: DiskReader<D>,
    geometry: BootGeometry,
}

impl<D: Read + Seek> Volume<D> {
    /// Loads the `$MFT` record (record 0, read straight from the boot sector's
    /// MFT cluster) and takes ownership of the disk.
    pub fn mount(mut disk: DiskReader<D>, geometry: BootGeometry) -> Result<Self> {
        let offset = geometry
            .mft_offset()
            .ok_or_else(|| Error::metadata("MFT offset overflows"))?;
        let mut raw = vec![0u8; geometry.file_record_size as usize];
        disk.read_at(offset, &mut raw)
            .map_err(|e| Error::metadata(format!("cannot read MFT record 0 at {:#x}: {}", offset, e)))?;

        let base = FileRecord::parse(FileReference::MFT, raw)?;
        // Extension records of $MFT are found through its own base run list.
        let bootstrap = MftMap::from_record(&base)?;
        let mft = assemble(&mut disk, &geometry, &bootstrap, base)?;
        let mft_map = MftMap::from_record(&mft)?;
        debug!(
            "$MFT loaded: {} bytes in {} runs",
            mft_map.size,
            mft_map.runs.len()
        );

        Ok(Self {
            mft,
            mft_map,
            disk,
            geometry,
        })
    }

    pub fn geometry(&self) -> &BootGeometry {
        &self.geometry
    }

    pub fn mft(&self) -> &FileRecord {
        &self.mft
    }

    pub fn disk_mut(&mut self) -> &mut DiskReader<D> {
        &mut self.disk
    }

    /// Loads a base record by reference, merging its extension records.
    pub fn load_record(&mut self, reference: FileReference) -> Result<FileRecord> {
        debug!("loading record {}", reference);
        let raw = fetch_raw(&mut self.disk, &self.geometry, &self.mft_map, reference.record_number())?;
        let base = FileRecord::parse(reference, raw)?;
        if base.header.base_record_reference.record_number() != 0 {
            return Err(Error::metadata(format!(
                "record {} is an extension of record {}",
                reference.record_number(),
                base.header.base_record_reference.record_number()
            )));
        }
        assemble(&mut self.disk, &self.geometry, &self.mft_map, base)
    }

    pub fn open_cursor(&self, attribute: &Attribute) -> Result<AttributeCursor> {
        AttributeCursor::open(attribute, self.geometry.cluster_size)
    }

    /// Whole content of an attribute.
    pub fn read_attribute(&mut self, attribute: &Attribute) -> Result<Vec<u8>> {
        let mut cursor = self.open_cursor(attribute)?;
        cursor.read_to_end(&mut self.disk)
    }
}

fn fetch_raw<D: Read + Seek>(
    disk: &mut DiskReader<D>,
    geometry: &BootGeometry,
    map: &MftMap,
    record_number: u64,
) -> Result<Vec<u8>> {
    let record_size = geometry.file_record_size as u64;
    let offset = record_number
        .checked_mul(record_size)
        .filter(|off| off.saturating_add(record_size) <= map.size)
        .ok_or_else(|| Error::metadata(format!("record {} lies beyond the end of the MFT", record_number)))?;

    trace!("record {} at MFT offset {:#x}", record_number, offset);
    let mut raw = vec![0u8; record_size as usize];
    read_runs(disk, &map.runs, geometry.cluster_size, offset, &mut raw)
        .map_err(|e| Error::metadata(format!("cannot read record {}: {}", record_number, e)))?;
    Ok(raw)
}

/// Pulls in the extension records named by `$ATTRIBUTE_LIST` and stitches
/// split non-resident attributes.
fn assemble<D: Read + Seek>(
    disk: &mut DiskReader<D>,
    geometry: &BootGeometry,
    map: &MftMap,
    mut base: FileRecord,
) -> Result<FileRecord> {
    let list = match base.first_attribute(ATTR_ATTRIBUTE_LIST) {
        Some(attr) => {
            let mut cursor = AttributeCursor::open(attr, geometry.cluster_size)?;
            let list = cursor.read_to_end(disk).map_err(|e| {
                Error::metadata(format!(
                    "cannot read $ATTRIBUTE_LIST of record {}: {}",
                    base.reference.record_number(),
                    e
                ))
            })?;
            Some(list)
        }
        None => None,
    };

    if let Some(list) = list {
        let own_number = base.reference.record_number();
        let mut extensions: Vec<FileReference> = Vec::new();
        for entry in AttributeListEntry::parse_list(&list)? {
            let number = entry.reference.record_number();
            if number != own_number && !extensions.iter().any(|r| r.record_number() == number) {
                extensions.push(entry.reference);
            }
        }
        for reference in extensions {
            debug!("record {}: loading extension record {}", own_number, reference);
            let raw = fetch_raw(disk, geometry, map, reference.record_number())?;
            base.absorb_extension(FileRecord::parse(reference, raw)?)?;
        }
    }

    base.stitch_fragments()?;
    Ok(base)
}
