use std::io::{self, Read, Seek};

use log::trace;

use crate::disk::DiskReader;
use crate::error::{Error, Result};
use crate::mft::attributes::{Attribute, AttributeBody, ATTR_FLAG_COMPRESSED, ATTR_FLAG_ENCRYPTED};
use crate::mft::runs::{check_contiguous, read_runs, DataRun};

enum Source {
    Resident(Vec<u8>),
    NonResident {
        runs: Vec<DataRun>,
        initialized_size: u64,
        cluster_size: u64,
    },
}

/// Sequential reader over the content of one attribute.
///
/// The cursor owns a copy of the attribute's value or run list, so it does not
/// borrow the record it came from. The disk is passed to every read.
pub struct AttributeCursor {
    source: Source,
    length: u64,
    position: u64,
}

impl AttributeCursor {
    pub fn open(attribute: &Attribute, cluster_size: u64) -> Result<Self> {
        if attribute.flags & ATTR_FLAG_COMPRESSED != 0 {
            return Err(Error::metadata(format!(
                "attribute {:#x} is compressed, which is not supported",
                attribute.type_code
            )));
        }
        if attribute.flags & ATTR_FLAG_ENCRYPTED != 0 {
            return Err(Error::metadata(format!(
                "attribute {:#x} is encrypted, which is not supported",
                attribute.type_code
            )));
        }

        let (source, length) = match &attribute.body {
            AttributeBody::Resident(value) => (Source::Resident(value.clone()), value.len() as u64),
            AttributeBody::NonResident {
                start_vcn,
                data_size,
                initialized_size,
                runs,
                ..
            } => {
                if *start_vcn != 0 {
                    return Err(Error::metadata(format!(
                        "attribute {:#x} piece starts at VCN {}",
                        attribute.type_code, start_vcn
                    )));
                }
                let clusters = check_contiguous(runs)?;
                if clusters.saturating_mul(cluster_size) < *data_size {
                    return Err(Error::metadata(format!(
                        "run list of attribute {:#x} covers {} clusters, too few for {} bytes",
                        attribute.type_code, clusters, data_size
                    )));
                }
                let source = Source::NonResident {
                    runs: runs.clone(),
                    initialized_size: (*initialized_size).min(*data_size),
                    cluster_size,
                };
                (source, *data_size)
            }
        };

        Ok(Self {
            source,
            length,
            position: 0,
        })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Produces exactly `len` bytes from the current position and advances
    /// past them. On failure the position is left unchanged.
    pub fn read<D: Read + Seek>(&mut self, disk: &mut DiskReader<D>, len: usize) -> Result<Vec<u8>> {
        let data = self.read_at(disk, self.position, len)?;
        self.position += len as u64;
        Ok(data)
    }

    /// Reads `len` bytes at `offset` without moving the cursor.
    pub fn read_at<D: Read + Seek>(&self, disk: &mut DiskReader<D>, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= self.length)
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("read of {} bytes at {} passes the attribute end {}", len, offset, self.length),
                ))
            })?;

        match &self.source {
            Source::Resident(value) => Ok(value[offset as usize..end as usize].to_vec()),
            Source::NonResident {
                runs,
                initialized_size,
                cluster_size,
            } => {
                let mut buf = vec![0u8; len];
                // Bytes past the initialized size read as zeros.
                if offset < *initialized_size {
                    let on_disk = (end.min(*initialized_size) - offset) as usize;
                    trace!("attribute read {} bytes at {} ({} from disk)", len, offset, on_disk);
                    read_runs(disk, runs, *cluster_size, offset, &mut buf[..on_disk])?;
                }
                Ok(buf)
            }
        }
    }

    pub fn read_to_end<D: Read + Seek>(&mut self, disk: &mut DiskReader<D>) -> Result<Vec<u8>> {
        let remaining = (self.length - self.position) as usize;
        self.read(disk, remaining)
    }
}
