use std::io::{self, Read, Seek};

use crate::disk::DiskReader;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRun {
    pub vcn_start: u64,
    pub length: u64,
    pub lcn: u64,
    pub is_sparse: bool,
}

impl DataRun {
    pub fn vcn_end(&self) -> u64 {
        self.vcn_start.saturating_add(self.length)
    }
}

/// Strict run-list decoding. `data` starts at the first run header and ends at
/// the end of the attribute.
pub fn parse_data_runs(data: &[u8], start_vcn: u64) -> Result<Vec<DataRun>> {
    let mut runs = Vec::new();
    let mut run_off = 0usize;
    let mut current_vcn = start_vcn;
    let mut current_lcn: i64 = 0;

    while run_off < data.len() {
        let header = data[run_off];
        if header == 0 {
            break;
        }

        let len_bytes = (header & 0x0F) as usize;
        let off_bytes = ((header & 0xF0) >> 4) as usize;
        run_off += 1;

        if len_bytes == 0 || len_bytes > 8 || off_bytes > 8 {
            return Err(Error::metadata(format!(
                "bad run header {:#04x} (len={}, off={})",
                header, len_bytes, off_bytes
            )));
        }
        if run_off + len_bytes + off_bytes > data.len() {
            return Err(Error::metadata("data runs exceed the attribute"));
        }

        let mut run_length: u64 = 0;
        for i in 0..len_bytes {
            run_length |= (data[run_off + i] as u64) << (i * 8);
        }
        run_off += len_bytes;

        if run_length == 0 {
            return Err(Error::metadata("zero-length data run"));
        }

        let mut run_delta: i64 = 0;
        if off_bytes > 0 {
            for i in 0..off_bytes {
                run_delta |= (data[run_off + i] as i64) << (i * 8);
            }
            if data[run_off + off_bytes - 1] & 0x80 != 0 {
                for i in off_bytes..8 {
                    run_delta |= 0xFF_i64 << (i * 8);
                }
            }
        }
        run_off += off_bytes;

        let is_sparse = off_bytes == 0;
        let lcn = if is_sparse {
            0
        } else {
            current_lcn = current_lcn
                .checked_add(run_delta)
                .ok_or_else(|| Error::metadata("LCN overflow in run list"))?;
            if current_lcn < 0 {
                return Err(Error::metadata(format!("negative LCN {} in run list", current_lcn)));
            }
            current_lcn as u64
        };

        runs.push(DataRun {
            vcn_start: current_vcn,
            length: run_length,
            lcn,
            is_sparse,
        });
        current_vcn = current_vcn
            .checked_add(run_length)
            .ok_or_else(|| Error::metadata("VCN overflow in run list"))?;
    }
    Ok(runs)
}

/// Checks that sorted runs cover VCN 0.. without holes or overlaps and returns
/// the number of clusters covered.
pub fn check_contiguous(runs: &[DataRun]) -> Result<u64> {
    let mut expected_vcn = 0u64;
    for run in runs {
        if run.vcn_start > expected_vcn {
            return Err(Error::metadata(format!(
                "hole in run list: expected VCN {}, found {}",
                expected_vcn, run.vcn_start
            )));
        }
        if run.vcn_start < expected_vcn {
            return Err(Error::metadata(format!(
                "overlapping runs: expected VCN {}, found {}",
                expected_vcn, run.vcn_start
            )));
        }
        expected_vcn = expected_vcn
            .checked_add(run.length)
            .ok_or_else(|| Error::metadata("VCN overflow in run list"))?;
    }
    Ok(expected_vcn)
}

/// Fills `buf` with the attribute bytes at `logical_offset`, following `runs`.
/// Sparse runs read as zeros.
pub fn read_runs<D: Read + Seek>(
    disk: &mut DiskReader<D>,
    runs: &[DataRun],
    cluster_size: u64,
    mut logical_offset: u64,
    mut buf: &mut [u8],
) -> io::Result<()> {
    while !buf.is_empty() {
        let target_vcn = logical_offset / cluster_size;
        let run = runs
            .iter()
            .find(|r| target_vcn >= r.vcn_start && target_vcn < r.vcn_end())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("VCN {} is not mapped by the run list", target_vcn),
                )
            })?;

        let run_byte_end = run.vcn_end().saturating_mul(cluster_size);
        let to_read = std::cmp::min(buf.len() as u64, run_byte_end - logical_offset) as usize;

        if run.is_sparse {
            buf[..to_read].fill(0);
        } else {
            let offset_in_run = logical_offset - run.vcn_start * cluster_size;
            let physical = run
                .lcn
                .checked_mul(cluster_size)
                .and_then(|p| p.checked_add(offset_in_run))
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "physical offset overflow"))?;
            disk.read_at(physical, &mut buf[..to_read])?;
        }

        let tmp = buf;
        buf = &mut tmp[to_read..];
        logical_offset += to_read as u64;
    }
    Ok(())
}
