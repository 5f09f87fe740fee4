use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::disk::DeviceOpener;
use crate::error::{Error, Result};

pub const BOOT_SECTOR_SIZE: usize = 512;
/// Largest file record accepted; real volumes use 1 KiB or 4 KiB.
pub const MAX_FILE_RECORD_SIZE: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct NtfsBootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub total_sectors: u64,
    pub mft_lcn: u64,
    pub mft_mirror_lcn: u64,
    pub clusters_per_file_record_segment: i8,
    pub clusters_per_index_buffer: i8,
    pub volume_serial_number: u64,
}

impl NtfsBootSector {
    /// Decodes the volume boot record. Returns `None` when the sector is not
    /// an NTFS boot sector or its record size selector is unusable.
    pub fn parse(vbr: &[u8]) -> Option<Self> {
        if vbr.len() < BOOT_SECTOR_SIZE {
            return None;
        }
        if &vbr[3..11] != b"NTFS    " {
            return None;
        }
        if vbr[510] != 0x55 || vbr[511] != 0xAA {
            return None;
        }

        let clusters_per_file_record_segment = vbr[64] as i8;
        if clusters_per_file_record_segment == 0 || clusters_per_file_record_segment < -31 {
            return None;
        }

        Some(Self {
            bytes_per_sector: LittleEndian::read_u16(&vbr[11..13]),
            sectors_per_cluster: vbr[13],
            total_sectors: LittleEndian::read_u64(&vbr[40..48]),
            mft_lcn: LittleEndian::read_u64(&vbr[48..56]),
            mft_mirror_lcn: LittleEndian::read_u64(&vbr[56..64]),
            clusters_per_file_record_segment,
            clusters_per_index_buffer: vbr[68] as i8,
            volume_serial_number: LittleEndian::read_u64(&vbr[72..80]),
        })
    }

    /// Values above 0x80 encode `2^(256 - v)` (clusters larger than 64 KiB).
    pub fn sectors_per_cluster(&self) -> u32 {
        let spc = self.sectors_per_cluster;
        if spc > 0x80 {
            let shift = 256 - spc as u32;
            if shift > 31 { 0 } else { 1u32 << shift }
        } else {
            spc as u32
        }
    }

    pub fn bytes_per_cluster(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster() as u64
    }

    fn selector_to_bytes(&self, selector: i8) -> u64 {
        if selector > 0 {
            self.bytes_per_cluster().saturating_mul(selector as u64)
        } else {
            1u64 << (-(selector as i32)) as u32
        }
    }

    pub fn file_record_size_bytes(&self) -> u64 {
        self.selector_to_bytes(self.clusters_per_file_record_segment)
    }

    pub fn index_buffer_size_bytes(&self) -> u64 {
        if self.clusters_per_index_buffer == 0 || self.clusters_per_index_buffer < -31 {
            return 0;
        }
        self.selector_to_bytes(self.clusters_per_index_buffer)
    }

    pub fn validate(&self) -> Result<()> {
        let bps = self.bytes_per_sector;
        if bps != 512 && bps != 1024 && bps != 2048 && bps != 4096 {
            return Err(Error::volume(format!("invalid bytes per sector: {}", bps)));
        }
        let spc = self.sectors_per_cluster();
        if spc == 0 || !spc.is_power_of_two() {
            return Err(Error::volume(format!(
                "invalid sectors per cluster: {:#x}",
                self.sectors_per_cluster
            )));
        }
        if self.mft_lcn == 0 {
            return Err(Error::volume("MFT cluster is 0"));
        }
        let rs = self.file_record_size_bytes();
        if rs < 512 || rs > MAX_FILE_RECORD_SIZE || !rs.is_power_of_two() || rs % bps as u64 != 0 {
            return Err(Error::volume(format!("invalid file record size: {}", rs)));
        }
        Ok(())
    }
}

/// Reads, decodes and validates the boot sector found `offset` bytes into `source`.
/// The device is opened only for the duration of the call.
pub fn read_boot_sector<O: DeviceOpener>(opener: &O, source: &str, offset: u64) -> Result<NtfsBootSector> {
    let mut device = opener
        .open_device(source)
        .map_err(|e| Error::volume(format!("cannot open {}: {}", source, e)))?;

    let mut vbr = [0u8; BOOT_SECTOR_SIZE];
    device
        .seek(SeekFrom::Start(offset))
        .and_then(|_| device.read_exact(&mut vbr))
        .map_err(|e| Error::volume(format!("cannot read boot sector at {:#x}: {}", offset, e)))?;

    let boot = NtfsBootSector::parse(&vbr)
        .ok_or_else(|| Error::volume(format!("no NTFS boot sector at {:#x}", offset)))?;
    boot.validate()?;
    debug!("boot sector at {:#x}: {:?}", offset, boot);
    Ok(boot)
}

/// Plain sizes derived from the boot sector. Nothing downstream looks at the
/// raw size selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootGeometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub cluster_size: u64,
    pub file_record_size: u32,
    pub index_buffer_size: u64,
    pub mft_lcn: u64,
    pub mft_mirror_lcn: u64,
    pub total_sectors: u64,
    pub volume_serial_number: u64,
}

impl BootGeometry {
    pub fn derive(boot: &NtfsBootSector) -> Self {
        Self {
            bytes_per_sector: boot.bytes_per_sector as u32,
            sectors_per_cluster: boot.sectors_per_cluster(),
            cluster_size: boot.bytes_per_cluster(),
            file_record_size: boot.file_record_size_bytes() as u32,
            index_buffer_size: boot.index_buffer_size_bytes(),
            mft_lcn: boot.mft_lcn,
            mft_mirror_lcn: boot.mft_mirror_lcn,
            total_sectors: boot.total_sectors,
            volume_serial_number: boot.volume_serial_number,
        }
    }

    pub fn mft_offset(&self) -> Option<u64> {
        self.mft_lcn.checked_mul(self.cluster_size)
    }

    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Volume serial number:     {:016X}", self.volume_serial_number)?;
        writeln!(out, "Total sectors:            {}", self.total_sectors)?;
        writeln!(out, "Bytes per sector:         {}", self.bytes_per_sector)?;
        writeln!(out, "Sectors per cluster:      {}", self.sectors_per_cluster)?;
        writeln!(out, "Bytes per cluster:        {}", self.cluster_size)?;
        writeln!(out, "Bytes per file record:    {}", self.file_record_size)?;
        writeln!(out, "Bytes per index buffer:   {}", self.index_buffer_size)?;
        writeln!(out, "MFT cluster:              {:#x}", self.mft_lcn)?;
        writeln!(out, "MFT mirror cluster:       {:#x}", self.mft_mirror_lcn)?;
        Ok(())
    }
}
