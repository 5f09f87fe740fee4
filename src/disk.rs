use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use log::trace;

/// Opens the raw source named by the parameters (device, image file, drive letter).
pub trait DeviceOpener {
    type Device: Read + Seek;

    fn open_device(&self, source: &str) -> io::Result<Self::Device>;
}

/// Opens sources through the host file API.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileOpener;

impl DeviceOpener for FileOpener {
    type Device = File;

    fn open_device(&self, source: &str) -> io::Result<File> {
        File::open(device_path(source))
    }
}

/// `C:` / `C:\` name the raw volume `\\.\C:` on Windows; anything else is used as is.
pub fn device_path(source: &str) -> String {
    let is_drive = source.len() >= 2
        && source.len() <= 3
        && source.as_bytes()[0].is_ascii_alphabetic()
        && source.as_bytes()[1] == b':'
        && (source.len() == 2 || source.ends_with('\\') || source.ends_with('/'));
    if cfg!(windows) && is_drive {
        format!("\\\\.\\{}", &source[0..2])
    } else {
        source.to_string()
    }
}

/// Sector-aligned reader over one NTFS volume inside a device.
///
/// Offsets passed to [`DiskReader::read_at`] are relative to the start of the
/// volume. Raw volume handles only accept whole-sector transfers, so unaligned
/// requests are widened to sector boundaries and copied out of a scratch buffer.
pub struct DiskReader<D> {
    device: D,
    volume_offset: u64,
    sector_size: u64,
}

impl<D: Read + Seek> DiskReader<D> {
    pub fn new(device: D, volume_offset: u64, sector_size: u32) -> Self {
        Self {
            device,
            volume_offset,
            sector_size: sector_size.max(1) as u64,
        }
    }

    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let start = self
            .volume_offset
            .checked_add(offset)
            .ok_or_else(|| overflow(offset))?;
        let end = start
            .checked_add(buf.len() as u64)
            .ok_or_else(|| overflow(offset))?;

        let ss = self.sector_size;
        let aligned_start = start - start % ss;
        let aligned_end = match end % ss {
            0 => end,
            rem => end.checked_add(ss - rem).ok_or_else(|| overflow(offset))?,
        };

        trace!("disk read {} bytes at {:#x}", buf.len(), start);
        self.device.seek(SeekFrom::Start(aligned_start))?;
        if aligned_start == start && aligned_end == end {
            return self.device.read_exact(buf);
        }

        let mut scratch = vec![0u8; (aligned_end - aligned_start) as usize];
        self.device.read_exact(&mut scratch)?;
        let skip = (start - aligned_start) as usize;
        buf.copy_from_slice(&scratch[skip..skip + buf.len()]);
        Ok(())
    }
}

fn overflow(offset: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("disk offset {:#x} overflows", offset),
    )
}
