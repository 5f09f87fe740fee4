use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read, Seek};

use log::{debug, error, trace};

use crate::cli::Parameters;
use crate::context::{ContextBuilder, VolumeContext};
use crate::cursor::AttributeCursor;
use crate::disk::{DeviceOpener, FileOpener};
use crate::error::{Error, Result};
use crate::mft::attributes::ATTR_DATA;
use crate::mft::boot::BootGeometry;
use crate::mft::record::{FileRecord, FileReference};
use crate::path::PathStep;

/// Read-only byte stream over the unnamed `$DATA` attribute of one file.
///
/// The size is fixed when the stream is opened. Dropping or closing the
/// handle releases the cursor, then the file record, then the volume context.
pub struct StreamHandle<D = File> {
    cursor: AttributeCursor,
    record: FileRecord,
    context: VolumeContext<D>,
    total_size: u64,
}

impl StreamHandle<File> {
    /// Opens the stream named by a command line (`args[0]` is the program name).
    pub fn open<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::open_with(args, &FileOpener)
    }
}

impl<D: Read + Seek> StreamHandle<D> {
    pub fn open_with<O, I, T>(args: I, opener: &O) -> Result<Self>
    where
        O: DeviceOpener<Device = D>,
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut context = ContextBuilder::new(opener).build(args)?;

        let reference = target_reference(&mut context)?;
        let record = context.load_record(reference)?;

        let data = record.find_attribute(ATTR_DATA, "").ok_or_else(|| {
            error!("record {} has no unnamed $DATA attribute", reference);
            Error::metadata(format!("record {} has no unnamed $DATA attribute", reference))
        })?;
        let cursor = context.volume().open_cursor(data)?;
        let total_size = data.declared_length();
        debug!("stream open on record {}: {} bytes", record.reference, total_size);

        Ok(Self {
            cursor,
            record,
            context,
            total_size,
        })
    }

    /// Copies up to `buf.len()` bytes. `Ok(0)` means end of stream (or an
    /// empty buffer). On error nothing is written to `buf` and the position
    /// does not move.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let position = self.cursor.position();
        if position >= self.total_size {
            trace!("read at {}: end of stream", position);
            return Ok(0);
        }

        let remaining = self.total_size - position;
        let request = (buf.len() as u64).min(remaining) as usize;
        if request == 0 {
            return Ok(0);
        }
        trace!("read at {}: {} requested, {} remaining, reading {}", position, buf.len(), remaining, request);

        let data = self.cursor.read(self.context.volume_mut().disk_mut(), request)?;
        buf[..request].copy_from_slice(&data);
        Ok(request)
    }

    pub fn size(&self) -> u64 {
        self.total_size
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn parameters(&self) -> &Parameters {
        self.context.parameters()
    }

    pub fn geometry(&self) -> &BootGeometry {
        self.context.geometry()
    }

    /// The file record the stream was opened on.
    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn close(self) {
        debug!("closing stream on record {}", self.record.reference);
    }
}

fn target_reference<D: Read + Seek>(context: &mut VolumeContext<D>) -> Result<FileReference> {
    if let Some(raw) = context.parameters().mft_ref {
        return Ok(FileReference::new(raw));
    }
    let path = context
        .parameters()
        .path
        .clone()
        .ok_or_else(|| Error::metadata("neither a file reference nor a path was given"))?;

    let steps = context.resolve_path(&path).map_err(|e| {
        error!("cannot resolve '{}': {}", path, e);
        e
    })?;
    steps
        .last()
        .map(PathStep::file_reference)
        .ok_or_else(|| Error::metadata(format!("path '{}' names no file", path)))
}

impl<D: Read + Seek> Read for StreamHandle<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        StreamHandle::read(self, buf).map_err(|e| match e {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        })
    }
}
