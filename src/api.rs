//! Handle-style entry points for embedding callers: absent handles and
//! buffers are tolerated, failures collapse into `None` / [`READ_FAILED`].

use std::ffi::OsString;
use std::io::{Read, Seek};

use log::{debug, error};

use crate::stream::StreamHandle;

/// Returned by [`read`] when the underlying device read fails.
pub const READ_FAILED: i64 = -1;

pub fn open<I, T>(args: I) -> Option<Box<StreamHandle>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match StreamHandle::open(args) {
        Ok(handle) => Some(Box::new(handle)),
        Err(e) => {
            error!("open failed: {}", e);
            None
        }
    }
}

/// Copies at most `max_len` bytes (and never more than the buffer holds).
/// Returns the count copied, 0 at end of stream or when the handle or buffer
/// is missing, or [`READ_FAILED`].
pub fn read<D: Read + Seek>(handle: Option<&mut StreamHandle<D>>, dest: Option<&mut [u8]>, max_len: u64) -> i64 {
    let (Some(handle), Some(dest)) = (handle, dest) else {
        return 0;
    };
    let len = max_len.min(dest.len() as u64) as usize;
    match handle.read(&mut dest[..len]) {
        Ok(n) => n as i64,
        Err(e) => {
            debug!("read failed at {}: {}", handle.position(), e);
            READ_FAILED
        }
    }
}

pub fn size<D: Read + Seek>(handle: Option<&StreamHandle<D>>) -> u64 {
    handle.map_or(0, StreamHandle::size)
}

pub fn close<D: Read + Seek>(handle: Option<Box<StreamHandle<D>>>) {
    if let Some(handle) = handle {
        handle.close();
    }
}
