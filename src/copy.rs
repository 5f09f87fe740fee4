use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::Path;

use log::{info, warn};

use crate::error::{Error, Result};
use crate::mft::record::FileRecord;
use crate::models::{CopySummary, Timestamps, VolumeMeta};
use crate::stream::StreamHandle;

pub const COPY_CHUNK: usize = 1024 * 1024;

/// Output file name for a record: its best `$FILE_NAME`, else `<record>.bin`.
pub fn output_name(record: &FileRecord) -> String {
    record
        .file_name()
        .map(|f| {
            f.name
                .chars()
                .map(|c| match c {
                    '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
                    c if c.is_control() => '_',
                    c => c,
                })
                .collect::<String>()
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| format!("{}.bin", record.reference.record_number()))
}

/// Streams the handle into `<output>/<name>` and writes the
/// `<name>.meta.json` sidecar next to it.
pub fn copy_to_output<D: Read + Seek>(handle: &mut StreamHandle<D>) -> Result<CopySummary> {
    let output = handle.parameters().output.clone();
    let name = output_name(handle.record());
    fs::create_dir_all(&output)?;
    let target = output.join(&name);

    info!(
        "copying {} bytes of record {} to {}",
        handle.size(),
        handle.record().reference,
        target.display()
    );
    let mut out = BufWriter::new(File::create(&target)?);
    let mut chunk = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;
    loop {
        let n = handle.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        out.write_all(&chunk[..n])?;
        copied += n as u64;
    }
    out.flush()?;
    if copied != handle.size() {
        warn!("copied {} bytes, stream size is {}", copied, handle.size());
    }

    let summary = summarize(handle, &name, &target, copied);
    let meta_path = output.join(format!("{}.meta.json", name));
    let mut meta = File::create(&meta_path)?;
    serde_json::to_writer_pretty(&mut meta, &summary)
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    meta.write_all(b"\n")?;
    Ok(summary)
}

fn summarize<D: Read + Seek>(handle: &StreamHandle<D>, name: &str, target: &Path, copied: u64) -> CopySummary {
    let record = handle.record();
    let parameters = handle.parameters();
    CopySummary {
        file_name: name.to_string(),
        file_reference: record.reference.to_string(),
        record_number: record.reference.record_number(),
        sequence_number: record.reference.sequence(),
        size: handle.size(),
        bytes_copied: copied,
        output_path: target.display().to_string(),
        timestamps: Timestamps::from_standard_information(record.standard_information().as_ref()),
        volume: VolumeMeta::new(&parameters.source, parameters.image_offset, handle.geometry()),
    }
}
