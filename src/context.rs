use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek};

use log::{debug, error, info, warn};

use crate::cli::Parameters;
use crate::disk::{DeviceOpener, DiskReader};
use crate::error::{Error, Result};
use crate::mft::attributes::ATTR_DATA;
use crate::mft::boot::{read_boot_sector, BootGeometry};
use crate::mft::record::{FileRecord, FileReference};
use crate::mft::upcase::{UpcaseTable, UPCASE_TABLE_BYTES};
use crate::path::{self, PathStep};
use crate::volume::Volume;

/// Diagnostic summary written under the output folder on `--write-fs-info`.
pub const FS_INFO_FILE: &str = "VolInfo.txt";

/// Working session over one volume.
///
/// Fields drop in declaration order, which is the reverse of the order the
/// builder acquires them: case-folding table, then the catalog and disk
/// handle, then the parameters.
pub struct VolumeContext<D> {
    upcase: UpcaseTable,
    volume: Volume<D>,
    parameters: Parameters,
}

impl<D> Drop for VolumeContext<D> {
    fn drop(&mut self) {
        debug!("releasing volume context for {}", self.parameters.source);
    }
}

impl<D: Read + Seek> VolumeContext<D> {
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn geometry(&self) -> &BootGeometry {
        self.volume.geometry()
    }

    pub fn upcase(&self) -> &UpcaseTable {
        &self.upcase
    }

    pub fn volume(&self) -> &Volume<D> {
        &self.volume
    }

    pub fn volume_mut(&mut self) -> &mut Volume<D> {
        &mut self.volume
    }

    pub fn load_record(&mut self, reference: FileReference) -> Result<FileRecord> {
        self.volume.load_record(reference)
    }

    pub fn resolve_path(&mut self, path: &str) -> Result<Vec<PathStep>> {
        path::resolve(&mut self.volume, &self.upcase, path)
    }
}

/// Builds a [`VolumeContext`] in ordered stages. A failing stage returns
/// early and everything acquired before it is dropped in reverse order.
pub struct ContextBuilder<'a, O> {
    opener: &'a O,
}

impl<'a, O: DeviceOpener> ContextBuilder<'a, O> {
    pub fn new(opener: &'a O) -> Self {
        Self { opener }
    }

    pub fn build<I, T>(&self, args: I) -> Result<VolumeContext<O::Device>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        // 1. parameters
        let parameters = Parameters::from_args(args)?;
        debug!("parameters: {:?}", parameters);

        // 2. boot sector; the device is only held for this read
        let boot = read_boot_sector(self.opener, &parameters.source, parameters.image_offset)?;

        // 3. geometry
        let geometry = BootGeometry::derive(&boot);
        info!(
            "{}: {} bytes/cluster, {} bytes/record, MFT at cluster {:#x}",
            parameters.source, geometry.cluster_size, geometry.file_record_size, geometry.mft_lcn
        );

        // 4. optional diagnostic summary, never fatal
        if parameters.write_fs_info {
            write_fs_info(&parameters, &geometry);
        }

        // 5. disk access
        let device = self
            .opener
            .open_device(&parameters.source)
            .map_err(|e| Error::volume(format!("cannot open {}: {}", parameters.source, e)))?;
        let disk = DiskReader::new(device, parameters.image_offset, geometry.bytes_per_sector);

        // 6. master catalog
        let mut volume = Volume::mount(disk, geometry)?;

        // 7. case-folding table
        let upcase = load_upcase(&mut volume)?;

        Ok(VolumeContext {
            upcase,
            volume,
            parameters,
        })
    }
}

fn write_fs_info(parameters: &Parameters, geometry: &BootGeometry) {
    let path = parameters.output.join(FS_INFO_FILE);
    let written = File::create(&path).and_then(|mut file| geometry.write_summary(&mut file));
    match written {
        Ok(()) => debug!("volume summary written to {}", path.display()),
        Err(e) => warn!("cannot write {}: {}", path.display(), e),
    }
}

fn load_upcase<D: Read + Seek>(volume: &mut Volume<D>) -> Result<UpcaseTable> {
    let record = volume.load_record(FileReference::UPCASE).map_err(|e| {
        error!("cannot load the $UpCase record: {}", e);
        e
    })?;
    let data = record.find_attribute(ATTR_DATA, "").ok_or_else(|| {
        error!("$UpCase has no unnamed $DATA attribute");
        Error::metadata("$UpCase has no unnamed $DATA attribute")
    })?;

    let length = data.declared_length();
    if length != UPCASE_TABLE_BYTES as u64 {
        error!("UpCase file incomplete: {} bytes, expected {}", length, UPCASE_TABLE_BYTES);
        return Err(Error::metadata(format!(
            "UpCase file incomplete: {} bytes, expected {}",
            length, UPCASE_TABLE_BYTES
        )));
    }

    let bytes = volume.read_attribute(data).map_err(|e| {
        error!("cannot read the $UpCase table: {}", e);
        Error::metadata(format!("cannot read the $UpCase table: {}", e))
    })?;
    UpcaseTable::from_bytes(bytes)
}
