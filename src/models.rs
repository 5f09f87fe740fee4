use serde::{Deserialize, Serialize};

use crate::mft::attributes::StandardInformation;
use crate::mft::boot::BootGeometry;

/// Volume geometry as recorded in the `.meta.json` sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMeta {
    pub source: String,
    pub image_offset: u64,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub bytes_per_cluster: u64,
    pub mft_lcn: u64,
    pub mft_mirror_lcn: u64,
    pub mft_record_size: u32,
    pub index_buffer_size: u64,
    pub volume_serial_number: u64,
}

impl VolumeMeta {
    pub fn new(source: &str, image_offset: u64, geometry: &BootGeometry) -> Self {
        Self {
            source: source.to_string(),
            image_offset,
            bytes_per_sector: geometry.bytes_per_sector,
            sectors_per_cluster: geometry.sectors_per_cluster,
            bytes_per_cluster: geometry.cluster_size,
            mft_lcn: geometry.mft_lcn,
            mft_mirror_lcn: geometry.mft_mirror_lcn,
            mft_record_size: geometry.file_record_size,
            index_buffer_size: geometry.index_buffer_size,
            volume_serial_number: geometry.volume_serial_number,
        }
    }
}

/// `$STANDARD_INFORMATION` timestamps, RFC 3339.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timestamps {
    pub created: Option<String>,
    pub modified: Option<String>,
    pub record_changed: Option<String>,
    pub accessed: Option<String>,
}

impl Timestamps {
    pub fn from_standard_information(si: Option<&StandardInformation>) -> Self {
        match si {
            Some(si) => Self {
                created: Some(si.creation_time.to_rfc3339()),
                modified: Some(si.modified_time.to_rfc3339()),
                record_changed: Some(si.mft_modified_time.to_rfc3339()),
                accessed: Some(si.accessed_time.to_rfc3339()),
            },
            None => Self::default(),
        }
    }
}

/// Sidecar written next to a copied stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySummary {
    pub file_name: String,
    pub file_reference: String,
    pub record_number: u64,
    pub sequence_number: u16,
    pub size: u64,
    pub bytes_copied: u64,
    pub output_path: String,
    pub timestamps: Timestamps,
    pub volume: VolumeMeta,
}
