use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::error::Result;

const EXAMPLES: &str = r#"
EXAMPLES:

  1. Copy a file by path from the live C: volume:
     rawstream --source C: --path \Windows\System32\config\SAM --output D:\out

  2. Copy a file by file reference (record 0 is $MFT itself):
     rawstream -s C: -r 0 -o D:\out

  3. Copy from a whole-disk image whose NTFS partition starts at sector 2048,
     and write the volume geometry to D:\out\VolInfo.txt:
     rawstream -s disk.img --image-offset 0x100000 -p Users\Public\notes.txt -o D:\out --write-fs-info
"#;

/// Invocation parameters, parsed from a C-style argument vector.
#[derive(Parser, Debug, Clone)]
#[command(name = "rawstream")]
#[command(version = "0.1")]
#[command(about = "Streams the primary data of one file out of an unmounted NTFS volume")]
#[command(after_help = EXAMPLES)]
#[command(group(ArgGroup::new("target").required(true).args(["mft_ref", "path"])))]
pub struct Parameters {
    /// Device, disk image file or drive letter (C:)
    #[arg(short, long)]
    pub source: String,
    /// Byte offset of the NTFS volume inside the source
    #[arg(long, default_value_t = 0, value_parser = parse_number)]
    pub image_offset: u64,
    /// Output folder
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
    /// Write the volume geometry summary to <output>/VolInfo.txt
    #[arg(long)]
    pub write_fs_info: bool,
    /// File reference of the target (record number, optionally with sequence in the high 16 bits)
    #[arg(short = 'r', long, value_parser = parse_number)]
    pub mft_ref: Option<u64>,
    /// Path of the target inside the volume
    #[arg(short, long)]
    pub path: Option<String>,
}

impl Parameters {
    /// `args[0]` is the program name, as in `argv`.
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::try_parse_from(args)?)
    }
}

fn parse_number(s: &str) -> std::result::Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("'{}' is not a number: {}", s, e))
}
