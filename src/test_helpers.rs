//! Synthetic NTFS structures and an instrumented in-memory device for tests.

use std::cell::{Cell, RefCell};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};

use crate::disk::DeviceOpener;
use crate::mft::attributes::{
    ATTR_ATTRIBUTE_LIST, ATTR_DATA, ATTR_END, ATTR_FILE_NAME, ATTR_INDEX_ALLOCATION, ATTR_INDEX_ROOT,
    ATTR_STANDARD_INFORMATION, NAMESPACE_WIN32, NAMESPACE_WIN32_AND_DOS,
};
use crate::mft::boot::{BootGeometry, NtfsBootSector};
use crate::mft::index::{INDEX_ENTRY_END, INDEX_ENTRY_SUBNODE};
use crate::mft::parser::FIXUP_STRIDE;
use crate::mft::record::FileReference;
use crate::mft::upcase::UPCASE_TABLE_BYTES;

const SECTOR: usize = 512;
const RECORD_SIZE: usize = 1024;
const RECORD_USA_OFFSET: usize = 48;
const INDX_USA_OFFSET: usize = 0x28;
const USN: [u8; 2] = [0x01, 0x00];

/// 2019-04-17T18:40:00Z
pub const SAMPLE_FILETIME: u64 = 132_000_000_000_000_000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `rawstream -s <source> <extra...>`
pub fn args(source: &str, extra: &[&str]) -> Vec<String> {
    let mut v = vec!["rawstream".to_string(), "-s".to_string(), source.to_string()];
    v.extend(extra.iter().map(|s| s.to_string()));
    v
}

pub fn boot_sector(bytes_per_sector: u16, sectors_per_cluster: u8, mft_lcn: u64, record_selector: i8) -> Vec<u8> {
    let mut vbr = vec![0u8; SECTOR];
    vbr[0..3].copy_from_slice(&[0xEB, 0x52, 0x90]);
    vbr[3..11].copy_from_slice(b"NTFS    ");
    LittleEndian::write_u16(&mut vbr[11..13], bytes_per_sector);
    vbr[13] = sectors_per_cluster;
    vbr[21] = 0xF8;
    LittleEndian::write_u64(&mut vbr[40..48], 0x10000);
    LittleEndian::write_u64(&mut vbr[48..56], mft_lcn);
    LittleEndian::write_u64(&mut vbr[56..64], 2);
    vbr[64] = record_selector as u8;
    vbr[68] = -12i8 as u8;
    LittleEndian::write_u64(&mut vbr[72..80], 0x1234_5678_9ABC_DEF0);
    vbr[510] = 0x55;
    vbr[511] = 0xAA;
    vbr
}

/// Moves the last two bytes of every 512-byte stride into the update
/// sequence array at `usa_offset` and stamps the sequence number there.
fn protect(data: &mut [u8], usa_offset: usize) {
    let strides = data.len() / FIXUP_STRIDE;
    data[usa_offset..usa_offset + 2].copy_from_slice(&USN);
    for i in 1..=strides {
        let tail = i * FIXUP_STRIDE - 2;
        let slot = usa_offset + i * 2;
        let saved = [data[tail], data[tail + 1]];
        data[slot..slot + 2].copy_from_slice(&saved);
        data[tail..tail + 2].copy_from_slice(&USN);
    }
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

fn write_name(buf: &mut [u8], at: usize, units: &[u16]) {
    for (i, unit) in units.iter().enumerate() {
        LittleEndian::write_u16(&mut buf[at + i * 2..at + i * 2 + 2], *unit);
    }
}

pub fn resident_attr(type_code: u32, name: &str, value: &[u8]) -> Vec<u8> {
    let name_units: Vec<u16> = name.encode_utf16().collect();
    let value_offset = align8(24 + name_units.len() * 2);
    let len = align8(value_offset + value.len());

    let mut attr = vec![0u8; len];
    LittleEndian::write_u32(&mut attr[0..4], type_code);
    LittleEndian::write_u32(&mut attr[4..8], len as u32);
    attr[9] = name_units.len() as u8;
    LittleEndian::write_u16(&mut attr[10..12], 24);
    LittleEndian::write_u32(&mut attr[16..20], value.len() as u32);
    LittleEndian::write_u16(&mut attr[20..22], value_offset as u16);
    write_name(&mut attr, 24, &name_units);
    attr[value_offset..value_offset + value.len()].copy_from_slice(value);
    attr
}

/// Non-resident attribute with 512-byte clusters. `runs` is the encoded run
/// list, terminator included.
pub fn non_resident_attr(
    type_code: u32,
    name: &str,
    start_vcn: u64,
    clusters: u64,
    data_size: u64,
    initialized_size: u64,
    runs: &[u8],
) -> Vec<u8> {
    let name_units: Vec<u16> = name.encode_utf16().collect();
    let runs_offset = align8(0x40 + name_units.len() * 2);
    let len = align8(runs_offset + runs.len() + 1);

    let mut attr = vec![0u8; len];
    LittleEndian::write_u32(&mut attr[0..4], type_code);
    LittleEndian::write_u32(&mut attr[4..8], len as u32);
    attr[8] = 1;
    attr[9] = name_units.len() as u8;
    LittleEndian::write_u16(&mut attr[10..12], 0x40);
    LittleEndian::write_u64(&mut attr[0x10..0x18], start_vcn);
    LittleEndian::write_u64(&mut attr[0x18..0x20], start_vcn + clusters - 1);
    LittleEndian::write_u16(&mut attr[0x20..0x22], runs_offset as u16);
    LittleEndian::write_u64(&mut attr[0x28..0x30], clusters * SECTOR as u64);
    LittleEndian::write_u64(&mut attr[0x30..0x38], data_size);
    LittleEndian::write_u64(&mut attr[0x38..0x40], initialized_size);
    write_name(&mut attr, 0x40, &name_units);
    attr[runs_offset..runs_offset + runs.len()].copy_from_slice(runs);
    attr
}

pub fn standard_information_value() -> Vec<u8> {
    let mut value = vec![0u8; 72];
    for at in [0, 8, 16, 24] {
        LittleEndian::write_u64(&mut value[at..at + 8], SAMPLE_FILETIME);
    }
    LittleEndian::write_u32(&mut value[32..36], 0x20);
    value
}

pub fn file_name_value(parent: FileReference, name: &str, namespace: u8, logical_size: u64) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let mut value = vec![0u8; 66 + units.len() * 2];
    LittleEndian::write_u64(&mut value[0..8], parent.raw());
    for at in [8, 16, 24, 32] {
        LittleEndian::write_u64(&mut value[at..at + 8], SAMPLE_FILETIME);
    }
    LittleEndian::write_u64(&mut value[40..48], logical_size);
    LittleEndian::write_u64(&mut value[48..56], logical_size);
    value[64] = units.len() as u8;
    value[65] = namespace;
    write_name(&mut value, 66, &units);
    value
}

pub fn attribute_list_entry(type_code: u32, start_vcn: u64, reference: FileReference) -> Vec<u8> {
    let mut entry = vec![0u8; 32];
    LittleEndian::write_u32(&mut entry[0..4], type_code);
    LittleEndian::write_u16(&mut entry[4..6], 32);
    entry[7] = 26;
    LittleEndian::write_u64(&mut entry[8..16], start_vcn);
    LittleEndian::write_u64(&mut entry[16..24], reference.raw());
    entry
}

#[derive(Debug, Clone)]
pub struct RecordSpec {
    pub number: u64,
    pub sequence: u16,
    pub attributes: Vec<Vec<u8>>,
    pub in_use: bool,
    pub directory: bool,
    pub base: FileReference,
}

impl Default for RecordSpec {
    fn default() -> Self {
        Self {
            number: 0,
            sequence: 1,
            attributes: Vec::new(),
            in_use: true,
            directory: false,
            base: FileReference::new(0),
        }
    }
}

/// A 1024-byte FILE record with fixups applied for writing to disk.
pub fn file_record(spec: &RecordSpec) -> Vec<u8> {
    let mut raw = vec![0u8; RECORD_SIZE];
    raw[0..4].copy_from_slice(b"FILE");
    LittleEndian::write_u16(&mut raw[4..6], RECORD_USA_OFFSET as u16);
    LittleEndian::write_u16(&mut raw[6..8], (RECORD_SIZE / FIXUP_STRIDE + 1) as u16);
    LittleEndian::write_u16(&mut raw[16..18], spec.sequence);
    LittleEndian::write_u16(&mut raw[18..20], 1);
    LittleEndian::write_u16(&mut raw[20..22], 56);
    let flags = (spec.in_use as u16) | ((spec.directory as u16) << 1);
    LittleEndian::write_u16(&mut raw[22..24], flags);

    let mut at = 56;
    for attr in &spec.attributes {
        raw[at..at + attr.len()].copy_from_slice(attr);
        at += attr.len();
    }
    LittleEndian::write_u32(&mut raw[at..at + 4], ATTR_END);
    at += 8;
    assert!(at <= RECORD_SIZE, "record {} overflows", spec.number);

    LittleEndian::write_u32(&mut raw[24..28], at as u32);
    LittleEndian::write_u32(&mut raw[28..32], RECORD_SIZE as u32);
    LittleEndian::write_u64(&mut raw[32..40], spec.base.raw());
    LittleEndian::write_u16(&mut raw[40..42], spec.attributes.len() as u16);
    LittleEndian::write_u32(&mut raw[44..48], spec.number as u32);
    protect(&mut raw, RECORD_USA_OFFSET);
    raw
}

#[derive(Debug, Clone)]
pub struct IndexEntrySpec {
    pub name: Option<String>,
    pub reference: FileReference,
    pub subnode: Option<u64>,
}

impl IndexEntrySpec {
    pub fn named(name: &str, reference: FileReference) -> Self {
        Self {
            name: Some(name.to_string()),
            reference,
            subnode: None,
        }
    }

    pub fn end() -> Self {
        Self {
            name: None,
            reference: FileReference::new(0),
            subnode: None,
        }
    }

    pub fn with_subnode(mut self, vcn: u64) -> Self {
        self.subnode = Some(vcn);
        self
    }
}

pub fn index_entry(spec: &IndexEntrySpec) -> Vec<u8> {
    let key = spec
        .name
        .as_deref()
        .map(|name| file_name_value(FileReference::ROOT, name, NAMESPACE_WIN32, 0))
        .unwrap_or_default();
    let mut len = align8(16 + key.len());
    if spec.subnode.is_some() {
        len += 8;
    }

    let mut flags = 0;
    if spec.name.is_none() {
        flags |= INDEX_ENTRY_END;
    }
    if spec.subnode.is_some() {
        flags |= INDEX_ENTRY_SUBNODE;
    }

    let mut entry = vec![0u8; len];
    LittleEndian::write_u64(&mut entry[0..8], spec.reference.raw());
    LittleEndian::write_u16(&mut entry[8..10], len as u16);
    LittleEndian::write_u16(&mut entry[10..12], key.len() as u16);
    LittleEndian::write_u32(&mut entry[12..16], flags);
    entry[16..16 + key.len()].copy_from_slice(&key);
    if let Some(vcn) = spec.subnode {
        LittleEndian::write_u64(&mut entry[len - 8..], vcn);
    }
    entry
}

fn node_entries(entries: &[IndexEntrySpec]) -> (Vec<u8>, u32) {
    let body: Vec<u8> = entries.iter().flat_map(index_entry).collect();
    let has_subnodes = entries.iter().any(|e| e.subnode.is_some());
    (body, has_subnodes as u32)
}

/// `$INDEX_ROOT` value of a `$I30` index.
pub fn index_root_value(block_size: u32, entries: &[IndexEntrySpec]) -> Vec<u8> {
    let (body, node_flags) = node_entries(entries);
    let mut value = vec![0u8; 32 + body.len()];
    LittleEndian::write_u32(&mut value[0..4], ATTR_FILE_NAME);
    LittleEndian::write_u32(&mut value[4..8], 1);
    LittleEndian::write_u32(&mut value[8..12], block_size);
    value[12] = (block_size / SECTOR as u32) as u8;
    LittleEndian::write_u32(&mut value[16..20], 16);
    LittleEndian::write_u32(&mut value[20..24], 16 + body.len() as u32);
    LittleEndian::write_u32(&mut value[24..28], 16 + body.len() as u32);
    LittleEndian::write_u32(&mut value[28..32], node_flags);
    value[32..].copy_from_slice(&body);
    value
}

/// An `INDX` block with fixups applied for writing to disk.
pub fn index_block(block_size: usize, vcn: u64, entries: &[IndexEntrySpec]) -> Vec<u8> {
    let (body, node_flags) = node_entries(entries);
    let usa_count = block_size / FIXUP_STRIDE + 1;
    let entries_start = align8(INDX_USA_OFFSET + usa_count * 2);
    let entries_offset = entries_start - 0x18;

    let mut block = vec![0u8; block_size];
    block[0..4].copy_from_slice(b"INDX");
    LittleEndian::write_u16(&mut block[4..6], INDX_USA_OFFSET as u16);
    LittleEndian::write_u16(&mut block[6..8], usa_count as u16);
    LittleEndian::write_u64(&mut block[16..24], vcn);
    LittleEndian::write_u32(&mut block[0x18..0x1C], entries_offset as u32);
    LittleEndian::write_u32(&mut block[0x1C..0x20], (entries_offset + body.len()) as u32);
    LittleEndian::write_u32(&mut block[0x20..0x24], (block_size - 0x18) as u32);
    LittleEndian::write_u32(&mut block[0x24..0x28], node_flags);
    block[entries_start..entries_start + body.len()].copy_from_slice(&body);
    protect(&mut block, INDX_USA_OFFSET);
    block
}

/// ASCII and Latin-1 letters fold to upper case; everything else maps to itself.
pub fn upcase_bytes() -> Vec<u8> {
    let mut table = Vec::with_capacity(UPCASE_TABLE_BYTES);
    for unit in 0..=u16::MAX {
        let upper = match unit {
            0x61..=0x7A => unit - 0x20,
            0xE0..=0xFE if unit != 0xF7 => unit - 0x20,
            _ => unit,
        };
        table.extend_from_slice(&upper.to_le_bytes());
    }
    table
}

// Sample volume: 512-byte sectors and clusters, 1024-byte records.
pub const UPCASE_BYTES_OK: usize = UPCASE_TABLE_BYTES;
pub const MFT_LCN: u64 = 16;
const MFT_RECORDS: u64 = 24;
pub const UPCASE_LCN: u64 = 64;
pub const DOCS_INDEX_LCN: u64 = 320;
const REPORT_HEAD_LCN: u64 = 400;
pub const REPORT_TAIL_LCN: u64 = 500;
const SPLIT_HEAD_LCN: u64 = 340;
const SPLIT_TAIL_LCN: u64 = 360;
const TOTAL_CLUSTERS: u64 = 503;

pub const DOCS_DIR: u64 = 11;
pub const SMALL_FILE: u64 = 12;
pub const REPORT_FILE: u64 = 13;
pub const NAMED_ONLY_FILE: u64 = 14;
pub const SPLIT_FILE: u64 = 15;
pub const MEMO_FILE: u64 = 16;
pub const SPLIT_FILE_EXTENSION: u64 = 17;

pub const SMALL_FILE_CONTENT: &[u8] = b"hello world";
const REPORT_SIZE: usize = 3000;
const REPORT_INITIALIZED: usize = 2600;

fn report_on_disk() -> Vec<u8> {
    (0..3072usize).map(|i| (i * 7 % 251) as u8).collect()
}

/// What the Report.bin stream reads as: on-disk bytes up to the initialized
/// size, zeros after.
pub fn report_content() -> Vec<u8> {
    let mut content = report_on_disk();
    content.truncate(REPORT_SIZE);
    content[REPORT_INITIALIZED..].iter_mut().for_each(|b| *b = 0);
    content
}

pub fn split_file_content() -> Vec<u8> {
    (0..2048usize).map(|i| (i * 13 % 256) as u8).collect()
}

fn file_ref(number: u64) -> FileReference {
    FileReference::from_parts(number, 1)
}

fn named_record(number: u64, parent: u64, name: &str, mut extra: Vec<Vec<u8>>) -> RecordSpec {
    let mut attributes = vec![
        resident_attr(ATTR_STANDARD_INFORMATION, "", &standard_information_value()),
        resident_attr(ATTR_FILE_NAME, "", &file_name_value(file_ref(parent), name, NAMESPACE_WIN32, 0)),
    ];
    attributes.append(&mut extra);
    RecordSpec {
        number,
        attributes,
        ..RecordSpec::default()
    }
}

pub struct TestImage {
    pub bytes: Vec<u8>,
    pub volume_offset: u64,
}

impl TestImage {
    pub fn geometry(&self) -> BootGeometry {
        let start = self.volume_offset as usize;
        let boot = NtfsBootSector::parse(&self.bytes[start..start + SECTOR]).expect("sample boot sector");
        BootGeometry::derive(&boot)
    }

    /// Same volume behind `gap` leading bytes, like a partition in a disk image.
    pub fn shifted(self, gap: u64) -> Self {
        let mut bytes = vec![0u8; gap as usize];
        bytes.extend(self.bytes);
        Self {
            bytes,
            volume_offset: self.volume_offset + gap,
        }
    }

    /// Overwrites the FILE signature of a catalog record.
    pub fn corrupt_record(&mut self, number: u64) {
        let at = (self.volume_offset + MFT_LCN * SECTOR as u64 + number * RECORD_SIZE as u64) as usize;
        self.bytes[at..at + 4].copy_from_slice(b"JUNK");
    }

    /// Sets the header flags of the first attribute of `type_code` in a
    /// catalog record. Walks headers in the protected on-disk form, so only
    /// attributes in the record's first 510 bytes are reachable.
    pub fn flag_attribute(&mut self, number: u64, type_code: u32, flags: u16) {
        let record = (self.volume_offset + MFT_LCN * SECTOR as u64 + number * RECORD_SIZE as u64) as usize;
        let mut at = record + LittleEndian::read_u16(&self.bytes[record + 20..record + 22]) as usize;
        while LittleEndian::read_u32(&self.bytes[at..at + 4]) != type_code {
            assert_ne!(LittleEndian::read_u32(&self.bytes[at..at + 4]), ATTR_END, "no attribute {:#x}", type_code);
            at += LittleEndian::read_u32(&self.bytes[at + 4..at + 8]) as usize;
        }
        LittleEndian::write_u16(&mut self.bytes[at + 12..at + 14], flags);
    }

    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join("volume.img");
        std::fs::write(&path, &self.bytes).expect("write image");
        path
    }

    fn put(&mut self, lcn: u64, data: &[u8]) {
        let at = (self.volume_offset + lcn * SECTOR as u64) as usize;
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }

    fn put_record(&mut self, spec: &RecordSpec) {
        self.put(MFT_LCN + spec.number * 2, &file_record(spec));
    }
}

/// Builds the sample volume. `upcase_len` is the declared length of the
/// `$UpCase` data.
///
/// ```text
/// \$UpCase          (10)
/// \Docs\            (11) index root + two INDX blocks
/// \Docs\a.txt       (12) resident "hello world" + Zone.Identifier stream
/// \Docs\m.txt       (16) resident "memo"
/// \Docs\Report.bin  (13) two fragments, 3000 bytes, 2600 initialized
/// \named_only.dat   (14) only a named $DATA stream
/// \split.bin        (15) $DATA split into extension record 17
/// ```
pub fn sample_volume(upcase_len: usize) -> TestImage {
    let mut image = TestImage {
        bytes: vec![0u8; (TOTAL_CLUSTERS * SECTOR as u64) as usize],
        volume_offset: 0,
    };

    let mut vbr = boot_sector(512, 1, MFT_LCN, -10);
    LittleEndian::write_u64(&mut vbr[40..48], TOTAL_CLUSTERS);
    image.put(0, &vbr);

    let mft_bytes = MFT_RECORDS * RECORD_SIZE as u64;
    image.put_record(&named_record(
        0,
        5,
        "$MFT",
        vec![non_resident_attr(ATTR_DATA, "", 0, MFT_RECORDS * 2, mft_bytes, mft_bytes, &[0x11, 0x30, 0x10, 0x00])],
    ));

    let root_index = index_root_value(
        4096,
        &[
            IndexEntrySpec::named("$UpCase", file_ref(10)),
            IndexEntrySpec::named("Docs", file_ref(DOCS_DIR)),
            IndexEntrySpec::named("named_only.dat", file_ref(NAMED_ONLY_FILE)),
            IndexEntrySpec::named("split.bin", file_ref(SPLIT_FILE)),
            IndexEntrySpec::end(),
        ],
    );
    image.put_record(&RecordSpec {
        number: 5,
        directory: true,
        attributes: vec![
            resident_attr(ATTR_STANDARD_INFORMATION, "", &standard_information_value()),
            resident_attr(ATTR_FILE_NAME, "", &file_name_value(file_ref(5), ".", NAMESPACE_WIN32_AND_DOS, 0)),
            resident_attr(ATTR_INDEX_ROOT, "$I30", &root_index),
        ],
        ..RecordSpec::default()
    });

    let upcase_clusters = (UPCASE_TABLE_BYTES / SECTOR) as u64;
    image.put_record(&named_record(
        10,
        5,
        "$UpCase",
        vec![non_resident_attr(
            ATTR_DATA,
            "",
            0,
            upcase_clusters,
            upcase_len as u64,
            upcase_len as u64,
            &[0x12, 0x00, 0x01, 0x40, 0x00],
        )],
    ));
    let table = upcase_bytes();
    image.put(UPCASE_LCN, &table[..upcase_len]);

    let docs_index = index_root_value(
        4096,
        &[
            IndexEntrySpec::named("m.txt", file_ref(MEMO_FILE)).with_subnode(0),
            IndexEntrySpec::end().with_subnode(8),
        ],
    );
    let mut docs = named_record(
        DOCS_DIR,
        5,
        "Docs",
        vec![
            resident_attr(ATTR_INDEX_ROOT, "$I30", &docs_index),
            non_resident_attr(ATTR_INDEX_ALLOCATION, "$I30", 0, 16, 8192, 8192, &[0x21, 0x10, 0x40, 0x01, 0x00]),
        ],
    );
    docs.directory = true;
    image.put_record(&docs);
    image.put(
        DOCS_INDEX_LCN,
        &index_block(4096, 0, &[IndexEntrySpec::named("a.txt", file_ref(SMALL_FILE)), IndexEntrySpec::end()]),
    );
    image.put(
        DOCS_INDEX_LCN + 8,
        &index_block(4096, 8, &[IndexEntrySpec::named("Report.bin", file_ref(REPORT_FILE)), IndexEntrySpec::end()]),
    );

    image.put_record(&named_record(
        SMALL_FILE,
        DOCS_DIR,
        "a.txt",
        vec![
            resident_attr(ATTR_DATA, "", SMALL_FILE_CONTENT),
            resident_attr(ATTR_DATA, "Zone.Identifier", b"[ZoneTransfer]\r\nZoneId=3\r\n"),
        ],
    ));
    image.put_record(&named_record(MEMO_FILE, DOCS_DIR, "m.txt", vec![resident_attr(ATTR_DATA, "", b"memo")]));

    // 3 clusters at 400, then 3 clusters at 400 + 100
    image.put_record(&named_record(
        REPORT_FILE,
        DOCS_DIR,
        "Report.bin",
        vec![non_resident_attr(
            ATTR_DATA,
            "",
            0,
            6,
            REPORT_SIZE as u64,
            REPORT_INITIALIZED as u64,
            &[0x21, 0x03, 0x90, 0x01, 0x11, 0x03, 0x64, 0x00],
        )],
    ));
    let report = report_on_disk();
    image.put(REPORT_HEAD_LCN, &report[..1536]);
    image.put(REPORT_TAIL_LCN, &report[1536..]);

    image.put_record(&named_record(
        NAMED_ONLY_FILE,
        5,
        "named_only.dat",
        vec![resident_attr(ATTR_DATA, "alt", b"alternate")],
    ));

    let list: Vec<u8> = [
        attribute_list_entry(ATTR_STANDARD_INFORMATION, 0, file_ref(SPLIT_FILE)),
        attribute_list_entry(ATTR_ATTRIBUTE_LIST, 0, file_ref(SPLIT_FILE)),
        attribute_list_entry(ATTR_FILE_NAME, 0, file_ref(SPLIT_FILE)),
        attribute_list_entry(ATTR_DATA, 0, file_ref(SPLIT_FILE)),
        attribute_list_entry(ATTR_DATA, 2, file_ref(SPLIT_FILE_EXTENSION)),
    ]
    .concat();
    let mut split = named_record(
        SPLIT_FILE,
        5,
        "split.bin",
        vec![non_resident_attr(ATTR_DATA, "", 0, 2, 2048, 2048, &[0x21, 0x02, 0x54, 0x01, 0x00])],
    );
    split.attributes.insert(1, resident_attr(ATTR_ATTRIBUTE_LIST, "", &list));
    image.put_record(&split);
    image.put_record(&RecordSpec {
        number: SPLIT_FILE_EXTENSION,
        base: file_ref(SPLIT_FILE),
        attributes: vec![non_resident_attr(ATTR_DATA, "", 2, 2, 0, 0, &[0x21, 0x02, 0x68, 0x01, 0x00])],
        ..RecordSpec::default()
    });
    let content = split_file_content();
    image.put(SPLIT_HEAD_LCN, &content[..1024]);
    image.put(SPLIT_TAIL_LCN, &content[1024..]);

    image
}

pub const WIDE_FILE: u64 = 7;
const WIDE_CLUSTER: usize = 4096;
const WIDE_MFT_LCN: usize = 4;
const WIDE_INDEX_LCN: usize = 8;
const WIDE_BLOCK: usize = 1024;

/// A volume with 4096-byte clusters and 1024-byte index blocks, so sub-node
/// VCNs count 512-byte units. The root's only key lives in the block at VCN 2,
/// the second block of its single allocation cluster.
pub fn wide_cluster_volume() -> TestImage {
    let mut bytes = vec![0u8; (WIDE_INDEX_LCN + 1) * WIDE_CLUSTER];
    let mut vbr = boot_sector(512, 8, WIDE_MFT_LCN as u64, -10);
    LittleEndian::write_u64(&mut vbr[40..48], (bytes.len() / SECTOR) as u64);
    bytes[..SECTOR].copy_from_slice(&vbr);

    let mut put_record = |spec: &RecordSpec| {
        let at = WIDE_MFT_LCN * WIDE_CLUSTER + spec.number as usize * RECORD_SIZE;
        bytes[at..at + RECORD_SIZE].copy_from_slice(&file_record(spec));
    };

    let mft_bytes = 8 * RECORD_SIZE as u64;
    put_record(&named_record(
        0,
        5,
        "$MFT",
        vec![non_resident_attr(ATTR_DATA, "", 0, 2, mft_bytes, mft_bytes, &[0x11, 0x02, 0x04, 0x00])],
    ));
    let root_index = index_root_value(WIDE_BLOCK as u32, &[IndexEntrySpec::end().with_subnode(2)]);
    put_record(&RecordSpec {
        number: 5,
        directory: true,
        attributes: vec![
            resident_attr(ATTR_FILE_NAME, "", &file_name_value(file_ref(5), ".", NAMESPACE_WIN32_AND_DOS, 0)),
            resident_attr(ATTR_INDEX_ROOT, "$I30", &root_index),
            non_resident_attr(ATTR_INDEX_ALLOCATION, "$I30", 0, 1, 4096, 4096, &[0x11, 0x01, 0x08, 0x00]),
        ],
        ..RecordSpec::default()
    });
    put_record(&named_record(WIDE_FILE, 5, "wide.txt", vec![resident_attr(ATTR_DATA, "", b"wide")]));

    let block = index_block(
        WIDE_BLOCK,
        2,
        &[IndexEntrySpec::named("wide.txt", file_ref(WIDE_FILE)), IndexEntrySpec::end()],
    );
    let at = WIDE_INDEX_LCN * WIDE_CLUSTER + 2 * FIXUP_STRIDE;
    bytes[at..at + WIDE_BLOCK].copy_from_slice(&block);

    TestImage {
        bytes,
        volume_offset: 0,
    }
}

/// In-memory device opener that logs every open and close.
pub struct MemoryOpener {
    image: Vec<u8>,
    events: Rc<RefCell<Vec<String>>>,
    opens: Cell<usize>,
    fail_on: Option<usize>,
}

impl MemoryOpener {
    pub fn new(image: TestImage) -> Self {
        Self {
            image: image.bytes,
            events: Rc::new(RefCell::new(Vec::new())),
            opens: Cell::new(0),
            fail_on: None,
        }
    }

    /// The `nth` open (1-based) fails.
    pub fn failing_open(mut self, nth: usize) -> Self {
        self.fail_on = Some(nth);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl DeviceOpener for MemoryOpener {
    type Device = TrackedDevice;

    fn open_device(&self, _source: &str) -> io::Result<TrackedDevice> {
        let id = self.opens.get() + 1;
        self.opens.set(id);
        if self.fail_on == Some(id) {
            self.events.borrow_mut().push(format!("open {} failed", id));
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "access denied"));
        }
        self.events.borrow_mut().push(format!("open {}", id));
        Ok(TrackedDevice {
            inner: Cursor::new(self.image.clone()),
            id,
            events: Rc::clone(&self.events),
        })
    }
}

pub struct TrackedDevice {
    inner: Cursor<Vec<u8>>,
    id: usize,
    events: Rc<RefCell<Vec<String>>>,
}

impl Read for TrackedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for TrackedDevice {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for TrackedDevice {
    fn drop(&mut self) {
        self.events.borrow_mut().push(format!("close {}", self.id));
    }
}
