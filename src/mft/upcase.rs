use std::cmp::Ordering;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// 65536 two-byte entries.
pub const UPCASE_TABLE_BYTES: usize = 0x20000;

/// The volume's `$UpCase` table: one upper-case code unit per UTF-16 code unit.
#[derive(Clone)]
pub struct UpcaseTable {
    bytes: Box<[u8]>,
}

impl UpcaseTable {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != UPCASE_TABLE_BYTES {
            return Err(Error::metadata(format!(
                "UpCase table is {} bytes, expected {}",
                bytes.len(),
                UPCASE_TABLE_BYTES
            )));
        }
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    pub fn upcase(&self, unit: u16) -> u16 {
        let at = unit as usize * 2;
        LittleEndian::read_u16(&self.bytes[at..at + 2])
    }

    /// NTFS file name collation: ordinal comparison of upcased code units.
    pub fn compare(&self, a: &[u16], b: &[u16]) -> Ordering {
        let upper_a = a.iter().map(|&c| self.upcase(c));
        let upper_b = b.iter().map(|&c| self.upcase(c));
        upper_a.cmp(upper_b)
    }
}

impl std::fmt::Debug for UpcaseTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpcaseTable").field("len", &self.bytes.len()).finish()
    }
}
