//! The fingerprint ties every artifact to a schema version; readers refuse
//! files whose prefix does not match byte for byte.

use crc::{Crc, CRC_64_GO_ISO};

pub const FINGERPRINT_LENGTH: usize = 16;

const MAGIC: &[u8; 8] = b"WAYMEXTR";
const VERSION: u16 = 1;

pub fn fingerprint() -> [u8; FINGERPRINT_LENGTH] {
    let mut bytes = [0u8; FINGERPRINT_LENGTH];
    bytes[..8].copy_from_slice(MAGIC);
    bytes[8..10].copy_from_slice(&VERSION.to_le_bytes());
    // bytes 10..12 reserved
    let crc = Crc::<u64>::new(&CRC_64_GO_ISO).checksum(&bytes[..12]);
    bytes[12..16].copy_from_slice(&(crc as u32).to_le_bytes());
    bytes
}
