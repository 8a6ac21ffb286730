/// CRC-32 trailer for Bluetooth output reports.
///
/// The controller checks a standard reflected CRC-32 (poly 0xEDB88320) computed
/// over a one-byte seed followed by the report bytes. Output reports use seed
/// 0xA2. The checksum sits little-endian in the last four bytes.

pub const SEED_OUTPUT: u8 = 0xA2;

const POLY: u32 = 0xEDB8_8320;

static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut bit = 0;
        while bit < 8 {
            c = if c & 1 == 1 { POLY ^ (c >> 1) } else { c >> 1 };
            bit += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

fn feed(mut crc: u32, bytes: &[u8]) -> u32 {
    for &b in bytes {
        crc = TABLE[((crc ^ b as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc
}

/// CRC-32 of `seed` followed by `data`.
pub fn checksum(seed: u8, data: &[u8]) -> u32 {
    !feed(feed(!0, &[seed]), data)
}

/// Write the checksum of `report[..crc_offset]` into `report[crc_offset..crc_offset + 4]`.
pub fn stamp(seed: u8, report: &mut [u8], crc_offset: usize) {
    let crc = checksum(seed, &report[..crc_offset]);
    report[crc_offset..crc_offset + 4].copy_from_slice(&crc.to_le_bytes());
}

/// True if the trailing four bytes match the checksum of everything before them.
#[cfg(test)]
pub fn validate(seed: u8, report: &[u8]) -> bool {
    let Some(split) = report.len().checked_sub(4) else {
        return false;
    };
    let (data, trailer) = report.split_at(split);
    trailer == checksum(seed, data).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_crc32() {
        // "123456789" without a seed is the standard check value.
        assert_eq!(!feed(!0, b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn seed_changes_the_checksum() {
        assert_ne!(checksum(SEED_OUTPUT, b"report"), checksum(0xA1, b"report"));
    }

    #[test]
    fn stamped_report_validates() {
        let mut buf = [0u8; 12];
        buf[0] = 0x31;
        buf[1] = 0x02;
        buf[2] = 0x0F;
        stamp(SEED_OUTPUT, &mut buf, 8);
        assert!(validate(SEED_OUTPUT, &buf));

        buf[2] = 0x0E;
        assert!(!validate(SEED_OUTPUT, &buf));
    }

    #[test]
    fn short_buffers_never_validate() {
        assert!(!validate(SEED_OUTPUT, &[0x31, 0x02, 0x00]));
    }
}
