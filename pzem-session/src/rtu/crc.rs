//! Modbus CRC16 calculation

/// CRC calculation constants
const INITIAL_CRC: u16 = 0xFFFF;
const POLYNOMIAL: u16 = 0xA001; // Bit-reversed 0x8005

/// Precomputed CRC table
static CRC_TABLE: once_cell::sync::Lazy<[u16; 256]> = once_cell::sync::Lazy::new(|| {
    let mut table = [0u16; 256];
    for b in 0..=0xFF {
        let mut v = b as u16;
        for _ in 0..8 {
            if (v & 1) == 1 {
                v = (v >> 1) ^ POLYNOMIAL;
            } else {
                v >>= 1;
            }
        }
        table[b as usize] = v;
    }
    table
});

/// Incremental Modbus CRC16 calculator
#[derive(Debug, Clone)]
pub struct Crc16 {
    value: u16,
}

impl Crc16 {
    pub fn new() -> Self {
        Self { value: INITIAL_CRC }
    }

    /// Reset the CRC value to initial state
    pub fn reset(&mut self) {
        self.value = INITIAL_CRC;
    }

    /// Update the CRC value with a single byte
    pub fn update(&mut self, data: u8) {
        self.value = (self.value >> 8) ^ CRC_TABLE[((self.value ^ data as u16) & 0xFF) as usize];
    }

    /// Update the CRC value with multiple bytes
    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    /// CRC as transmitted on the wire (low byte first)
    pub fn value_bytes(&self) -> [u8; 2] {
        self.value.to_le_bytes()
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// Modbus CRC16 over `data`
pub fn crc16(data: &[u8]) -> u16 {
    let mut calc = Crc16::new();
    calc.update_bytes(data);
    calc.value()
}

/// Check the trailing little-endian CRC of a complete frame
///
/// Frames shorter than the CRC itself are never valid.
pub fn validate(frame: &[u8]) -> bool {
    match split_crc(frame) {
        Some((body, received)) => crc16(body) == received,
        None => false,
    }
}

/// Split a frame into its covered bytes and the CRC it carries
pub(crate) fn split_crc(frame: &[u8]) -> Option<(&[u8], u16)> {
    if frame.len() < 2 {
        return None;
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    Some((body, u16::from_le_bytes([tail[0], tail[1]])))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bitwise reference implementation of the Modbus CRC
    fn crc16_bitwise(data: &[u8]) -> u16 {
        let mut crc = 0xFFFFu16;
        for &byte in data {
            crc ^= byte as u16;
            for _ in 0..8 {
                if crc & 0x0001 != 0 {
                    crc = (crc >> 1) ^ 0xA001;
                } else {
                    crc >>= 1;
                }
            }
        }
        crc
    }

    #[test]
    fn test_known_frames() {
        // Read 10 input registers from the general address
        assert_eq!(crc16(&[0xF8, 0x04, 0x00, 0x00, 0x00, 0x0A]).to_le_bytes(), [0x64, 0x64]);
        // Classic Modbus reference: read 1 holding register at 0 from slave 1
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]).to_le_bytes(), [0x84, 0x0A]);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_table_matches_bitwise() {
        let data: Vec<u8> = (0u8..=255).collect();
        for len in [1, 2, 7, 64, 256] {
            assert_eq!(crc16(&data[..len]), crc16_bitwise(&data[..len]));
        }
    }

    #[test]
    fn test_validate_round_trip() {
        for len in 0..=64 {
            let frame = with_crc(&pattern(len));
            assert!(validate(&frame), "length {} failed", len);
        }
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let mut bodies = vec![vec![0xF8u8, 0x06, 0x00, 0x01, 0x03, 0xE8], vec![0xF8, 0x42]];
        bodies.extend([1, 7, 23, 64].map(pattern));

        for body in bodies {
            let frame = with_crc(&body);
            for byte in 0..frame.len() {
                for bit in 0..8 {
                    let mut damaged = frame.clone();
                    damaged[byte] ^= 1 << bit;
                    assert!(
                        !validate(&damaged),
                        "flip of byte {} bit {} in {} byte frame went unnoticed",
                        byte,
                        bit,
                        frame.len()
                    );
                }
            }
        }
    }

    /// Deterministic filler bytes of length `len`
    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(37).wrapping_add(11)).collect()
    }

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc16(body).to_le_bytes());
        frame
    }

    #[test]
    fn test_short_frames_invalid() {
        assert!(!validate(&[]));
        assert!(!validate(&[0xFF]));
    }

    #[test]
    fn test_incremental_reset() {
        let mut calc = Crc16::new();
        calc.update(0x01);
        calc.reset();
        assert_eq!(calc.value(), INITIAL_CRC);
        calc.update_bytes(&[0xF8, 0x42]);
        assert_eq!(calc.value(), crc16(&[0xF8, 0x42]));
        assert_eq!(calc.value_bytes(), crc16(&[0xF8, 0x42]).to_le_bytes());
    }
}
