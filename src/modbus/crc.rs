pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Checks the trailing little-endian CRC of a complete RTU frame.
pub fn frame_crc_is_valid(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let data_len = frame.len() - 2;
    let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    received == crc16_modbus(&frame[..data_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus() {
        // Read one holding register at 0 from slave 1: 01 03 00 00 00 01 84 0A
        let data = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16_modbus(&data), 0x0A84);
    }

    #[test]
    fn test_frame_crc_validation() {
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A];
        assert!(frame_crc_is_valid(&frame));

        let corrupted = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0x84, 0x0A];
        assert!(!frame_crc_is_valid(&corrupted));
        assert!(!frame_crc_is_valid(&[0x01, 0x03]));
    }
}
