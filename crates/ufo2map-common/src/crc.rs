// crc.rs -- Checksum of a compiled map file
//
// 16-bit CCITT CRC (polynomial 0x1021), the same value the runtime
// compares when a client and server check they run the same map.

use crc::{Crc, CRC_16_IBM_3740};

const CRC_CALC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Checksum over the full file contents.
pub fn bsp_checksum(data: &[u8]) -> u16 {
    CRC_CALC.checksum(data)
}
