//! Describes the maximum bitrate of the stream to which this descriptor is attached, including
//! transport overheads.
//!
//! May be attached an an elementary stream, indicating the max bitrate of that elementary stream,
//! or to the program as a whole.  In both cases it appears in the PMT.

use super::descriptor_len;
use super::DescriptorCodec;
use super::DescriptorError;

/// Describes the max bitrate of an elementary stream or a whole program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaximumBitrateDescriptor {
    /// The maximum bitrate expressed in units of 50 bytes per second (22 bits)
    pub maximum_bitrate: u32,
}
impl MaximumBitrateDescriptor {
    const MAX_VALUE: u32 = 0x3f_ffff;

    /// Convenience method which converts `maximum_bitrate` into a bits-per-second value.
    pub fn maximum_bits_per_second(&self) -> u32 {
        self.maximum_bitrate * 50 * 8
    }
}

impl DescriptorCodec for MaximumBitrateDescriptor {
    const TAG: u8 = 14;

    fn decode(buf: &[u8]) -> Result<Self, DescriptorError> {
        descriptor_len(buf, Self::TAG, 3)?;
        Ok(MaximumBitrateDescriptor {
            maximum_bitrate: u32::from(buf[0] & 0b0011_1111) << 16
                | u32::from(buf[1]) << 8
                | u32::from(buf[2]),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), DescriptorError> {
        if self.maximum_bitrate > Self::MAX_VALUE {
            return Err(DescriptorError::InvalidContent {
                tag: Self::TAG,
                reason: "maximum_bitrate exceeds 22 bits",
            });
        }
        out.push(0b1100_0000 | (self.maximum_bitrate >> 16) as u8);
        out.push((self.maximum_bitrate >> 8) as u8);
        out.push(self.maximum_bitrate as u8);
        Ok(())
    }
}
