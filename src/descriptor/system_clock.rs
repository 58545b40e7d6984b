//! Conveys information about the system clock used to generate timestamps

use super::descriptor_len;
use super::DescriptorCodec;
use super::DescriptorError;

/// The accuracy of the clock is `clock_accuracy_integer * 10^-clock_accuracy_exponent` parts per
/// million.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemClockDescriptor {
    /// `true` if the system clock was derived from an external frequency reference
    pub external_clock_reference_indicator: bool,
    /// 6 bits
    pub clock_accuracy_integer: u8,
    /// 3 bits
    pub clock_accuracy_exponent: u8,
}

impl DescriptorCodec for SystemClockDescriptor {
    const TAG: u8 = 11;

    fn decode(buf: &[u8]) -> Result<Self, DescriptorError> {
        descriptor_len(buf, Self::TAG, 2)?;
        Ok(SystemClockDescriptor {
            external_clock_reference_indicator: buf[0] & 0b1000_0000 != 0,
            clock_accuracy_integer: buf[0] & 0b0011_1111,
            clock_accuracy_exponent: buf[1] >> 5,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), DescriptorError> {
        if self.clock_accuracy_integer > 0b11_1111 || self.clock_accuracy_exponent > 0b111 {
            return Err(DescriptorError::InvalidContent {
                tag: Self::TAG,
                reason: "clock accuracy out of range",
            });
        }
        out.push(
            u8::from(self.external_clock_reference_indicator) << 7
                | 0b0100_0000
                | self.clock_accuracy_integer,
        );
        out.push(self.clock_accuracy_exponent << 5 | 0b0001_1111);
        Ok(())
    }
}
