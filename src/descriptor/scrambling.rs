//! DVB _scrambling_descriptor_, giving the scrambling mode used for a service or its components

use super::descriptor_len;
use super::DescriptorCodec;
use super::DescriptorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScramblingDescriptor {
    /// e.g. `0x01` for DVB-CSA1, `0x10` for DVB-CISSA version 1
    pub scrambling_mode: u8,
}

impl DescriptorCodec for ScramblingDescriptor {
    const TAG: u8 = 0x65;

    fn decode(buf: &[u8]) -> Result<Self, DescriptorError> {
        descriptor_len(buf, Self::TAG, 1)?;
        Ok(ScramblingDescriptor {
            scrambling_mode: buf[0],
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), DescriptorError> {
        out.push(self.scrambling_mode);
        Ok(())
    }
}
