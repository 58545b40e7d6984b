//! DVB _transport_stream_descriptor_, whose content is always the ASCII bytes `"DVB"`

use super::descriptor_len;
use super::DescriptorCodec;
use super::DescriptorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStreamDescriptor {
    pub data: [u8; 3],
}
impl TransportStreamDescriptor {
    const DVB: [u8; 3] = *b"DVB";
}
impl Default for TransportStreamDescriptor {
    fn default() -> Self {
        TransportStreamDescriptor { data: Self::DVB }
    }
}

impl DescriptorCodec for TransportStreamDescriptor {
    const TAG: u8 = 0x67;

    fn decode(buf: &[u8]) -> Result<Self, DescriptorError> {
        descriptor_len(buf, Self::TAG, 3)?;
        if buf != &Self::DVB[..] {
            return Err(DescriptorError::InvalidContent {
                tag: Self::TAG,
                reason: "content must be \"DVB\"",
            });
        }
        Ok(TransportStreamDescriptor::default())
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), DescriptorError> {
        if self.data != Self::DVB {
            return Err(DescriptorError::InvalidContent {
                tag: Self::TAG,
                reason: "content must be \"DVB\"",
            });
        }
        out.extend_from_slice(&self.data);
        Ok(())
    }
}
