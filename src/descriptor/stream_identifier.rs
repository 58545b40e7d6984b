//! DVB _stream_identifier_descriptor_, labelling an elementary stream so that it can be referenced
//! from other tables.

use super::descriptor_len;
use super::DescriptorCodec;
use super::DescriptorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamIdentifierDescriptor {
    pub component_tag: u8,
}

impl DescriptorCodec for StreamIdentifierDescriptor {
    const TAG: u8 = 0x52;

    fn decode(buf: &[u8]) -> Result<Self, DescriptorError> {
        descriptor_len(buf, Self::TAG, 1)?;
        Ok(StreamIdentifierDescriptor {
            component_tag: buf[0],
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), DescriptorError> {
        out.push(self.component_tag);
        Ok(())
    }
}
