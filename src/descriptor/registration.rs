//! Registration descriptor indicates which kind of syntax any 'private data' within the transport
//! stream will be following

use super::DescriptorCodec;
use super::DescriptorError;
use smptera_format_identifiers_rust::FormatIdentifier;

/// Indicates which kind of syntax any 'private data' within the transport stream will be following
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationDescriptor {
    /// the four byte `format_identifier` assigned by a _Registration Authority_
    pub identifier: [u8; 4],
    /// additional_identification_info bytes, whose meaning is defined by `identifier`
    pub additional_identification_info: Vec<u8>,
}
impl RegistrationDescriptor {
    /// Format identifier value assigned by a _Registration Authority_.
    pub fn format_identifier(&self) -> FormatIdentifier {
        FormatIdentifier::from(&self.identifier[..])
    }
}

impl DescriptorCodec for RegistrationDescriptor {
    const TAG: u8 = 5;

    fn decode(buf: &[u8]) -> Result<Self, DescriptorError> {
        if buf.len() < 4 {
            Err(DescriptorError::NotEnoughData {
                tag: Self::TAG,
                actual: buf.len(),
                expected: 4,
            })
        } else {
            Ok(RegistrationDescriptor {
                identifier: [buf[0], buf[1], buf[2], buf[3]],
                additional_identification_info: buf[4..].to_vec(),
            })
        }
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), DescriptorError> {
        out.extend_from_slice(&self.identifier);
        out.extend_from_slice(&self.additional_identification_info);
        Ok(())
    }
}
