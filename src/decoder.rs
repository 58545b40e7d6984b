//! The per-table entry in a [`DecoderChain`](../chain/struct.DecoderChain.html).

use crate::section::Section;
use std::fmt;

/// Receives the sections of one `(table_id, extension)` pair.
///
/// Implemented by [`TableDecoder`](../psi/struct.TableDecoder.html) for the tables this crate
/// understands, and for any `FnMut(&Section, bool)` closure, so that applications can handle
/// other tables themselves.  Closures accept every section.
pub trait SectionDecoder {
    /// `discontinuity` is `true` if sections may have been lost since the previous accepted
    /// section.  Returns `false` if the section was rejected without changing any state, in
    /// which case the discontinuity remains pending.
    fn decode_section(&mut self, section: &Section, discontinuity: bool) -> bool;
}

impl<F> SectionDecoder for F
where
    F: FnMut(&Section, bool),
{
    fn decode_section(&mut self, section: &Section, discontinuity: bool) -> bool {
        (self)(section, discontinuity);
        true
    }
}

/// Identity of a table decoder, and the decoder itself.
pub struct DecoderRecord {
    table_id: u8,
    extension: u16,
    discontinuity: bool,
    decoder: Box<dyn SectionDecoder>,
}

impl DecoderRecord {
    pub fn new(table_id: u8, extension: u16, decoder: Box<dyn SectionDecoder>) -> DecoderRecord {
        DecoderRecord {
            table_id,
            extension,
            // nothing is known about sections before the first one seen
            discontinuity: true,
            decoder,
        }
    }

    pub fn table_id(&self) -> u8 {
        self.table_id
    }

    pub fn extension(&self) -> u16 {
        self.extension
    }

    /// The next section pushed will be flagged as following a discontinuity
    pub fn mark_discontinuity(&mut self) {
        self.discontinuity = true;
    }

    /// Passes the section to the decoder.  The discontinuity flag is only cleared once a section
    /// has been accepted.
    pub fn push_section(&mut self, section: &Section) {
        if self.decoder.decode_section(section, self.discontinuity) {
            self.discontinuity = false;
        }
    }
}

impl fmt::Debug for DecoderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderRecord")
            .field("table_id", &self.table_id)
            .field("extension", &self.extension)
            .field("discontinuity", &self.discontinuity)
            .finish()
    }
}
