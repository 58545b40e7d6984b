//! Checked PSI sections, and the generator which packs table content back into sections.
//!
//! Every section starts with the three byte [`SectionCommonHeader`](struct.SectionCommonHeader.html).
//! Sections with `section_syntax_indicator` set (which is all of the tables supported by this
//! crate) follow it with a five byte [`TableSyntaxHeader`](struct.TableSyntaxHeader.html) and
//! end with a CRC-32 covering the whole section.

use crc::{Crc, CRC_32_MPEG_2};
use log::debug;
use std::fmt;
use thiserror::Error;

const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Problems which cause a buffer to be rejected by [`Section::from_bytes()`](struct.Section.html#method.from_bytes)
#[derive(Debug, PartialEq, Eq, Error)]
pub enum SectionError {
    /// The buffer is too short to hold the headers it claims to have
    #[error("{actual} bytes available, at least {expected} required")]
    NotEnoughData { expected: usize, actual: usize },
    /// The `section_length` field disagrees with the size of the buffer
    #[error("section_length {section_length} disagrees with buffer of {actual} bytes")]
    LengthMismatch { section_length: usize, actual: usize },
    /// The section would exceed `Section::MAX_SIZE`
    #[error("section of {size} bytes exceeds the 1024 byte limit")]
    TooLarge { size: usize },
    /// The trailing CRC-32 does not match the section content
    #[error("CRC mismatch in section with table_id {table_id:#04x}")]
    CrcMismatch { table_id: u8 },
    #[error("section_number {section_number} greater than last_section_number {last_section_number}")]
    SectionNumberOutOfRange {
        section_number: u8,
        last_section_number: u8,
    },
}

/// Header common to all PSI sections, whether or not they use the table syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionCommonHeader {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    /// number of bytes in the section following the `section_length` field
    pub section_length: usize,
}

impl SectionCommonHeader {
    /// The fixed size of the header, in bytes
    pub const SIZE: usize = 3;

    /// Panics if the given buffer is not exactly `SIZE` bytes long
    pub fn new(buf: &[u8]) -> SectionCommonHeader {
        assert_eq!(buf.len(), Self::SIZE);
        SectionCommonHeader {
            table_id: buf[0],
            section_syntax_indicator: buf[1] & 0b1000_0000 != 0,
            private_indicator: buf[1] & 0b0100_0000 != 0,
            section_length: ((u16::from(buf[1] & 0b0000_1111) << 8) | u16::from(buf[2])) as usize,
        }
    }
}

/// Header fields present in sections using the 'long' table syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSyntaxHeader {
    /// the `table_id_extension` field, whose meaning depends on the table (e.g. `program_number`
    /// within a PMT)
    pub extension: u16,
    /// five bit version number, changing whenever the table content changes
    pub version: u8,
    /// `true` if the table is applicable now, `false` if it describes the _next_ version
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
}

impl TableSyntaxHeader {
    /// The fixed size of the header, in bytes
    pub const SIZE: usize = 5;

    /// Panics if the given buffer is not exactly `SIZE` bytes long
    pub fn new(buf: &[u8]) -> TableSyntaxHeader {
        assert_eq!(buf.len(), Self::SIZE);
        TableSyntaxHeader {
            extension: u16::from(buf[0]) << 8 | u16::from(buf[1]),
            version: (buf[2] >> 1) & 0b0001_1111,
            current_next: buf[2] & 1 != 0,
            section_number: buf[3],
            last_section_number: buf[4],
        }
    }
}

/// A single, complete PSI section whose length fields and CRC have been checked.
#[derive(Clone, PartialEq, Eq)]
pub struct Section {
    data: Vec<u8>,
    header: SectionCommonHeader,
    syntax: Option<TableSyntaxHeader>,
}

impl Section {
    /// Maximum size of a PSI section, including all headers and the CRC.
    pub const MAX_SIZE: usize = 1024;
    /// Size of the trailing CRC-32.
    pub const CRC_SIZE: usize = 4;
    /// Size of the common header plus the table syntax header.
    pub const HEADER_SIZE: usize = SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE;

    /// Copies and validates a section from the given buffer, which must hold exactly one section.
    pub fn from_bytes(buf: &[u8]) -> Result<Section, SectionError> {
        if buf.len() < SectionCommonHeader::SIZE {
            return Err(SectionError::NotEnoughData {
                expected: SectionCommonHeader::SIZE,
                actual: buf.len(),
            });
        }
        let header = SectionCommonHeader::new(&buf[..SectionCommonHeader::SIZE]);
        let size = SectionCommonHeader::SIZE + header.section_length;
        if size > Self::MAX_SIZE {
            return Err(SectionError::TooLarge { size });
        }
        if buf.len() != size {
            return Err(SectionError::LengthMismatch {
                section_length: header.section_length,
                actual: buf.len(),
            });
        }
        if !header.section_syntax_indicator {
            return Ok(Section {
                data: buf.to_vec(),
                header,
                syntax: None,
            });
        }
        if size < Self::HEADER_SIZE + Self::CRC_SIZE {
            return Err(SectionError::NotEnoughData {
                expected: Self::HEADER_SIZE + Self::CRC_SIZE,
                actual: size,
            });
        }
        let crc_start = size - Self::CRC_SIZE;
        let expected = CRC_MPEG.checksum(&buf[..crc_start]);
        let actual = u32::from_be_bytes([
            buf[crc_start],
            buf[crc_start + 1],
            buf[crc_start + 2],
            buf[crc_start + 3],
        ]);
        if expected != actual {
            return Err(SectionError::CrcMismatch {
                table_id: header.table_id,
            });
        }
        let syntax = TableSyntaxHeader::new(&buf[SectionCommonHeader::SIZE..Self::HEADER_SIZE]);
        if syntax.section_number > syntax.last_section_number {
            return Err(SectionError::SectionNumberOutOfRange {
                section_number: syntax.section_number,
                last_section_number: syntax.last_section_number,
            });
        }
        Ok(Section {
            data: buf.to_vec(),
            header,
            syntax: Some(syntax),
        })
    }

    // for buffers produced by SectionGenerator, which are well formed by construction
    fn from_generated(data: Vec<u8>) -> Section {
        let header = SectionCommonHeader::new(&data[..SectionCommonHeader::SIZE]);
        let syntax = TableSyntaxHeader::new(&data[SectionCommonHeader::SIZE..Self::HEADER_SIZE]);
        Section {
            data,
            header,
            syntax: Some(syntax),
        }
    }

    pub fn table_id(&self) -> u8 {
        self.header.table_id
    }

    pub fn common_header(&self) -> &SectionCommonHeader {
        &self.header
    }

    /// `None` for sections which do not use the table syntax
    pub fn syntax_header(&self) -> Option<&TableSyntaxHeader> {
        self.syntax.as_ref()
    }

    /// The `table_id_extension`, or `0` for sections without a table syntax header.
    pub fn extension(&self) -> u16 {
        self.syntax.map(|s| s.extension).unwrap_or(0)
    }

    /// The table-specific content of the section, excluding headers and CRC.
    pub fn payload(&self) -> &[u8] {
        if self.syntax.is_some() {
            &self.data[Self::HEADER_SIZE..self.data.len() - Self::CRC_SIZE]
        } else {
            &self.data[SectionCommonHeader::SIZE..]
        }
    }

    /// The complete encoded section
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The trailing CRC value, if the section uses the table syntax
    pub fn crc32(&self) -> Option<u32> {
        self.syntax.map(|_| {
            let crc = &self.data[self.data.len() - Self::CRC_SIZE..];
            u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]])
        })
    }
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Section");
        s.field("table_id", &self.header.table_id);
        if let Some(syntax) = &self.syntax {
            s.field("extension", &syntax.extension)
                .field("version", &syntax.version)
                .field("current_next", &syntax.current_next)
                .field("section_number", &syntax.section_number)
                .field("last_section_number", &syntax.last_section_number);
        }
        s.field("payload_len", &self.payload().len()).finish()
    }
}

/// Problems which prevent a table from being turned into sections
#[derive(Debug, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("descriptor with tag {tag:#04x} of {size} bytes cannot fit in an empty section")]
    DescriptorTooLarge { tag: u8, size: usize },
    /// A single table element, together with all of its descriptors, is larger than the space
    /// available in an empty section.  Elements are never split across sections.
    #[error("element of {size} bytes exceeds the {available} bytes available in an empty section")]
    ElementTooLarge { size: usize, available: usize },
    #[error("table would need more than 256 sections")]
    TooManySections,
    #[error("version {0} does not fit in 5 bits")]
    VersionOutOfRange(u8),
}

/// Accumulates table content into sections no larger than `Section::MAX_SIZE`.
///
/// The table-specific code decides where section boundaries fall (via `fits()` and
/// `start_section()`), while the generator takes care of the headers shared by every section.
/// Each section begins with the table's fixed prefix, given to `prefix()`, whose length fields
/// can be rewritten with `patch_length_field()` once the content of that section is known.
///
/// Nothing is visible to the caller until `finish()` succeeds.
#[derive(Debug)]
pub struct SectionGenerator {
    table_id: u8,
    extension: u16,
    version: u8,
    current_next: bool,
    private_indicator: bool,
    prefix: Vec<u8>,
    done: Vec<Vec<u8>>,
    current: Vec<u8>,
}

impl SectionGenerator {
    pub fn new(
        table_id: u8,
        extension: u16,
        version: u8,
        current_next: bool,
    ) -> Result<SectionGenerator, GenerateError> {
        if version > 0b1_1111 {
            return Err(GenerateError::VersionOutOfRange(version));
        }
        Ok(SectionGenerator {
            table_id,
            extension,
            version,
            current_next,
            private_indicator: false,
            prefix: vec![],
            done: vec![],
            current: vec![0; Section::HEADER_SIZE],
        })
    }

    /// Sets the `private_indicator` bit of every generated section (defaults to `false`)
    pub fn private_indicator(mut self, private_indicator: bool) -> SectionGenerator {
        self.private_indicator = private_indicator;
        self
    }

    /// Table-specific bytes which start every section, written to the first section immediately.
    pub fn prefix(mut self, prefix: &[u8]) -> SectionGenerator {
        self.prefix = prefix.to_vec();
        self.current.extend_from_slice(prefix);
        self
    }

    /// Closes the current section and opens a new one, holding just the headers and prefix
    pub fn start_section(&mut self) -> Result<(), GenerateError> {
        if self.done.len() + 1 >= 256 {
            return Err(GenerateError::TooManySections);
        }
        let mut next = Vec::with_capacity(Section::MAX_SIZE);
        next.resize(Section::HEADER_SIZE, 0);
        next.extend_from_slice(&self.prefix);
        self.done.push(std::mem::replace(&mut self.current, next));
        debug!(
            "table_id {:#04x} ext {}: starting section {}",
            self.table_id,
            self.extension,
            self.done.len()
        );
        Ok(())
    }

    /// `true` if the current section holds nothing beyond the headers and prefix
    pub fn is_fresh(&self) -> bool {
        self.current.len() == Section::HEADER_SIZE + self.prefix.len()
    }

    /// Bytes which may still be added to the current section
    pub fn remaining(&self) -> usize {
        (Section::MAX_SIZE - Section::CRC_SIZE).saturating_sub(self.current.len())
    }

    /// `true` if `size` more bytes can be added to the current section
    pub fn fits(&self, size: usize) -> bool {
        self.current.len() + size + Section::CRC_SIZE <= Section::MAX_SIZE
    }

    /// Offset within the current section at which the next byte will be written (equal to the
    /// number of bytes so far, not counting the CRC)
    pub fn position(&self) -> usize {
        self.current.len()
    }

    /// Appends to the current section; the caller must first have checked `fits()`.
    pub fn write(&mut self, data: &[u8]) {
        debug_assert!(self.fits(data.len()));
        self.current.extend_from_slice(data);
    }

    pub fn write_descriptor(&mut self, descriptor: &crate::descriptor::Descriptor) {
        debug_assert!(self.fits(descriptor.encoded_len()));
        descriptor.write_to(&mut self.current);
    }

    /// Writes a 12 bit length value, preceded by four reserved bits, at the given offset within
    /// the current section
    pub fn patch_length_field(&mut self, offset: usize, len: usize) {
        self.current[offset] = 0b1111_0000 | ((len >> 8) as u8 & 0b0000_1111);
        self.current[offset + 1] = len as u8;
    }

    /// Fills in the headers and CRC of every section
    pub fn finish(mut self) -> Vec<Section> {
        self.done.push(self.current);
        let last_section_number = (self.done.len() - 1) as u8;
        let mut result = Vec::with_capacity(self.done.len());
        for (section_number, mut buf) in self.done.into_iter().enumerate() {
            let section_length = buf.len() - SectionCommonHeader::SIZE + Section::CRC_SIZE;
            buf[0] = self.table_id;
            buf[1] = 0b1011_0000
                | if self.private_indicator { 0b0100_0000 } else { 0 }
                | ((section_length >> 8) as u8 & 0b0000_1111);
            buf[2] = section_length as u8;
            buf[3] = (self.extension >> 8) as u8;
            buf[4] = self.extension as u8;
            buf[5] = 0b1100_0000 | self.version << 1 | u8::from(self.current_next);
            buf[6] = section_number as u8;
            buf[7] = last_section_number;
            let crc = CRC_MPEG.checksum(&buf);
            buf.extend_from_slice(&crc.to_be_bytes());
            result.push(Section::from_generated(buf));
        }
        result
    }
}

#[cfg(test)]
pub(crate) fn test_section(
    table_id: u8,
    extension: u16,
    version: u8,
    current_next: bool,
    section_number: u8,
    last_section_number: u8,
    payload: &[u8],
) -> Section {
    let section_length = TableSyntaxHeader::SIZE + payload.len() + Section::CRC_SIZE;
    let mut buf = vec![
        table_id,
        0b1011_0000 | (section_length >> 8) as u8,
        section_length as u8,
        (extension >> 8) as u8,
        extension as u8,
        0b1100_0000 | version << 1 | u8::from(current_next),
        section_number,
        last_section_number,
    ];
    buf.extend_from_slice(payload);
    let crc = CRC_MPEG.checksum(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    Section::from_bytes(&buf).unwrap()
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::*;

    // PAT from a real stream, transport_stream_id 1, program 1 on PID 0x0fff
    const PAT: [u8; 16] = hex!("00b00d0001c100000001efff3690e23d");

    #[test]
    fn parse_pat() {
        let section = Section::from_bytes(&PAT[..]).unwrap();
        assert_eq!(section.table_id(), 0);
        assert_eq!(section.extension(), 1);
        let syntax = section.syntax_header().unwrap();
        assert_eq!(syntax.version, 0);
        assert!(syntax.current_next);
        assert_eq!(section.payload(), &hex!("0001efff")[..]);
        assert_eq!(section.crc32(), Some(0x3690e23d));
    }

    #[test]
    fn corrupt_crc() {
        let mut data = PAT;
        data[10] ^= 1;
        assert_matches!(
            Section::from_bytes(&data[..]),
            Err(SectionError::CrcMismatch { table_id: 0 })
        );
    }

    #[test]
    fn length_mismatch() {
        assert_matches!(
            Section::from_bytes(&PAT[..15]),
            Err(SectionError::LengthMismatch {
                section_length: 13,
                actual: 15
            })
        );
        assert_matches!(
            Section::from_bytes(&PAT[..2]),
            Err(SectionError::NotEnoughData { .. })
        );
    }

    #[test]
    fn too_large() {
        let mut data = vec![0u8; 1100];
        data[0] = 0x02;
        data[1] = 0xb4;
        data[2] = 0x40;
        assert_matches!(
            Section::from_bytes(&data[..]),
            Err(SectionError::TooLarge { size: 1091 })
        );
    }

    #[test]
    fn section_number_beyond_last() {
        let mut gen = SectionGenerator::new(0, 1, 0, true).unwrap();
        gen.write(&[0, 1, 0xe0, 0x10]);
        let mut data = gen.finish().remove(0).as_bytes().to_vec();
        data[6] = 1;
        let crc_start = data.len() - 4;
        let crc = CRC_MPEG.checksum(&data[..crc_start]);
        data[crc_start..].copy_from_slice(&crc.to_be_bytes());
        assert_matches!(
            Section::from_bytes(&data[..]),
            Err(SectionError::SectionNumberOutOfRange {
                section_number: 1,
                last_section_number: 0
            })
        );
    }

    #[test]
    fn private_section_without_syntax() {
        let data = hex!("7000051122334455");
        let section = Section::from_bytes(&data[..]).unwrap();
        assert_eq!(section.extension(), 0);
        assert!(section.syntax_header().is_none());
        assert_eq!(section.payload(), &hex!("1122334455")[..]);
        assert_eq!(section.crc32(), None);
    }

    #[test]
    fn generator_matches_known_section() {
        let mut gen = SectionGenerator::new(0, 1, 0, true).unwrap();
        gen.write(&hex!("0001efff"));
        let sections = gen.finish();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].as_bytes(), &PAT[..]);
    }

    #[test]
    fn generator_splits() {
        let mut gen = SectionGenerator::new(0x42, 7, 3, false)
            .unwrap()
            .private_indicator(true)
            .prefix(&[0xf0, 0x00]);
        assert!(gen.is_fresh());
        let chunk = [0xaa; 500];
        for _ in 0..5 {
            if !gen.fits(chunk.len()) {
                gen.start_section().unwrap();
            }
            gen.write(&chunk);
        }
        let sections = gen.finish();
        assert_eq!(sections.len(), 3);
        for (i, section) in sections.iter().enumerate() {
            assert!(section.as_bytes().len() <= Section::MAX_SIZE);
            let checked = Section::from_bytes(section.as_bytes()).unwrap();
            let syntax = checked.syntax_header().unwrap();
            assert_eq!(syntax.section_number as usize, i);
            assert_eq!(syntax.last_section_number, 2);
            assert_eq!(syntax.version, 3);
            assert!(!syntax.current_next);
            assert!(checked.common_header().private_indicator);
            assert_eq!(&checked.payload()[..2], &[0xf0, 0x00]);
        }
    }

    #[test]
    fn bad_version() {
        assert_matches!(
            SectionGenerator::new(0, 0, 32, true),
            Err(GenerateError::VersionOutOfRange(32))
        );
    }

    #[test]
    fn too_many_sections() {
        let mut gen = SectionGenerator::new(0, 0, 0, true).unwrap();
        for _ in 0..255 {
            gen.start_section().unwrap();
        }
        assert_matches!(gen.start_section(), Err(GenerateError::TooManySections));
        assert_eq!(gen.finish().len(), 256);
    }
}
