//! Types related to the DVB _Bouquet Association Table_

use super::{AttachError, PsiTable, TableHeader};
use crate::chain::{DecoderChain, DecoderHandle};
use crate::decoder::DecoderRecord;
use crate::descriptor::{read_descriptors, Descriptor};
use crate::section::{GenerateError, Section, SectionGenerator};
use log::warn;

/// The `table_id` of _Bouquet Association Table_ sections
pub const TABLE_ID: u8 = 0x4a;

/// A _Bouquet Association Table_ lists the transport streams making up a bouquet of services,
/// possibly spread over several networks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatTable {
    /// `extension` holds the `bouquet_id`
    pub header: TableHeader,
    pub descriptors: Vec<Descriptor>,
    pub transport_streams: Vec<TransportStreamInfo>,
}

impl BatTable {
    const LENGTH_FIELD_SIZE: usize = 2;
    const BOUQUET_DESCRIPTORS_LENGTH_OFFSET: usize = Section::HEADER_SIZE;

    pub fn new(bouquet_id: u16, version: u8, current_next: bool) -> BatTable {
        BatTable {
            header: TableHeader::new(bouquet_id, version, current_next),
            descriptors: vec![],
            transport_streams: vec![],
        }
    }

    pub fn bouquet_id(&self) -> u16 {
        self.header.extension
    }

    pub fn add_descriptor(&mut self, descriptor: Descriptor) {
        self.descriptors.push(descriptor);
    }

    /// Appends a transport stream, returning it so that descriptors may be added
    pub fn add_transport_stream(
        &mut self,
        transport_stream_id: u16,
        original_network_id: u16,
    ) -> &mut TransportStreamInfo {
        self.transport_streams.push(TransportStreamInfo::new(
            transport_stream_id,
            original_network_id,
        ));
        let last = self.transport_streams.len() - 1;
        &mut self.transport_streams[last]
    }

    /// Encodes the table into as many sections as are needed.
    ///
    /// Every section carries both loop length fields.  Sections holding only bouquet descriptors
    /// have an empty transport stream loop, and the sections after them an empty descriptor loop.
    pub fn generate_sections(&self) -> Result<Vec<Section>, GenerateError> {
        let mut gen = SectionGenerator::new(
            TABLE_ID,
            self.header.extension,
            self.header.version,
            self.header.current_next,
        )?
        .private_indicator(true)
        .prefix(&[0b1111_0000, 0]);

        let mut bouquet_descriptors_length = 0;
        for desc in &self.descriptors {
            let size = desc.encoded_len();
            // room is kept for the transport_stream_loop_length that closes the section
            if !gen.fits(size + Self::LENGTH_FIELD_SIZE) {
                if gen.is_fresh() {
                    return Err(GenerateError::DescriptorTooLarge {
                        tag: desc.tag(),
                        size,
                    });
                }
                gen.patch_length_field(
                    Self::BOUQUET_DESCRIPTORS_LENGTH_OFFSET,
                    bouquet_descriptors_length,
                );
                gen.write(&[0b1111_0000, 0]);
                gen.start_section()?;
                bouquet_descriptors_length = 0;
            }
            gen.write_descriptor(desc);
            bouquet_descriptors_length += size;
        }
        gen.patch_length_field(
            Self::BOUQUET_DESCRIPTORS_LENGTH_OFFSET,
            bouquet_descriptors_length,
        );

        let mut loop_length_offset = gen.position();
        gen.write(&[0b1111_0000, 0]);
        let mut loop_length = 0;
        for ts in &self.transport_streams {
            let size = ts.encoded_len();
            if !gen.fits(size) {
                if loop_length > 0 || bouquet_descriptors_length > 0 {
                    gen.patch_length_field(loop_length_offset, loop_length);
                    gen.start_section()?;
                    bouquet_descriptors_length = 0;
                    loop_length_offset = gen.position();
                    gen.write(&[0b1111_0000, 0]);
                    loop_length = 0;
                }
                if !gen.fits(size) {
                    return Err(GenerateError::ElementTooLarge {
                        size,
                        available: gen.remaining(),
                    });
                }
            }
            ts.write_to(&mut gen);
            loop_length += size;
        }
        gen.patch_length_field(loop_length_offset, loop_length);
        Ok(gen.finish())
    }
}

fn length_field(hi: u8, lo: u8) -> usize {
    usize::from(hi & 0b0000_1111) << 8 | usize::from(lo)
}

impl PsiTable for BatTable {
    const NAME: &'static str = "BAT";
    const MIN_PAYLOAD_LEN: usize = 2 * BatTable::LENGTH_FIELD_SIZE;

    fn accepts_table_id(table_id: u8) -> bool {
        table_id == TABLE_ID
    }

    fn start(header: TableHeader, _section: &Section) -> Self {
        BatTable {
            header,
            descriptors: vec![],
            transport_streams: vec![],
        }
    }

    fn append_section(&mut self, section: &Section) {
        let data = section.payload();
        let bouquet_descriptors_length = length_field(data[0], data[1]);
        let descriptor_end = Self::LENGTH_FIELD_SIZE + bouquet_descriptors_length;
        if descriptor_end + Self::LENGTH_FIELD_SIZE > data.len() {
            warn!(
                "bouquet_descriptors_length={} extends beyond end of BAT section (payload {} bytes)",
                bouquet_descriptors_length,
                data.len()
            );
            return;
        }
        read_descriptors(
            &data[Self::LENGTH_FIELD_SIZE..descriptor_end],
            &mut self.descriptors,
            "BAT descriptors",
        );
        let loop_length = length_field(data[descriptor_end], data[descriptor_end + 1]);
        let loop_start = descriptor_end + Self::LENGTH_FIELD_SIZE;
        let mut buf = &data[loop_start..];
        if loop_length > buf.len() {
            warn!(
                "transport_stream_loop_length={} but only {} bytes remain in BAT section",
                loop_length,
                buf.len()
            );
        } else {
            buf = &buf[..loop_length];
        }
        while !buf.is_empty() {
            match TransportStreamInfo::from_bytes(buf) {
                Some((info, info_len)) => {
                    self.transport_streams.push(info);
                    buf = &buf[info_len..];
                }
                None => break,
            }
        }
    }

    fn header(&self) -> &TableHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut TableHeader {
        &mut self.header
    }
}

/// One entry in the transport stream loop of a BAT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStreamInfo {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub descriptors: Vec<Descriptor>,
}

impl TransportStreamInfo {
    const HEADER_SIZE: usize = 6;

    pub fn new(transport_stream_id: u16, original_network_id: u16) -> TransportStreamInfo {
        TransportStreamInfo {
            transport_stream_id,
            original_network_id,
            descriptors: vec![],
        }
    }

    pub fn add_descriptor(&mut self, descriptor: Descriptor) -> &mut TransportStreamInfo {
        self.descriptors.push(descriptor);
        self
    }

    fn descriptors_length(&self) -> usize {
        self.descriptors.iter().map(Descriptor::encoded_len).sum()
    }

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.descriptors_length()
    }

    fn write_to(&self, gen: &mut SectionGenerator) {
        let descriptors_length = self.descriptors_length();
        gen.write(&[
            (self.transport_stream_id >> 8) as u8,
            self.transport_stream_id as u8,
            (self.original_network_id >> 8) as u8,
            self.original_network_id as u8,
            0b1111_0000 | (descriptors_length >> 8) as u8,
            descriptors_length as u8,
        ]);
        for desc in &self.descriptors {
            gen.write_descriptor(desc);
        }
    }

    fn from_bytes(data: &[u8]) -> Option<(TransportStreamInfo, usize)> {
        if data.len() < Self::HEADER_SIZE {
            warn!(
                "only {} bytes remaining for transport stream info, at least {} required",
                data.len(),
                Self::HEADER_SIZE
            );
            return None;
        }
        let descriptors_length = length_field(data[4], data[5]);
        let descriptor_end = Self::HEADER_SIZE + descriptors_length;
        if descriptor_end > data.len() {
            warn!(
                "transport_descriptors_length={} exceeds the {} bytes remaining",
                descriptors_length,
                data.len() - Self::HEADER_SIZE
            );
            return None;
        }
        let mut info = TransportStreamInfo::new(
            u16::from(data[0]) << 8 | u16::from(data[1]),
            u16::from(data[2]) << 8 | u16::from(data[3]),
        );
        read_descriptors(
            &data[Self::HEADER_SIZE..descriptor_end],
            &mut info.descriptors,
            "BAT transport stream descriptors",
        );
        Some((info, descriptor_end))
    }
}

pub fn attach<C>(
    chain: &mut DecoderChain,
    bouquet_id: u16,
    callback: C,
) -> Result<DecoderHandle, AttachError>
where
    C: FnMut(BatTable) + 'static,
{
    super::attach::<BatTable, C>(chain, TABLE_ID, bouquet_id, callback)
}

pub fn detach(chain: &mut DecoderChain, bouquet_id: u16) -> Option<DecoderRecord> {
    super::detach(chain, TABLE_ID, bouquet_id)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::descriptor::transport_stream::TransportStreamDescriptor;
    use crate::psi::TableDecoder;
    use crate::section::test_section;
    use assert_matches::assert_matches;
    use hex_literal::*;

    fn decode(sections: &[Section]) -> Vec<BatTable> {
        let mut tables = vec![];
        {
            let ext = sections[0].extension();
            let mut dec = TableDecoder::new(ext, |t: BatTable| tables.push(t));
            for section in sections {
                dec.push_section(section, false);
            }
        }
        tables
    }

    // returns (bouquet_descriptors_length, transport_stream_loop_length, entries)
    fn check_layout(section: &Section) -> (usize, usize, usize) {
        assert_eq!(section.table_id(), TABLE_ID);
        assert!(section.common_header().private_indicator);
        let data = section.payload();
        let bdl = length_field(data[0], data[1]);
        let mut pos = 2 + bdl;
        let tsll = length_field(data[pos], data[pos + 1]);
        pos += 2;
        assert_eq!(pos + tsll, data.len());
        let mut entries = 0;
        while pos < data.len() {
            pos += 6 + length_field(data[pos + 4], data[pos + 5]);
            entries += 1;
        }
        assert_eq!(pos, data.len());
        (bdl, tsll, entries)
    }

    #[test]
    fn decode_section() {
        let payload = hex!(
            "f005 4703616263
             f00e 0001 0002 f000
                  0003 0004 f002 5200"
        );
        let tables = decode(&[test_section(TABLE_ID, 0x1234, 1, true, 0, 0, &payload)]);
        assert_eq!(tables.len(), 1);
        let bat = &tables[0];
        assert_eq!(bat.bouquet_id(), 0x1234);
        assert!(bat.header.complete);
        assert_eq!(bat.descriptors.len(), 1);
        assert_eq!(bat.descriptors[0].tag(), 0x47);
        assert_eq!(bat.descriptors[0].payload(), b"abc");
        assert_eq!(
            bat.transport_streams,
            vec![
                TransportStreamInfo::new(1, 2),
                TransportStreamInfo {
                    transport_stream_id: 3,
                    original_network_id: 4,
                    descriptors: vec![Descriptor::new(0x52, &[]).unwrap()],
                },
            ]
        );
    }

    #[test]
    fn overlong_loop_length() {
        let payload = hex!("f000 f0ff 0001 0002 f000");
        let tables = decode(&[test_section(TABLE_ID, 1, 1, true, 0, 0, &payload)]);
        assert_eq!(tables[0].transport_streams.len(), 1);
    }

    #[test]
    fn round_trip() {
        let mut table = BatTable::new(0x1001, 3, true);
        table.add_descriptor(Descriptor::new(0x47, b"bouquet").unwrap());
        table
            .add_transport_stream(0x10, 0x20)
            .add_descriptor(
                Descriptor::generate(&TransportStreamDescriptor::default(), false).unwrap(),
            );
        table.add_transport_stream(0x11, 0x20);
        let sections = table.generate_sections().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(check_layout(&sections[0]), (9, 17, 2));

        let mut tables = decode(&sections);
        let mut decoded = tables.remove(0);
        assert!(decoded.header.complete);
        decoded.header.complete = false;
        assert_eq!(decoded, table);
    }

    #[test]
    fn transport_streams_split_across_sections() {
        let mut table = BatTable::new(7, 0, true);
        for i in 0..40u16 {
            table
                .add_transport_stream(i, 1)
                .add_descriptor(Descriptor::new(0x41, &[i as u8; 100]).unwrap());
        }
        let sections = table.generate_sections().unwrap();
        // 108 bytes per entry, 9 per section
        assert_eq!(sections.len(), 5);
        let mut entries = 0;
        for section in &sections {
            assert!(section.as_bytes().len() <= Section::MAX_SIZE);
            entries += check_layout(section).2;
        }
        assert_eq!(entries, 40);
        let tables = decode(&sections);
        assert!(tables[0].header.complete);
        assert_eq!(tables[0].transport_streams, table.transport_streams);
    }

    #[test]
    fn bouquet_descriptors_split_across_sections() {
        let mut table = BatTable::new(7, 0, true);
        for i in 0..5 {
            table.add_descriptor(Descriptor::new(0x80 + i, &[i; 250]).unwrap());
        }
        table.add_transport_stream(1, 1);
        let sections = table.generate_sections().unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(check_layout(&sections[0]), (4 * 252, 0, 0));
        assert_eq!(check_layout(&sections[1]), (252, 6, 1));
        let tables = decode(&sections);
        assert_eq!(tables[0].descriptors, table.descriptors);
        assert_eq!(tables[0].transport_streams, table.transport_streams);
    }

    #[test]
    fn element_too_large() {
        let mut table = BatTable::new(7, 0, true);
        {
            let ts = table.add_transport_stream(1, 1);
            for _ in 0..4 {
                ts.add_descriptor(Descriptor::new(0x41, &[0; 255]).unwrap());
            }
        }
        assert_matches!(
            table.generate_sections(),
            Err(GenerateError::ElementTooLarge {
                size: 1034,
                available: 1008
            })
        );
    }

    #[test]
    fn attach_by_bouquet_id() {
        let mut chain = DecoderChain::new();
        attach(&mut chain, 0x1001, |_| {}).unwrap();
        assert!(chain.get(TABLE_ID, 0x1001).is_some());
        assert!(detach(&mut chain, 0x1001).is_some());
        assert!(chain.is_empty());
    }
}
