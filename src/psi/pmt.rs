//! Types related to the _Program Map Table_

use super::{AttachError, PsiTable, TableHeader};
use crate::chain::{DecoderChain, DecoderHandle};
use crate::decoder::DecoderRecord;
use crate::descriptor::{read_descriptors, Descriptor};
use crate::packet::Pid;
use crate::section::{GenerateError, Section, SectionGenerator};
use log::warn;

/// The `table_id` of _Program Map Table_ sections
pub const TABLE_ID: u8 = 0x02;

/// The _Program Map Table_ gives details of the streams within a particular program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtTable {
    /// `extension` holds the `program_number`
    pub header: TableHeader,
    /// The Pid of packets that will contain the Program Clock Reference for this program
    pub pcr_pid: Pid,
    pub descriptors: Vec<Descriptor>,
    pub streams: Vec<StreamInfo>,
}

impl PmtTable {
    const HEADER_SIZE: usize = 4;
    // offset of program_info_length within each section
    const PROGRAM_INFO_LENGTH_OFFSET: usize = Section::HEADER_SIZE + 2;

    pub fn new(program_number: u16, version: u8, current_next: bool, pcr_pid: Pid) -> PmtTable {
        PmtTable {
            header: TableHeader::new(program_number, version, current_next),
            pcr_pid,
            descriptors: vec![],
            streams: vec![],
        }
    }

    pub fn program_number(&self) -> u16 {
        self.header.extension
    }

    pub fn add_descriptor(&mut self, descriptor: Descriptor) {
        self.descriptors.push(descriptor);
    }

    /// Appends a stream, returning it so that descriptors may be added
    pub fn add_stream(&mut self, stream_type: u8, elementary_pid: Pid) -> &mut StreamInfo {
        self.streams.push(StreamInfo::new(stream_type, elementary_pid));
        let last = self.streams.len() - 1;
        &mut self.streams[last]
    }

    /// Encodes the table into as many sections as are needed.
    ///
    /// Program descriptors that do not fit in the current section continue in the next one.
    /// Each stream is kept whole (with all of its descriptors) within a single section, giving
    /// `GenerateError::ElementTooLarge` if that is impossible.
    pub fn generate_sections(&self) -> Result<Vec<Section>, GenerateError> {
        let pcr_pid = u16::from(self.pcr_pid);
        let mut gen = SectionGenerator::new(
            TABLE_ID,
            self.header.extension,
            self.header.version,
            self.header.current_next,
        )?
        .prefix(&[
            0b1110_0000 | (pcr_pid >> 8) as u8,
            pcr_pid as u8,
            0b1111_0000,
            0,
        ]);

        let mut program_info_length = 0;
        for desc in &self.descriptors {
            let size = desc.encoded_len();
            if !gen.fits(size) {
                if gen.is_fresh() {
                    return Err(GenerateError::DescriptorTooLarge {
                        tag: desc.tag(),
                        size,
                    });
                }
                gen.patch_length_field(Self::PROGRAM_INFO_LENGTH_OFFSET, program_info_length);
                gen.start_section()?;
                program_info_length = 0;
            }
            gen.write_descriptor(desc);
            program_info_length += size;
        }
        gen.patch_length_field(Self::PROGRAM_INFO_LENGTH_OFFSET, program_info_length);

        for stream in &self.streams {
            let size = stream.encoded_len();
            if !gen.fits(size) {
                if !gen.is_fresh() {
                    gen.start_section()?;
                }
                if !gen.fits(size) {
                    return Err(GenerateError::ElementTooLarge {
                        size,
                        available: gen.remaining(),
                    });
                }
            }
            stream.write_to(&mut gen);
        }
        Ok(gen.finish())
    }
}

impl PsiTable for PmtTable {
    const NAME: &'static str = "PMT";
    const MIN_PAYLOAD_LEN: usize = PmtTable::HEADER_SIZE;

    fn accepts_table_id(table_id: u8) -> bool {
        table_id == TABLE_ID
    }

    fn start(header: TableHeader, section: &Section) -> Self {
        let data = section.payload();
        PmtTable {
            header,
            pcr_pid: Pid::from_bytes(data[0], data[1]),
            descriptors: vec![],
            streams: vec![],
        }
    }

    fn append_section(&mut self, section: &Section) {
        let data = section.payload();
        let program_info_length =
            (u16::from(data[2] & 0b0000_1111) << 8 | u16::from(data[3])) as usize;
        let descriptor_end = Self::HEADER_SIZE + program_info_length;
        if descriptor_end > data.len() {
            warn!(
                "program_info_length={} extends beyond end of PMT section (payload {} bytes)",
                program_info_length,
                data.len()
            );
            return;
        }
        read_descriptors(
            &data[Self::HEADER_SIZE..descriptor_end],
            &mut self.descriptors,
            "PMT descriptors",
        );
        let mut buf = &data[descriptor_end..];
        while !buf.is_empty() {
            match StreamInfo::from_bytes(buf) {
                Some((stream_info, info_len)) => {
                    self.streams.push(stream_info);
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

/// Details of a particular elementary stream within a program.
///
///  - `stream_type` gives an indication of the kind of content carried within the stream
///  - The `elementary_pid` property allows us to find Transport Stream packets that belong to the
///    elementary stream
///  - `descriptors` _may_ provide extra metadata describing some of the
///     stream's properties (for example, the streams 'language' might be given in a descriptor; or
///     it might not)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_type: u8,
    pub elementary_pid: Pid,
    pub descriptors: Vec<Descriptor>,
}

impl StreamInfo {
    const HEADER_SIZE: usize = 5;

    pub fn new(stream_type: u8, elementary_pid: Pid) -> StreamInfo {
        StreamInfo {
            stream_type,
            elementary_pid,
            descriptors: vec![],
        }
    }

    pub fn add_descriptor(&mut self, descriptor: Descriptor) -> &mut StreamInfo {
        self.descriptors.push(descriptor);
        self
    }

    fn es_info_length(&self) -> usize {
        self.descriptors.iter().map(Descriptor::encoded_len).sum()
    }

    /// Size of this entry in the stream loop, including all of its descriptors
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.es_info_length()
    }

    fn write_to(&self, gen: &mut SectionGenerator) {
        let pid = u16::from(self.elementary_pid);
        let es_info_length = self.es_info_length();
        gen.write(&[
            self.stream_type,
            0b1110_0000 | (pid >> 8) as u8,
            pid as u8,
            0b1111_0000 | (es_info_length >> 8) as u8,
            es_info_length as u8,
        ]);
        for desc in &self.descriptors {
            gen.write_descriptor(desc);
        }
    }

    fn from_bytes(data: &[u8]) -> Option<(StreamInfo, usize)> {
        if data.len() < Self::HEADER_SIZE {
            warn!(
                "only {} bytes remaining for stream info, at least {} required {:?}",
                data.len(),
                Self::HEADER_SIZE,
                data
            );
            return None;
        }
        let es_info_length = (u16::from(data[3] & 0b0000_1111) << 8 | u16::from(data[4])) as usize;
        let descriptor_end = Self::HEADER_SIZE + es_info_length;
        if descriptor_end > data.len() {
            warn!(
                "PMT section of size {} is not large enough to contain es_info_length of {}",
                data.len(),
                es_info_length
            );
            return None;
        }
        let mut info = StreamInfo::new(data[0], Pid::from_bytes(data[1], data[2]));
        read_descriptors(
            &data[Self::HEADER_SIZE..descriptor_end],
            &mut info.descriptors,
            "PMT stream descriptors",
        );
        Some((info, descriptor_end))
    }
}

/// Attaches a PMT decoder for the given program to the chain
pub fn attach<C>(
    chain: &mut DecoderChain,
    program_number: u16,
    callback: C,
) -> Result<DecoderHandle, AttachError>
where
    C: FnMut(PmtTable) + 'static,
{
    super::attach::<PmtTable, C>(chain, TABLE_ID, program_number, callback)
}

pub fn detach(chain: &mut DecoderChain, program_number: u16) -> Option<DecoderRecord> {
    super::detach(chain, TABLE_ID, program_number)
}
