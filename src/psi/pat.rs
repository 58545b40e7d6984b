//! Types related to the _Program Association Table_

use super::{AttachError, PsiTable, TableHeader};
use crate::chain::{DecoderChain, DecoderHandle};
use crate::decoder::DecoderRecord;
use crate::packet::Pid;
use crate::section::{GenerateError, Section, SectionGenerator};
use fixedbitset::FixedBitSet;
use log::warn;

/// The `table_id` of _Program Association Table_ sections
pub const TABLE_ID: u8 = 0x00;

/// One entry in the _Program Association Table_
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramDescriptor {
    /// `program_number` zero gives the PID of the _Network Information Table_
    Network { pid: Pid },
    Program { program_number: u16, pid: Pid },
}

impl ProgramDescriptor {
    const SIZE: usize = 4;

    /// panics if fewer than 4 bytes are provided
    pub fn from_bytes(data: &[u8]) -> ProgramDescriptor {
        let program_number = (u16::from(data[0]) << 8) | u16::from(data[1]);
        let pid = Pid::from_bytes(data[2], data[3]);
        if program_number == 0 {
            ProgramDescriptor::Network { pid }
        } else {
            ProgramDescriptor::Program {
                program_number,
                pid,
            }
        }
    }

    pub fn pid(&self) -> Pid {
        match *self {
            ProgramDescriptor::Network { pid } => pid,
            ProgramDescriptor::Program { pid, .. } => pid,
        }
    }

    pub fn program_number(&self) -> u16 {
        match *self {
            ProgramDescriptor::Network { .. } => 0,
            ProgramDescriptor::Program { program_number, .. } => program_number,
        }
    }

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let program_number = self.program_number();
        let pid = u16::from(self.pid());
        [
            (program_number >> 8) as u8,
            program_number as u8,
            0b1110_0000 | (pid >> 8) as u8,
            pid as u8,
        ]
    }
}

/// The _Program Association Table_ gives details of the programs within a transport stream.
/// There may be only one program, or in the case of a broadcast multiplex, there may be many.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatTable {
    /// `extension` holds the `transport_stream_id`
    pub header: TableHeader,
    pub programs: Vec<ProgramDescriptor>,
}

impl PatTable {
    /// The most program entries that fit in one section
    pub const MAX_PROGRAMS_PER_SECTION: usize =
        (Section::MAX_SIZE - Section::HEADER_SIZE - Section::CRC_SIZE) / ProgramDescriptor::SIZE;

    pub fn new(transport_stream_id: u16, version: u8, current_next: bool) -> PatTable {
        PatTable {
            header: TableHeader::new(transport_stream_id, version, current_next),
            programs: vec![],
        }
    }

    pub fn transport_stream_id(&self) -> u16 {
        self.header.extension
    }

    /// Adds an entry; `program_number` zero gives the network PID
    pub fn add_program(&mut self, program_number: u16, pid: Pid) {
        self.programs.push(if program_number == 0 {
            ProgramDescriptor::Network { pid }
        } else {
            ProgramDescriptor::Program {
                program_number,
                pid,
            }
        });
    }

    pub fn generate_sections(&self) -> Result<Vec<Section>, GenerateError> {
        self.generate_sections_with_limit(Self::MAX_PROGRAMS_PER_SECTION)
    }

    /// Like `generate_sections()`, but placing at most `max_programs` entries in each section.
    /// The limit is clamped to the range `1..=MAX_PROGRAMS_PER_SECTION`.
    pub fn generate_sections_with_limit(
        &self,
        max_programs: usize,
    ) -> Result<Vec<Section>, GenerateError> {
        let max_programs = max_programs.clamp(1, Self::MAX_PROGRAMS_PER_SECTION);
        let mut gen = SectionGenerator::new(
            TABLE_ID,
            self.header.extension,
            self.header.version,
            self.header.current_next,
        )?;
        let mut in_section = 0;
        for program in &self.programs {
            if in_section == max_programs {
                gen.start_section()?;
                in_section = 0;
            }
            gen.write(&program.to_bytes());
            in_section += 1;
        }
        Ok(gen.finish())
    }
}

impl PsiTable for PatTable {
    const NAME: &'static str = "PAT";
    const MIN_PAYLOAD_LEN: usize = 0;

    fn accepts_table_id(table_id: u8) -> bool {
        table_id == TABLE_ID
    }

    fn start(header: TableHeader, _section: &Section) -> Self {
        PatTable {
            header,
            programs: vec![],
        }
    }

    fn append_section(&mut self, section: &Section) {
        let data = section.payload();
        if data.len() % ProgramDescriptor::SIZE != 0 {
            warn!(
                "PAT payload of {} bytes is not a multiple of {}",
                data.len(),
                ProgramDescriptor::SIZE
            );
        }
        self.programs.extend(
            data.chunks_exact(ProgramDescriptor::SIZE)
                .map(ProgramDescriptor::from_bytes),
        );
    }

    fn header(&self) -> &TableHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut TableHeader {
        &mut self.header
    }
}

pub fn attach<C>(
    chain: &mut DecoderChain,
    transport_stream_id: u16,
    callback: C,
) -> Result<DecoderHandle, AttachError>
where
    C: FnMut(PatTable) + 'static,
{
    super::attach::<PatTable, C>(chain, TABLE_ID, transport_stream_id, callback)
}

pub fn detach(chain: &mut DecoderChain, transport_stream_id: u16) -> Option<DecoderRecord> {
    super::detach(chain, TABLE_ID, transport_stream_id)
}

/// A change to the set of programs announced by successive PATs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramChange {
    /// A PMT for this program is now carried on `pid`
    Insert { program_number: u16, pid: Pid },
    /// The program is no longer announced on `pid`
    Remove { program_number: u16, pid: Pid },
}

/// Compares each new PAT with the previous one, so that PMT decoders can be attached and
/// detached as programs come and go.
pub struct ProgramTracker {
    programs: Vec<(u16, Pid)>,
    pmt_pids: FixedBitSet,
}

impl Default for ProgramTracker {
    fn default() -> ProgramTracker {
        ProgramTracker {
            programs: vec![],
            pmt_pids: FixedBitSet::with_capacity(Pid::PID_COUNT),
        }
    }
}

impl ProgramTracker {
    /// Updates the set of known programs, returning removals before insertions.  A program
    /// which moves to a different PID is reported as removed and then inserted.
    pub fn update(&mut self, pat: &PatTable) -> Vec<ProgramChange> {
        let old = std::mem::take(&mut self.programs);
        self.pmt_pids.clear();
        for program in &pat.programs {
            if let ProgramDescriptor::Program {
                program_number,
                pid,
            } = *program
            {
                self.programs.push((program_number, pid));
                self.pmt_pids.insert(usize::from(pid));
            }
        }
        let mut changes: Vec<ProgramChange> = old
            .iter()
            .filter(|p| !self.programs.contains(p))
            .map(|&(program_number, pid)| ProgramChange::Remove {
                program_number,
                pid,
            })
            .collect();
        changes.extend(
            self.programs
                .iter()
                .filter(|p| !old.contains(p))
                .map(|&(program_number, pid)| ProgramChange::Insert {
                    program_number,
                    pid,
                }),
        );
        changes
    }

    /// `true` if the most recent PAT announced a PMT on the given PID
    pub fn is_pmt_pid(&self, pid: Pid) -> bool {
        self.pmt_pids.contains(usize::from(pid))
    }
}
