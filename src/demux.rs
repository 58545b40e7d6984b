//! Routes the sections of one PID to table decoders, which are created on demand.
//!
//! The `Demux` knows nothing about particular kinds of table.  When a section arrives for a
//! `(table_id, extension)` pair with no decoder in the chain, the application's
//! [`SubtableFactory`](trait.SubtableFactory.html) is asked to attach one.

use crate::chain::DecoderChain;
use crate::gather::{Gathered, SectionGatherer};
use crate::packet::Packet;
use crate::section::Section;
use log::{debug, error, warn};
use thiserror::Error;

/// Creates and removes the decoders for the tables appearing in a stream of sections.
pub trait SubtableFactory {
    /// Called for the first section seen with a previously unknown key.  The implementation may
    /// attach a decoder for the key (see [`psi::attach()`](../psi/fn.attach.html)), or do
    /// nothing, in which case the section is discarded.
    fn new_subtable(&mut self, chain: &mut DecoderChain, table_id: u8, extension: u16);

    /// Called for every decoder remaining in the chain at `Demux::teardown()`.  The
    /// implementation is expected to detach it.
    fn del_subtable(&mut self, chain: &mut DecoderChain, table_id: u8, extension: u16);
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum DemuxError {
    #[error("{count} table decoders remain after teardown")]
    SubtablesRemain { count: usize },
}

pub struct Demux<F: SubtableFactory> {
    chain: DecoderChain,
    factory: F,
    gatherer: SectionGatherer,
}

impl<F: SubtableFactory> Demux<F> {
    pub fn new(factory: F) -> Demux<F> {
        Demux {
            chain: DecoderChain::new(),
            factory,
            gatherer: SectionGatherer::new(),
        }
    }

    pub fn chain(&self) -> &DecoderChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut DecoderChain {
        &mut self.chain
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// Passes the section to the decoder for its `(table_id, extension)`, first asking the
    /// factory to create one if necessary.  Sections without the long syntax use extension `0`.
    pub fn push_section(&mut self, section: &Section) {
        dispatch(&mut self.chain, &mut self.factory, section);
    }

    /// Takes one 188-byte Transport Stream packet.  All packets given to a `Demux` should belong
    /// to the same PID.
    pub fn push_packet(&mut self, buf: &[u8]) {
        let pk = match Packet::try_new(buf) {
            Some(pk) => pk,
            None => {
                warn!("ignoring invalid packet of {} bytes", buf.len());
                return;
            }
        };
        let Demux {
            gatherer,
            chain,
            factory,
        } = self;
        gatherer.push(&pk, |event| match event {
            Gathered::Discontinuity => mark_discontinuity(chain),
            Gathered::Section(section) => dispatch(chain, factory, &section),
        });
    }

    /// Takes a buffer holding any number of whole packets, stopping at the first packet that
    /// lacks a sync byte.
    pub fn push(&mut self, buf: &[u8]) {
        for (i, pk) in buf.chunks_exact(Packet::SIZE).enumerate() {
            if !Packet::is_sync_byte(pk[0]) {
                warn!(
                    "lost sync; ignoring {} remaining bytes",
                    buf.len() - i * Packet::SIZE
                );
                return;
            }
            self.push_packet(pk);
        }
    }

    /// Flags every decoder in the chain so that its next section is treated as following lost
    /// data.  Decoders created later start out flagged anyway.
    pub fn signal_discontinuity(&mut self) {
        mark_discontinuity(&mut self.chain);
    }

    /// Asks the factory to delete every remaining decoder, returning the factory once the chain
    /// is empty.
    pub fn teardown(mut self) -> Result<F, DemuxError> {
        for (table_id, extension) in self.chain.keys() {
            self.factory
                .del_subtable(&mut self.chain, table_id, extension);
        }
        if !self.chain.is_empty() {
            error!(
                "{} decoders still attached after teardown",
                self.chain.len()
            );
            self.chain.dump();
            return Err(DemuxError::SubtablesRemain {
                count: self.chain.len(),
            });
        }
        Ok(self.factory)
    }
}

fn mark_discontinuity(chain: &mut DecoderChain) {
    for record in chain.iter_mut() {
        record.mark_discontinuity();
    }
}

fn dispatch<F: SubtableFactory>(chain: &mut DecoderChain, factory: &mut F, section: &Section) {
    let table_id = section.table_id();
    let extension = section.extension();
    if chain.get(table_id, extension).is_none() {
        factory.new_subtable(chain, table_id, extension);
    }
    match chain.find_mut(table_id, extension) {
        Some(record) => record.push_section(section),
        None => debug!(
            "no decoder for table_id={:#04x} extension={}, section discarded",
            table_id, extension
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gather::test::{pat_packet, pmt_packet};
    use crate::psi::pmt::{self, PmtTable};
    use crate::psi::{self, pat};
    use assert_matches::assert_matches;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Attaches PAT and PMT decoders, declining everything else
    #[derive(Debug, Default)]
    struct TestFactory {
        pmts: Rc<RefCell<Vec<PmtTable>>>,
        created: Vec<(u8, u16)>,
        deleted: Vec<(u8, u16)>,
        leak: bool,
    }

    impl SubtableFactory for TestFactory {
        fn new_subtable(&mut self, chain: &mut DecoderChain, table_id: u8, extension: u16) {
            match table_id {
                pat::TABLE_ID => {
                    pat::attach(chain, extension, |_| {}).unwrap();
                }
                pmt::TABLE_ID => {
                    let pmts = self.pmts.clone();
                    pmt::attach(chain, extension, move |t| pmts.borrow_mut().push(t)).unwrap();
                }
                _ => return,
            }
            self.created.push((table_id, extension));
        }

        fn del_subtable(&mut self, chain: &mut DecoderChain, table_id: u8, extension: u16) {
            self.deleted.push((table_id, extension));
            if !self.leak {
                psi::detach(chain, table_id, extension).unwrap();
            }
        }
    }

    fn with_cc(mut pk: [u8; Packet::SIZE], cc: u8) -> [u8; Packet::SIZE] {
        pk[3] = (pk[3] & 0xf0) | cc;
        pk
    }

    #[test]
    fn factory_creates_decoders() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut demux = Demux::new(TestFactory::default());
        demux.push_packet(&pmt_packet());
        assert_eq!(demux.factory().created, vec![(pmt::TABLE_ID, 12)]);
        assert_eq!(demux.chain().keys(), vec![(pmt::TABLE_ID, 12)]);
        {
            let pmts = demux.factory().pmts.borrow();
            assert_eq!(pmts.len(), 1);
            assert_eq!(pmts[0].program_number(), 12);
            assert_eq!(pmts[0].streams.len(), 1);
        }
        // repetition goes to the existing decoder, and is not delivered again
        demux.push_packet(&with_cc(pmt_packet(), 1));
        assert_eq!(demux.factory().created.len(), 1);
        assert_eq!(demux.factory().pmts.borrow().len(), 1);

        let factory = demux.teardown().unwrap();
        assert_eq!(factory.deleted, vec![(pmt::TABLE_ID, 12)]);
    }

    #[test]
    fn separate_pids_need_separate_demuxes() {
        let mut pat_demux = Demux::new(TestFactory::default());
        pat_demux.push_packet(&pat_packet());
        assert_eq!(pat_demux.chain().keys(), vec![(pat::TABLE_ID, 1)]);
        let mut pmt_demux = Demux::new(TestFactory::default());
        pmt_demux.push_packet(&pmt_packet());
        assert_eq!(pmt_demux.chain().keys(), vec![(pmt::TABLE_ID, 12)]);
    }

    #[test]
    fn discontinuity_redelivers() {
        let mut demux = Demux::new(TestFactory::default());
        demux.push_packet(&pmt_packet());
        demux.push_packet(&with_cc(pmt_packet(), 5));
        assert_eq!(demux.factory().pmts.borrow().len(), 2);

        // as does an explicit signal, for sections pushed directly
        let section = Section::from_bytes(&pmt_packet()[5..128]).unwrap();
        demux.push_section(&section);
        assert_eq!(demux.factory().pmts.borrow().len(), 2);
        demux.signal_discontinuity();
        demux.push_section(&section);
        assert_eq!(demux.factory().pmts.borrow().len(), 3);
    }

    #[test]
    fn declined_tables_are_discarded() {
        let mut demux = Demux::new(TestFactory::default());
        let mut table = PmtTable::new(1, 0, true, crate::packet::Pid::new(0x100));
        table.add_stream(0x1b, crate::packet::Pid::new(0x101));
        let mut section = table.generate_sections().unwrap().remove(0);
        demux.push_section(&section);
        assert_eq!(demux.chain().len(), 1);

        section = crate::section::test_section(0x4a, 1, 0, true, 0, 0, &[0xf0, 0, 0xf0, 0]);
        demux.push_section(&section);
        demux.push_section(&section);
        assert_eq!(demux.chain().len(), 1);
        assert_eq!(demux.factory().created, vec![(pmt::TABLE_ID, 1)]);
    }

    #[test]
    fn push_many_packets() {
        let mut demux = Demux::new(TestFactory::default());
        let mut buf = vec![];
        for cc in 0..4 {
            buf.extend_from_slice(&with_cc(pmt_packet(), cc));
        }
        // a trailing partial packet is ignored
        buf.extend_from_slice(&[0x47, 0x42, 0x12]);
        demux.push(&buf);
        assert_eq!(demux.factory().pmts.borrow().len(), 1);
        assert!(demux.factory().pmts.borrow()[0].header.complete);
    }

    #[test]
    fn invalid_packet_ignored() {
        let mut demux = Demux::new(TestFactory::default());
        let mut pk = pmt_packet();
        pk[0] = 0x48;
        demux.push_packet(&pk);
        demux.push_packet(&pmt_packet()[..100]);
        assert!(demux.chain().is_empty());
    }

    #[test]
    fn teardown_with_remaining_decoders() {
        let mut demux = Demux::new(TestFactory {
            leak: true,
            ..TestFactory::default()
        });
        demux.push_packet(&pat_packet());
        assert_matches!(
            demux.teardown(),
            Err(DemuxError::SubtablesRemain { count: 1 })
        );
    }

    #[test]
    fn teardown_empty() {
        let demux = Demux::new(TestFactory::default());
        let factory = demux.teardown().unwrap();
        assert!(factory.deleted.is_empty());
    }
}
