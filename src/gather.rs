//! Reassembly of PSI sections from the payloads of the Transport Stream packets of a single PID.
//!
//! A section may start part way through a packet (located by the `pointer_field` present when
//! `payload_unit_start_indicator` is set), may span many packets, and several short sections may
//! share one packet.  Bytes of `0xff` following a section are stuffing.

use crate::packet::{ContinuityCounter, Packet};
use crate::section::{Section, SectionCommonHeader};
use log::{debug, warn};
use std::cmp;

/// Events produced by [`SectionGatherer::push()`](struct.SectionGatherer.html#method.push)
#[derive(Debug)]
pub enum Gathered {
    /// Packets were lost, and any partially gathered section has been dropped
    Discontinuity,
    /// A complete section with valid length and CRC
    Section(Section),
}

enum Progress {
    Incomplete,
    /// section complete, having consumed the given number of bytes of input
    Complete(usize),
    Abandoned,
}

/// Accumulates section bytes across packets of one PID.
#[derive(Default)]
pub struct SectionGatherer {
    last_cc: Option<ContinuityCounter>,
    buf: Vec<u8>,
    collecting: bool,
}

impl SectionGatherer {
    pub fn new() -> SectionGatherer {
        SectionGatherer::default()
    }

    /// Forgets any partially gathered section and the last continuity counter value
    pub fn reset(&mut self) {
        self.last_cc = None;
        self.drop_partial();
    }

    fn drop_partial(&mut self) {
        self.buf.clear();
        self.collecting = false;
    }

    /// Takes the payload of the given packet, passing each complete section and any detected
    /// discontinuity to `on_event`.
    pub fn push(&mut self, pk: &Packet<'_>, mut on_event: impl FnMut(Gathered)) {
        let payload = match pk.payload() {
            Some(payload) => payload,
            None => return,
        };
        let cc = pk.continuity_counter();
        if let Some(last) = self.last_cc {
            if cc == last {
                debug!("{:?} duplicate packet, continuity_counter={}", pk.pid(), cc.count());
                return;
            }
            if !cc.follows(last) {
                warn!(
                    "{:?} discontinuity, expected continuity_counter={} got {}",
                    pk.pid(),
                    last.next().count(),
                    cc.count()
                );
                self.drop_partial();
                on_event(Gathered::Discontinuity);
            }
        }
        self.last_cc = Some(cc);

        if pk.payload_unit_start_indicator() {
            let pointer = payload[0] as usize;
            let rest = &payload[1..];
            if pointer > rest.len() {
                warn!(
                    "{:?} pointer_field {} beyond end of payload ({} bytes)",
                    pk.pid(),
                    pointer,
                    rest.len()
                );
                self.drop_partial();
                return;
            }
            let (tail, start) = rest.split_at(pointer);
            if self.collecting {
                match self.append(tail) {
                    Progress::Complete(_) => self.emit(&mut on_event),
                    Progress::Incomplete => {
                        warn!("{:?} section truncated by start of next section", pk.pid());
                    }
                    Progress::Abandoned => {}
                }
                self.drop_partial();
            }
            self.gather_from(start, &mut on_event);
        } else if self.collecting {
            self.gather_from(payload, &mut on_event);
        }
    }

    fn gather_from(&mut self, mut data: &[u8], on_event: &mut impl FnMut(Gathered)) {
        while !data.is_empty() {
            if !self.collecting {
                if data[0] == 0xff {
                    // stuffing
                    break;
                }
                self.collecting = true;
            }
            match self.append(data) {
                Progress::Incomplete => break,
                Progress::Complete(used) => {
                    self.emit(on_event);
                    self.drop_partial();
                    data = &data[used..];
                }
                Progress::Abandoned => {
                    self.drop_partial();
                    break;
                }
            }
        }
    }

    fn append(&mut self, data: &[u8]) -> Progress {
        let mut used = 0;
        if self.buf.len() < SectionCommonHeader::SIZE {
            used = cmp::min(SectionCommonHeader::SIZE - self.buf.len(), data.len());
            self.buf.extend_from_slice(&data[..used]);
            if self.buf.len() < SectionCommonHeader::SIZE {
                return Progress::Incomplete;
            }
        }
        let header = SectionCommonHeader::new(&self.buf[..SectionCommonHeader::SIZE]);
        let total = SectionCommonHeader::SIZE + header.section_length;
        if total > Section::MAX_SIZE {
            warn!(
                "table_id {:#04x} section_length {} too long",
                header.table_id, header.section_length
            );
            return Progress::Abandoned;
        }
        let n = cmp::min(total - self.buf.len(), data.len() - used);
        self.buf.extend_from_slice(&data[used..used + n]);
        used += n;
        if self.buf.len() == total {
            Progress::Complete(used)
        } else {
            Progress::Incomplete
        }
    }

    fn emit(&mut self, on_event: &mut impl FnMut(Gathered)) {
        match Section::from_bytes(&self.buf) {
            Ok(section) => on_event(Gathered::Section(section)),
            Err(e) => warn!("dropping section: {}", e),
        }
    }
}
