#![no_main]

use libfuzzer_sys::fuzz_target;
use mpeg2ts_psi::chain::DecoderChain;
use mpeg2ts_psi::demux::{Demux, SubtableFactory};
use mpeg2ts_psi::psi::{self, bat, pat, pmt};

struct FuzzFactory;
impl SubtableFactory for FuzzFactory {
    fn new_subtable(&mut self, chain: &mut DecoderChain, table_id: u8, extension: u16) {
        let _ = match table_id {
            pat::TABLE_ID => pat::attach(chain, extension, |_| {}),
            pmt::TABLE_ID => pmt::attach(chain, extension, |t| {
                // exercise regeneration of whatever was decoded
                let _ = t.generate_sections();
            }),
            bat::TABLE_ID => bat::attach(chain, extension, |_| {}),
            _ => return,
        };
    }

    fn del_subtable(&mut self, chain: &mut DecoderChain, table_id: u8, extension: u16) {
        psi::detach(chain, table_id, extension);
    }
}

fuzz_target!(|data: &[u8]| {
    let mut demux = Demux::new(FuzzFactory);
    demux.push(data);
    let _ = demux.teardown();
});
