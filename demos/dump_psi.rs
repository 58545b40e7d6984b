use hex_slice::AsHex;
use mpeg2ts_psi::chain::DecoderChain;
use mpeg2ts_psi::demux::{Demux, SubtableFactory};
use mpeg2ts_psi::descriptor::Descriptor;
use mpeg2ts_psi::packet::{Packet, Pid};
use mpeg2ts_psi::psi::bat::{self, BatTable};
use mpeg2ts_psi::psi::pat::{self, PatTable, ProgramChange, ProgramTracker};
use mpeg2ts_psi::psi::pmt::{self, PmtTable};
use mpeg2ts_psi::psi;
use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::Read;
use std::rc::Rc;

// Creates decoders for the three kinds of table this tool understands, whatever PID they turn up
// on.  PATs are queued rather than printed, since they change which PIDs we listen to.
#[derive(Clone, Default)]
struct DumpFactory {
    pats: Rc<RefCell<Vec<PatTable>>>,
}

impl SubtableFactory for DumpFactory {
    fn new_subtable(&mut self, chain: &mut DecoderChain, table_id: u8, extension: u16) {
        let res = match table_id {
            pat::TABLE_ID => {
                let pats = self.pats.clone();
                pat::attach(chain, extension, move |t| pats.borrow_mut().push(t))
            }
            pmt::TABLE_ID => pmt::attach(chain, extension, print_pmt),
            bat::TABLE_ID => bat::attach(chain, extension, print_bat),
            // e.g. SDT sections, which share the BAT PID
            _ => return,
        };
        if let Err(e) = res {
            log::warn!("{}", e);
        }
    }

    fn del_subtable(&mut self, chain: &mut DecoderChain, table_id: u8, extension: u16) {
        psi::detach(chain, table_id, extension);
    }
}

fn print_descriptors(indent: &str, descriptors: &[Descriptor]) {
    for desc in descriptors {
        match desc.decoded() {
            Ok(decoded) => println!("{}{:?}", indent, decoded),
            Err(_) => println!(
                "{}tag={:#04x} {:02x}",
                indent,
                desc.tag(),
                desc.payload().plain_hex(false)
            ),
        }
    }
}

fn print_pmt(pmt: PmtTable) {
    println!(
        "PMT program_number={} version={} current_next={} complete={} pcr_pid={:?}",
        pmt.program_number(),
        pmt.header.version,
        pmt.header.current_next,
        pmt.header.complete,
        pmt.pcr_pid
    );
    print_descriptors("  ", &pmt.descriptors);
    for stream in &pmt.streams {
        println!(
            "  stream_type={:#04x} elementary_pid={:?}",
            stream.stream_type, stream.elementary_pid
        );
        print_descriptors("    ", &stream.descriptors);
    }
}

fn print_bat(bat: BatTable) {
    println!(
        "BAT bouquet_id={} version={} complete={}",
        bat.bouquet_id(),
        bat.header.version,
        bat.header.complete
    );
    print_descriptors("  ", &bat.descriptors);
    for ts in &bat.transport_streams {
        println!(
            "  transport_stream_id={} original_network_id={}",
            ts.transport_stream_id, ts.original_network_id
        );
        print_descriptors("    ", &ts.descriptors);
    }
}

struct Dumper {
    factory: DumpFactory,
    pat_demux: Demux<DumpFactory>,
    bat_demux: Demux<DumpFactory>,
    pmt_demuxes: HashMap<Pid, Demux<DumpFactory>>,
    tracker: ProgramTracker,
}

impl Dumper {
    fn new() -> Dumper {
        let factory = DumpFactory::default();
        Dumper {
            pat_demux: Demux::new(factory.clone()),
            bat_demux: Demux::new(factory.clone()),
            pmt_demuxes: HashMap::new(),
            tracker: ProgramTracker::default(),
            factory,
        }
    }

    fn push(&mut self, buf: &[u8]) {
        let pk = match Packet::try_new(buf) {
            Some(pk) => pk,
            None => return,
        };
        let pid = pk.pid();
        if pid == Pid::PAT {
            self.pat_demux.push_packet(buf);
            self.update_programs();
        } else if pid == Pid::BAT {
            self.bat_demux.push_packet(buf);
        } else if let Some(demux) = self.pmt_demuxes.get_mut(&pid) {
            demux.push_packet(buf);
        }
    }

    fn update_programs(&mut self) {
        let pats: Vec<PatTable> = self.factory.pats.borrow_mut().drain(..).collect();
        for pat in pats {
            println!(
                "PAT transport_stream_id={} version={} complete={}",
                pat.transport_stream_id(),
                pat.header.version,
                pat.header.complete
            );
            for program in &pat.programs {
                println!(
                    "  program_number={} pid={:?}",
                    program.program_number(),
                    program.pid()
                );
            }
            for change in self.tracker.update(&pat) {
                match change {
                    ProgramChange::Remove { pid, .. } => {
                        // the PID may still carry the PMT of another program
                        if !self.tracker.is_pmt_pid(pid) {
                            if let Some(demux) = self.pmt_demuxes.remove(&pid) {
                                if let Err(e) = demux.teardown() {
                                    log::error!("{:?}: {}", pid, e);
                                }
                            }
                        }
                    }
                    ProgramChange::Insert { pid, .. } => {
                        let factory = self.factory.clone();
                        self.pmt_demuxes
                            .entry(pid)
                            .or_insert_with(|| Demux::new(factory));
                    }
                }
            }
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // open input file named on command line,
    let name = env::args().nth(1).unwrap();
    let mut f = File::open(&name).unwrap_or_else(|_| panic!("file not found: {}", &name));

    let mut dumper = Dumper::new();
    let mut buf = vec![0u8; Packet::SIZE * 1024];
    let mut pending = 0;
    loop {
        match f.read(&mut buf[pending..]).expect("read failed") {
            0 => break,
            n => {
                let end = pending + n;
                let whole = end - end % Packet::SIZE;
                for pk in buf[..whole].chunks_exact(Packet::SIZE) {
                    dumper.push(pk);
                }
                // keep any partial packet for the next read
                buf.copy_within(whole..end, 0);
                pending = end - whole;
            }
        }
    }
}
