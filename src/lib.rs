//! Decoding and generation of MPEG Transport Stream _Program Specific Information_ tables, per
//! the _ISO/IEC 13818-1_ standard, together with the DVB _Bouquet Association Table_ from
//! _ETSI EN 300 468_.
//!
//! # Design principals
//!
//!  * *Push based*.  The caller supplies sections (or 188-byte packets carrying them) and table
//!    decoders call back with complete tables.  Nothing in this crate performs I/O.
//!  * *Many tables at once*.  A single [`Demux`](demux/struct.Demux.html) can route sections to
//!    any number of table decoders, each identified by a `(table_id, table_id_extension)` pair and
//!    created on demand by the embedding application.
//!  * *Versioned delivery*.  Each decoder reassembles multi-section tables and hands over a table
//!    exactly once per version, flagging tables where a section went missing.
//!  * *Symmetric*.  Every decoded table type can be turned back into wire-format sections that
//!    respect the 1024-byte section size limit.
//!
//! # Core types
//!
//! * [`Section`](section/struct.Section.html) holds a single checked PSI section
//! * [`DecoderChain`](chain/struct.DecoderChain.html) is the registry of attached table decoders
//! * [`TableDecoder`](psi/struct.TableDecoder.html) implements table reassembly and versioning
//! * [`SectionGenerator`](section/struct.SectionGenerator.html) packs tables back into sections
//!
//! ```
//! use mpeg2ts_psi::chain::DecoderChain;
//! use mpeg2ts_psi::psi::pmt::{self, PmtTable};
//! use mpeg2ts_psi::packet::Pid;
//!
//! let mut table = PmtTable::new(1, 3, true, Pid::new(0x100));
//! table.add_stream(0x1b, Pid::new(0x101));
//! let sections = table.generate_sections().unwrap();
//!
//! let mut chain = DecoderChain::default();
//! pmt::attach(&mut chain, 1, |pmt: PmtTable| {
//!     assert_eq!(pmt.streams.len(), 1);
//! })
//! .unwrap();
//! for section in &sections {
//!     chain.find_mut(section.table_id(), section.extension()).unwrap().push_section(section);
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, future_incompatible)]

pub mod chain;
pub mod decoder;
pub mod demux;
pub mod descriptor;
pub mod gather;
pub mod packet;
pub mod psi;
pub mod section;
