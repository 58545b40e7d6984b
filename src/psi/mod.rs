//! Types for processing tables of *Program Specific Information* in a transport stream.
//!
//! # Concepts
//!
//! * There are multiple standard types of Program Specific Information, like the *Program
//!   Association Table* and *Program Map Table*.  Standards derived from mpegts (such as DVB) define
//!   their own table types.
//! * A PSI *Table* can split into *Sections*, all sharing the same `table_id`, `extension` and
//!   `version`, and numbered `0` to `last_section_number`.
//! * Tables are repeated periodically within the stream; the `version` changes when the content
//!   does.
//!
//! # Core types
//!
//! * [`PsiTable`](trait.PsiTable.html) is implemented by each kind of table, giving the
//!   table-specific parsing of section payloads
//! * [`TableDecoder`](struct.TableDecoder.html) converts *Sections* into *Tables*, delivering each
//!   version of the table once
//!
//! Note that the specific types of table such as Program Association Table are defined in
//! submodules, with only the generic functionality in this module.

pub mod bat;
pub mod pat;
pub mod pmt;

use crate::chain::{DecoderChain, DecoderHandle};
use crate::decoder::{DecoderRecord, SectionDecoder};
use crate::section::{Section, TableSyntaxHeader};
use log::{debug, trace, warn};
use std::fmt;
use thiserror::Error;

/// The fields common to the header of every kind of table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHeader {
    /// The `table_id_extension` of the table's sections
    pub extension: u16,
    pub version: u8,
    pub current_next: bool,
    /// `true` only if every section of this version of the table was received
    pub complete: bool,
}

impl TableHeader {
    pub fn new(extension: u16, version: u8, current_next: bool) -> TableHeader {
        TableHeader {
            extension,
            version,
            current_next,
            complete: false,
        }
    }
}

impl From<&TableSyntaxHeader> for TableHeader {
    fn from(syntax: &TableSyntaxHeader) -> TableHeader {
        TableHeader::new(syntax.extension, syntax.version, syntax.current_next)
    }
}

/// A kind of table that a [`TableDecoder`](struct.TableDecoder.html) can reassemble from sections.
pub trait PsiTable: Clone + fmt::Debug + 'static {
    /// Name of the table for log messages
    const NAME: &'static str;

    /// Size of the fixed part of the section payload; shorter sections are rejected
    const MIN_PAYLOAD_LEN: usize;

    fn accepts_table_id(table_id: u8) -> bool;

    /// Creates an empty table from the first section received for a new version.  Any
    /// table-level fields carried in the fixed part of the payload are taken from `section`.
    fn start(header: TableHeader, section: &Section) -> Self;

    /// Adds the descriptors and elements from the given section's payload.
    fn append_section(&mut self, section: &Section);

    fn header(&self) -> &TableHeader;

    fn header_mut(&mut self) -> &mut TableHeader;
}

/// Reassembles the sections of one `(table_id, extension)` into tables of type `T`, which are
/// passed to the callback `C`.
///
/// A table is delivered when its last section arrives, even if some earlier section was missed
/// (in which case its `complete` flag is `false`).  Once a complete table has been delivered,
/// later repetitions of the same version are ignored, except that a table first seen with
/// `current_next` unset is delivered again when it becomes current.
pub struct TableDecoder<T, C> {
    extension: u16,
    callback: C,
    current: Option<T>,
    next: Option<T>,
    last_section_number: u8,
    previous_section_number: u8,
    section_lost: bool,
}

impl<T, C> TableDecoder<T, C>
where
    T: PsiTable,
    C: FnMut(T),
{
    pub fn new(extension: u16, callback: C) -> TableDecoder<T, C> {
        TableDecoder {
            extension,
            callback,
            current: None,
            next: None,
            last_section_number: 0,
            previous_section_number: 0,
            section_lost: false,
        }
    }

    /// The most recently delivered table
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Discards both the delivered table and any partially assembled one
    pub fn reinit(&mut self) {
        self.current = None;
        self.next = None;
    }

    fn check(&self, section: &Section) -> Option<TableSyntaxHeader> {
        if !T::accepts_table_id(section.table_id()) {
            warn!(
                "{} decoder: invalid section (table_id == {:#04x})",
                T::NAME,
                section.table_id()
            );
            return None;
        }
        let syntax = match section.syntax_header() {
            Some(syntax) => *syntax,
            None => {
                warn!(
                    "{} decoder: invalid section (section_syntax_indicator == 0)",
                    T::NAME
                );
                return None;
            }
        };
        if syntax.extension != self.extension {
            warn!(
                "{} decoder: extension {} does not match {}",
                T::NAME,
                syntax.extension,
                self.extension
            );
            return None;
        }
        if section.payload().len() < T::MIN_PAYLOAD_LEN {
            warn!(
                "{} decoder: payload of {} bytes too short, at least {} required",
                T::NAME,
                section.payload().len(),
                T::MIN_PAYLOAD_LEN
            );
            return None;
        }
        Some(syntax)
    }

    fn building_error(&self, next: &T, syntax: &TableSyntaxHeader) -> Option<&'static str> {
        if next.header().version != syntax.version {
            Some("'version_number' differs")
        } else if self.last_section_number != syntax.last_section_number {
            Some("'last_section_number' differs")
        } else if syntax.section_number <= self.previous_section_number {
            Some("backward 'section_number'")
        } else {
            None
        }
    }

    /// Returns `false` if the section was rejected, leaving the decoder unchanged.
    pub fn push_section(&mut self, section: &Section, discontinuity: bool) -> bool {
        let syntax = match self.check(section) {
            Some(syntax) => syntax,
            None => return false,
        };
        trace!(
            "{} decoder: version {} extension {} section {} of {} current_next {}",
            T::NAME,
            syntax.version,
            syntax.extension,
            syntax.section_number,
            syntax.last_section_number,
            syntax.current_next
        );

        if discontinuity {
            debug!("{} decoder: reinit after discontinuity", T::NAME);
            self.reinit();
        }

        if let Some(ref next) = self.next {
            if let Some(reason) = self.building_error(next, &syntax) {
                warn!(
                    "{} decoder: {} whereas no discontinuity has occurred",
                    T::NAME,
                    reason
                );
                self.reinit();
            }
        } else if let Some(ref mut current) = self.current {
            if current.header().version == syntax.version && current.header().complete {
                if !current.header().current_next && syntax.current_next {
                    current.header_mut().current_next = true;
                    (self.callback)(current.clone());
                }
                return true;
            }
        }

        let mut next = match self.next.take() {
            None => {
                self.last_section_number = syntax.last_section_number;
                self.section_lost = syntax.section_number != 0;
                T::start(TableHeader::from(&syntax), section)
            }
            Some(next) => {
                if syntax.section_number != self.previous_section_number.wrapping_add(1) {
                    self.section_lost = true;
                }
                next
            }
        };
        self.previous_section_number = syntax.section_number;
        next.append_section(section);

        if syntax.section_number == self.last_section_number {
            next.header_mut().complete = !self.section_lost;
            if self.section_lost {
                debug!(
                    "{} decoder: version {} delivered incomplete",
                    T::NAME,
                    syntax.version
                );
            }
            self.current = Some(next.clone());
            (self.callback)(next);
        } else {
            self.next = Some(next);
        }
        true
    }
}

impl<T, C> SectionDecoder for TableDecoder<T, C>
where
    T: PsiTable,
    C: FnMut(T),
{
    fn decode_section(&mut self, section: &Section, discontinuity: bool) -> bool {
        self.push_section(section, discontinuity)
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("a decoder for table_id {table_id:#04x} extension {extension} is already attached")]
    AlreadyAttached { table_id: u8, extension: u16 },
    #[error("table_id {0:#04x} is not handled by this table type")]
    UnsupportedTableId(u8),
}

/// Adds a decoder for tables of type `T` to the chain, under the key `(table_id, extension)`.
/// The callback receives each table as it is completed.
pub fn attach<T, C>(
    chain: &mut DecoderChain,
    table_id: u8,
    extension: u16,
    callback: C,
) -> Result<DecoderHandle, AttachError>
where
    T: PsiTable,
    C: FnMut(T) + 'static,
{
    if !T::accepts_table_id(table_id) {
        return Err(AttachError::UnsupportedTableId(table_id));
    }
    if chain.get(table_id, extension).is_some() {
        return Err(AttachError::AlreadyAttached {
            table_id,
            extension,
        });
    }
    debug!(
        "attaching {} decoder for table_id={:#04x} extension={}",
        T::NAME,
        table_id,
        extension
    );
    let decoder = TableDecoder::<T, C>::new(extension, callback);
    Ok(chain.add(DecoderRecord::new(
        table_id,
        extension,
        Box::new(decoder),
    )))
}

/// Removes the decoder for `(table_id, extension)` from the chain, if there is one.  Dropping the
/// returned record discards any table it holds.
pub fn detach(chain: &mut DecoderChain, table_id: u8, extension: u16) -> Option<DecoderRecord> {
    let handle = match chain.get(table_id, extension) {
        Some(handle) => handle,
        None => {
            debug!(
                "no decoder for table_id={:#04x} extension={} to detach",
                table_id, extension
            );
            return None;
        }
    };
    chain.remove(handle).ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::section::test_section;
    use assert_matches::assert_matches;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A table whose section payloads are simply lists of bytes
    #[derive(Debug, Clone)]
    struct ByteTable {
        header: TableHeader,
        items: Vec<u8>,
    }
    impl PsiTable for ByteTable {
        const NAME: &'static str = "test";
        const MIN_PAYLOAD_LEN: usize = 1;

        fn accepts_table_id(table_id: u8) -> bool {
            table_id == 0x42
        }
        fn start(header: TableHeader, _section: &Section) -> Self {
            ByteTable {
                header,
                items: vec![],
            }
        }
        fn append_section(&mut self, section: &Section) {
            self.items.extend_from_slice(section.payload());
        }
        fn header(&self) -> &TableHeader {
            &self.header
        }
        fn header_mut(&mut self) -> &mut TableHeader {
            &mut self.header
        }
    }

    type Delivered = Rc<RefCell<Vec<ByteTable>>>;

    fn decoder() -> (TableDecoder<ByteTable, impl FnMut(ByteTable)>, Delivered) {
        let _ = env_logger::builder().is_test(true).try_init();
        let delivered: Delivered = Rc::new(RefCell::new(vec![]));
        let d = delivered.clone();
        let decoder = TableDecoder::new(7, move |t: ByteTable| d.borrow_mut().push(t));
        (decoder, delivered)
    }

    fn section(version: u8, current_next: bool, number: u8, last: u8, item: u8) -> Section {
        test_section(0x42, 7, version, current_next, number, last, &[item])
    }

    #[test]
    fn in_order_completion() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, true, 0, 2, 10), false);
        dec.push_section(&section(1, true, 1, 2, 11), false);
        assert!(delivered.borrow().is_empty());
        dec.push_section(&section(1, true, 2, 2, 12), false);
        let delivered = delivered.borrow();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].header.complete);
        assert_eq!(delivered[0].header.version, 1);
        assert_eq!(delivered[0].header.extension, 7);
        assert_eq!(delivered[0].items, vec![10, 11, 12]);
    }

    #[test]
    fn repetition_not_delivered_twice() {
        let (mut dec, delivered) = decoder();
        for _ in 0..3 {
            dec.push_section(&section(1, true, 0, 1, 10), false);
            dec.push_section(&section(1, true, 1, 1, 11), false);
        }
        assert_eq!(delivered.borrow().len(), 1);
        // a new version is delivered
        dec.push_section(&section(2, true, 0, 0, 20), false);
        assert_eq!(delivered.borrow().len(), 2);
        assert_eq!(dec.current().unwrap().items, vec![20]);
    }

    #[test]
    fn skipped_section() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, true, 0, 2, 10), false);
        dec.push_section(&section(1, true, 2, 2, 12), false);
        let tables = delivered.borrow();
        assert_eq!(tables.len(), 1);
        assert!(!tables[0].header.complete);
        assert_eq!(tables[0].items, vec![10, 12]);
    }

    #[test]
    fn missing_first_section() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, true, 1, 1, 11), false);
        assert_eq!(delivered.borrow().len(), 1);
        assert!(!delivered.borrow()[0].header.complete);
        // an incomplete table is decoded again when its version repeats
        dec.push_section(&section(1, true, 0, 1, 10), false);
        dec.push_section(&section(1, true, 1, 1, 11), false);
        assert_eq!(delivered.borrow().len(), 2);
        assert!(delivered.borrow()[1].header.complete);
    }

    #[test]
    fn lost_flag_is_sticky() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, true, 0, 3, 10), false);
        dec.push_section(&section(1, true, 2, 3, 12), false);
        dec.push_section(&section(1, true, 3, 3, 13), false);
        assert!(!delivered.borrow()[0].header.complete);
    }

    #[test]
    fn version_change_mid_reassembly() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, true, 0, 1, 10), false);
        dec.push_section(&section(2, true, 0, 1, 20), false);
        assert!(delivered.borrow().is_empty());
        dec.push_section(&section(2, true, 1, 1, 21), false);
        let tables = delivered.borrow();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].header.version, 2);
        assert!(tables[0].header.complete);
        assert_eq!(tables[0].items, vec![20, 21]);
    }

    #[test]
    fn backward_section_number() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, true, 0, 2, 10), false);
        dec.push_section(&section(1, true, 1, 2, 11), false);
        dec.push_section(&section(1, true, 0, 2, 10), false);
        dec.push_section(&section(1, true, 1, 2, 11), false);
        dec.push_section(&section(1, true, 2, 2, 12), false);
        let tables = delivered.borrow();
        assert_eq!(tables.len(), 1);
        assert!(tables[0].header.complete);
        assert_eq!(tables[0].items, vec![10, 11, 12]);
    }

    #[test]
    fn last_section_number_changes() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, true, 0, 2, 10), false);
        dec.push_section(&section(1, true, 1, 1, 11), false);
        let tables = delivered.borrow();
        assert_eq!(tables.len(), 1);
        assert!(!tables[0].header.complete);
        assert_eq!(tables[0].items, vec![11]);
    }

    #[test]
    fn late_activation() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, false, 0, 0, 10), false);
        assert_eq!(delivered.borrow().len(), 1);
        assert!(!delivered.borrow()[0].header.current_next);
        dec.push_section(&section(1, false, 0, 0, 10), false);
        assert_eq!(delivered.borrow().len(), 1);

        dec.push_section(&section(1, true, 0, 0, 10), false);
        {
            let tables = delivered.borrow();
            assert_eq!(tables.len(), 2);
            assert!(tables[1].header.current_next);
            assert!(tables[1].header.complete);
            assert_eq!(tables[1].items, vec![10]);
        }
        dec.push_section(&section(1, true, 0, 0, 10), false);
        assert_eq!(delivered.borrow().len(), 2);
    }

    #[test]
    fn discontinuity_reinitialises() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, true, 0, 1, 10), false);
        dec.push_section(&section(1, true, 1, 1, 11), true);
        {
            let tables = delivered.borrow();
            assert_eq!(tables.len(), 1);
            assert!(!tables[0].header.complete);
            assert_eq!(tables[0].items, vec![11]);
        }
        dec.push_section(&section(1, true, 0, 1, 10), false);
        dec.push_section(&section(1, true, 1, 1, 11), false);
        assert_eq!(delivered.borrow().len(), 2);
        // after a discontinuity, even an unchanged complete table is delivered again
        dec.push_section(&section(1, true, 0, 1, 10), true);
        dec.push_section(&section(1, true, 1, 1, 11), false);
        assert_eq!(delivered.borrow().len(), 3);
        assert!(delivered.borrow()[2].header.complete);
    }

    #[test]
    fn rejected_sections() {
        let (mut dec, delivered) = decoder();
        dec.push_section(&section(1, true, 0, 1, 10), false);
        // wrong table_id, wrong extension, empty payload
        dec.push_section(&test_section(0x43, 7, 1, true, 1, 1, &[11]), false);
        dec.push_section(&test_section(0x42, 8, 1, true, 1, 1, &[11]), false);
        dec.push_section(&test_section(0x42, 7, 1, true, 1, 1, &[]), false);
        let no_syntax = Section::from_bytes(&[0x42, 0x00, 0x01, 0x0b]).unwrap();
        dec.push_section(&no_syntax, false);
        assert!(delivered.borrow().is_empty());
        // reassembly carries on as if nothing happened
        dec.push_section(&section(1, true, 1, 1, 11), false);
        assert!(delivered.borrow()[0].header.complete);
    }

    #[test]
    fn rejected_section_does_not_consume_discontinuity() {
        let (mut dec, delivered) = decoder();
        assert!(!dec.push_section(&test_section(0x42, 7, 1, true, 1, 1, &[]), false));
        assert!(dec.push_section(&section(1, true, 0, 1, 10), false));

        let mut chain = DecoderChain::new();
        let tables: Delivered = Rc::new(RefCell::new(vec![]));
        let t = tables.clone();
        attach::<ByteTable, _>(&mut chain, 0x42, 7, move |table| t.borrow_mut().push(table))
            .unwrap();
        let record = chain.find_mut(0x42, 7).unwrap();
        record.push_section(&section(1, true, 0, 1, 10));
        record.mark_discontinuity();
        // too short, so rejected; the discontinuity applies to the next accepted section
        record.push_section(&test_section(0x42, 7, 1, true, 1, 1, &[]));
        record.push_section(&section(1, true, 1, 1, 11));
        let tables = tables.borrow();
        assert_eq!(tables.len(), 1);
        assert!(!tables[0].header.complete);
        assert_eq!(tables[0].items, vec![11]);
        assert!(delivered.borrow().is_empty());
    }

    #[test]
    fn attach_and_detach() {
        let mut chain = DecoderChain::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let handle =
            attach::<ByteTable, _>(&mut chain, 0x42, 7, move |_| *c.borrow_mut() += 1).unwrap();
        assert_eq!(chain.get(0x42, 7), Some(handle));
        assert_matches!(
            attach::<ByteTable, _>(&mut chain, 0x42, 7, |_| {}),
            Err(AttachError::AlreadyAttached {
                table_id: 0x42,
                extension: 7
            })
        );
        assert_matches!(
            attach::<ByteTable, _>(&mut chain, 0x02, 7, |_| {}),
            Err(AttachError::UnsupportedTableId(0x02))
        );
        chain
            .find_mut(0x42, 7)
            .unwrap()
            .push_section(&section(1, true, 0, 0, 1));
        assert_eq!(*count.borrow(), 1);

        let record = detach(&mut chain, 0x42, 7).unwrap();
        assert_eq!(record.extension(), 7);
        assert!(chain.is_empty());
        assert!(detach(&mut chain, 0x42, 7).is_none());
    }
}
