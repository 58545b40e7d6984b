//! Registry of the table decoders attached to a single stream of sections.
//!
//! Records are kept in the order they were added, and are looked up by
//! `(table_id, extension)` with a linear scan; the number of tables open at once is small.
//! [`DecoderHandle`](struct.DecoderHandle.html) values identify one particular record, so that
//! removal never depends on keys being unique, and costs O(1) once the handle is known.

use crate::decoder::DecoderRecord;
use log::{debug, error, warn};
use std::iter;
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The handle does not refer to a record currently in the chain
    #[error("decoder is not linked into this chain")]
    NotLinked,
}

/// Identifies one record added to a `DecoderChain`.  Stays invalid once that record has been
/// removed, even if its storage is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecoderHandle {
    index: usize,
    generation: u32,
}

struct Slot {
    generation: u32,
    record: Option<DecoderRecord>,
    // neighbours in insertion order
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default)]
pub struct DecoderChain {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl DecoderChain {
    pub fn new() -> DecoderChain {
        DecoderChain::default()
    }

    /// Appends the record to the end of the chain.
    ///
    /// Callers are expected to have checked that no record with the same key is present (as
    /// [`psi::attach()`](../psi/fn.attach.html) does); a duplicate is logged, and then added
    /// anyway, but `get()` will only ever find the earlier of the two.
    pub fn add(&mut self, record: DecoderRecord) -> DecoderHandle {
        if self.get(record.table_id(), record.extension()).is_some() {
            warn!(
                "decoder for table_id={:#04x} extension={} already present",
                record.table_id(),
                record.extension()
            );
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    record: None,
                    prev: None,
                    next: None,
                });
                self.slots.len() - 1
            }
        };
        match self.tail {
            Some(tail) => self.slots[tail].next = Some(index),
            None => self.head = Some(index),
        }
        let slot = &mut self.slots[index];
        slot.record = Some(record);
        slot.prev = self.tail;
        slot.next = None;
        self.tail = Some(index);
        self.len += 1;
        DecoderHandle {
            index,
            generation: slot.generation,
        }
    }

    fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        iter::successors(self.head, move |&index| self.slots[index].next)
    }

    /// Finds the first record with the given key
    pub fn get(&self, table_id: u8, extension: u16) -> Option<DecoderHandle> {
        self.indices().find_map(|index| {
            let slot = &self.slots[index];
            match slot.record {
                Some(ref r) if r.table_id() == table_id && r.extension() == extension => {
                    Some(DecoderHandle {
                        index,
                        generation: slot.generation,
                    })
                }
                _ => None,
            }
        })
    }

    pub fn get_mut(&mut self, handle: DecoderHandle) -> Option<&mut DecoderRecord> {
        match self.slots.get_mut(handle.index) {
            Some(slot) if slot.generation == handle.generation => slot.record.as_mut(),
            _ => None,
        }
    }

    /// Shorthand for `get()` followed by `get_mut()`
    pub fn find_mut(&mut self, table_id: u8, extension: u16) -> Option<&mut DecoderRecord> {
        let handle = self.get(table_id, extension)?;
        self.get_mut(handle)
    }

    /// Unlinks the identified record, handing it back to the caller.  The order of the
    /// remaining records is unchanged.
    pub fn remove(&mut self, handle: DecoderHandle) -> Result<DecoderRecord, ChainError> {
        let slot = match self.slots.get_mut(handle.index) {
            Some(slot) if slot.generation == handle.generation && slot.record.is_some() => slot,
            _ => {
                error!("remove of unknown decoder {:?}", handle);
                return Err(ChainError::NotLinked);
            }
        };
        let record = slot.record.take().ok_or(ChainError::NotLinked)?;
        slot.generation = slot.generation.wrapping_add(1);
        let (prev, next) = (slot.prev.take(), slot.next.take());
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }
        self.free.push(handle.index);
        self.len -= 1;
        Ok(record)
    }

    /// Records in the order they were added
    pub fn iter(&self) -> impl Iterator<Item = &DecoderRecord> {
        self.indices()
            .filter_map(move |index| self.slots[index].record.as_ref())
    }

    /// Every linked record, not necessarily in insertion order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DecoderRecord> {
        self.slots.iter_mut().filter_map(|slot| slot.record.as_mut())
    }

    /// Snapshot of the `(table_id, extension)` key of every record, in insertion order
    pub fn keys(&self) -> Vec<(u8, u16)> {
        self.iter().map(|r| (r.table_id(), r.extension())).collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logs every record at debug level
    pub fn dump(&self) {
        debug!("decoder chain of {} entries", self.len());
        for record in self.iter() {
            debug!(
                "  table_id={:#04x} extension={}",
                record.table_id(),
                record.extension()
            );
        }
    }
}
