//! A [`Packet`](./struct.Packet.html) view over the 188 bytes of an MPEG Transport Stream packet,
//! exposing just the header fields needed to pull PSI sections out of the payload.

use log::warn;
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;

/// the different values indicating whether a `Packet` has an adaptation field, a payload, or both.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AdaptationControl {
    /// The `adaptation_control` field used the value `0b00`, which is not defined by the spec.
    Reserved,
    /// this packet contains a payload, but not an adaptation field
    PayloadOnly,
    /// this packet contains an adaptation field, but not a payload
    AdaptationFieldOnly,
    /// this packet contains both an adaptation field and a payload
    AdaptationFieldAndPayload,
}

impl AdaptationControl {
    #[inline(always)]
    fn from(val: u8) -> AdaptationControl {
        match val & 0b11 {
            0 => AdaptationControl::Reserved,
            1 => AdaptationControl::PayloadOnly,
            2 => AdaptationControl::AdaptationFieldOnly,
            _ => AdaptationControl::AdaptationFieldAndPayload,
        }
    }

    /// True if this AdaptationControl variant indicates that the packet will have a payload
    #[inline(always)]
    pub fn has_payload(self) -> bool {
        match self {
            AdaptationControl::Reserved | AdaptationControl::AdaptationFieldOnly => false,
            AdaptationControl::PayloadOnly | AdaptationControl::AdaptationFieldAndPayload => true,
        }
    }
}

/// A 4-bit counter which increases by one, modulo 16, between successive payload-carrying packets
/// of the same PID.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct ContinuityCounter {
    val: u8,
}

impl ContinuityCounter {
    /// Panics if the given value is greater than 15.
    #[inline]
    pub fn new(count: u8) -> ContinuityCounter {
        assert!(count < 0b1_0000);
        ContinuityCounter { val: count }
    }

    /// the counter value, in the range `0`-`15`
    #[inline]
    pub fn count(self) -> u8 {
        self.val
    }

    /// the value which should appear in the next packet of the same PID
    #[inline]
    pub fn next(self) -> ContinuityCounter {
        ContinuityCounter {
            val: (self.val + 1) & 0b1111,
        }
    }

    /// true if this counter value immediately follows the given one (allowing for wrap-around)
    #[inline]
    pub fn follows(self, other: ContinuityCounter) -> bool {
        other.next() == self
    }
}

/// A Packet Identifier value, in the range `0x0000`-`0x1fff`.
#[derive(PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct Pid(u16);
impl Pid {
    /// The largest possible PID value, `0x1fff`.
    pub const MAX_VALUE: u16 = 0x1fff;

    /// The total number of distinct PID values, `0x2000` (equal to `MAX_VALUE` + 1)
    pub const PID_COUNT: usize = (Self::MAX_VALUE + 1) as usize;

    /// The PID carrying the _Program Association Table_.
    pub const PAT: Pid = Pid::new(0);
    /// The PID carrying DVB _Bouquet Association Table_ (and _Service Description Table_) data.
    pub const BAT: Pid = Pid::new(0x11);

    /// Panics if the given value is greater than `Pid::MAX_VALUE`.
    pub const fn new(pid: u16) -> Pid {
        assert!(pid <= 0x1fff);
        Pid(pid)
    }

    /// Builds a `Pid` from the low 13 bits of the given big-endian pair of bytes, ignoring the
    /// top three (reserved) bits.
    pub(crate) fn from_bytes(hi: u8, lo: u8) -> Pid {
        Pid(u16::from(hi & 0b0001_1111) << 8 | u16::from(lo))
    }
}
impl TryFrom<u16> for Pid {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value <= Pid::MAX_VALUE {
            Ok(Pid(value))
        } else {
            Err(())
        }
    }
}
impl From<Pid> for u16 {
    #[inline]
    fn from(pid: Pid) -> Self {
        pid.0
    }
}
impl From<Pid> for usize {
    #[inline]
    fn from(pid: Pid) -> Self {
        pid.0 as usize
    }
}
impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Pid({:04x})", self.0)
    }
}

/// A transport stream `Packet` is a wrapper around a byte slice which allows the bytes to be
/// interpreted as a packet structure per _ISO/IEC 13818-1, Section 2.4.3.3_.
pub struct Packet<'buf> {
    buf: &'buf [u8],
}

const FIXED_HEADER_SIZE: usize = 4;
// when AF present, a 1-byte 'length' field precedes the content,
const ADAPTATION_FIELD_OFFSET: usize = FIXED_HEADER_SIZE + 1;

impl<'buf> Packet<'buf> {
    /// The value `0x47`, which must appear in the first byte of every transport stream packet.
    pub const SYNC_BYTE: u8 = 0x47;

    /// The fixed 188 byte size of a transport stream packet.
    pub const SIZE: usize = 188;

    /// returns `true` if the given value is the synchronisation byte `0x47`
    #[inline(always)]
    pub fn is_sync_byte(b: u8) -> bool {
        b == Self::SYNC_BYTE
    }

    /// Returns `None` if the buffer is not exactly `Packet::SIZE` bytes long, or does not start
    /// with `Packet::SYNC_BYTE`.
    pub fn try_new(buf: &'buf [u8]) -> Option<Packet<'buf>> {
        if buf.len() == Self::SIZE && Packet::is_sync_byte(buf[0]) {
            Some(Packet { buf })
        } else {
            None
        }
    }

    /// `true` if this packet's payload contains the start of a new section (preceded by a
    /// `pointer_field`).
    #[inline]
    pub fn payload_unit_start_indicator(&self) -> bool {
        self.buf[1] & 0b0100_0000 != 0
    }

    /// The sub-stream to which a particular packet belongs is indicated by this Packet Identifier
    /// value.
    #[inline]
    pub fn pid(&self) -> Pid {
        Pid::from_bytes(self.buf[1], self.buf[2])
    }

    /// Indicates if an adaptation field, a payload, or both follow the fixed header.
    #[inline]
    pub fn adaptation_control(&self) -> AdaptationControl {
        AdaptationControl::from(self.buf[3] >> 4)
    }

    /// Value of the _continuity_counter_ field.
    #[inline]
    pub fn continuity_counter(&self) -> ContinuityCounter {
        ContinuityCounter::new(self.buf[3] & 0b0000_1111)
    }

    fn adaptation_field_length(&self) -> usize {
        self.buf[4] as usize
    }

    /// The data contained within the packet, not including the packet headers.  `None` if the
    /// packet carries no payload, or if the adaptation field length is inconsistent.
    pub fn payload(&self) -> Option<&'buf [u8]> {
        let offset = match self.adaptation_control() {
            AdaptationControl::Reserved | AdaptationControl::AdaptationFieldOnly => return None,
            AdaptationControl::PayloadOnly => FIXED_HEADER_SIZE,
            AdaptationControl::AdaptationFieldAndPayload => {
                ADAPTATION_FIELD_OFFSET + self.adaptation_field_length()
            }
        };
        match offset.cmp(&self.buf.len()) {
            Ordering::Equal => {
                warn!("no payload data present");
                None
            }
            Ordering::Greater => {
                warn!(
                    "adaptation_field_length {} too large",
                    self.adaptation_field_length()
                );
                None
            }
            Ordering::Less => Some(&self.buf[offset..]),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::packet::*;

    #[test]
    fn pid() {
        assert!(Pid::try_from(0x2000).is_err());
        assert_eq!(u16::from(Pid::from_bytes(0xff, 0xff)), 0x1fff);
    }

    #[test]
    fn wrong_size() {
        let buf = [Packet::SYNC_BYTE; 187];
        assert!(Packet::try_new(&buf[..]).is_none());
    }

    #[test]
    fn continuity_wraps() {
        assert!(ContinuityCounter::new(0).follows(ContinuityCounter::new(15)));
        assert!(!ContinuityCounter::new(3).follows(ContinuityCounter::new(1)));
    }

    #[test]
    fn payload_after_adaptation_field() {
        let mut buf = [0xffu8; Packet::SIZE];
        buf[0] = Packet::SYNC_BYTE;
        buf[1] = 0b0100_0000;
        buf[2] = 0x11;
        buf[3] = 0b0011_0101;
        buf[4] = 10; // adaptation_field_length
        let pk = Packet::try_new(&buf[..]).unwrap();
        assert_eq!(pk.pid(), Pid::BAT);
        assert!(pk.payload_unit_start_indicator());
        assert_eq!(pk.continuity_counter().count(), 5);
        assert_eq!(
            pk.adaptation_control(),
            AdaptationControl::AdaptationFieldAndPayload
        );
        assert_eq!(pk.payload().unwrap().len(), Packet::SIZE - 5 - 10);
    }

    #[test]
    fn oversized_adaptation_field() {
        let mut buf = [0xffu8; Packet::SIZE];
        buf[0] = Packet::SYNC_BYTE;
        buf[3] = 0b0011_0000;
        buf[4] = 200;
        let pk = Packet::try_new(&buf[..]).unwrap();
        assert!(pk.payload().is_none());
    }
}
