//! Descriptors provide metadata about an element of a Transport Stream.
//!
//! For example, a descriptor may be used to specify the language of an audio track.  Use of
//! specific descriptors is often not mandatory (many streams do not describe the language of their
//! audio).
//!
//! The syntax of specific PSI tables often allows descriptors to be attached to the table itself,
//! or to entries within the table.
//!
//! A [`Descriptor`](struct.Descriptor.html) always keeps the raw payload bytes, so that tables
//! survive a decode / generate round trip unchanged even when they carry descriptors this crate
//! does not understand.  Tags handled by one of the codecs in the submodules can be interpreted
//! on demand,
//!
//! ```
//! # use mpeg2ts_psi::descriptor::{CoreDescriptor, Descriptor};
//! let desc = Descriptor::new(0x0e, &[0xc0, 0x01, 0x84]).unwrap();
//! if let Ok(CoreDescriptor::MaximumBitrate(max)) = desc.decoded() {
//!     assert_eq!(max.maximum_bits_per_second(), 155_200);
//! }
//! ```

pub mod iso_639_language;
pub mod max_bitrate;
pub mod registration;
pub mod scrambling;
pub mod stream_identifier;
pub mod system_clock;
pub mod transport_stream;

use self::iso_639_language::Iso639LanguageDescriptor;
use self::max_bitrate::MaximumBitrateDescriptor;
use self::registration::RegistrationDescriptor;
use self::scrambling::ScramblingDescriptor;
use self::stream_identifier::StreamIdentifierDescriptor;
use self::system_clock::SystemClockDescriptor;
use self::transport_stream::TransportStreamDescriptor;
use log::warn;
use std::cell::OnceCell;
use std::fmt;
use thiserror::Error;

/// Conversion between the payload bytes of one kind of descriptor and a structured form.
pub trait DescriptorCodec: Sized {
    /// The `descriptor_tag` value handled by this codec
    const TAG: u8;

    /// Interprets the given descriptor payload (not including the tag and length bytes)
    fn decode(payload: &[u8]) -> Result<Self, DescriptorError>;

    /// Appends the payload bytes (not including the tag and length bytes) to `out`
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), DescriptorError>;
}

macro_rules! descriptor_enum {
    (
        $(#[$outer:meta])*
        $name:ident {
            $(
                $(#[$inner:meta])*
                $case_name:ident => $t:ident
            ),*,
        }
    ) => {
        $(#[$outer])*
        pub enum $name {
            $(
                $(#[$inner])*
                $case_name($t),
            )*
        }
        impl $name {
            /// Decodes the payload with the codec registered for `tag`, or fails with
            /// `DescriptorError::UnhandledTagValue`
            pub fn decode(tag: u8, payload: &[u8]) -> Result<$name, DescriptorError> {
                $(
                    if tag == <$t as DescriptorCodec>::TAG {
                        return Ok($name::$case_name(<$t as DescriptorCodec>::decode(payload)?));
                    }
                )*
                Err(DescriptorError::UnhandledTagValue(tag))
            }

            pub fn tag(&self) -> u8 {
                match self {
                    $( $name::$case_name(_) => <$t as DescriptorCodec>::TAG, )*
                }
            }

            pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), DescriptorError> {
                match self {
                    $( $name::$case_name(d) => d.encode(out), )*
                }
            }
        }
        $(
            impl From<$t> for $name {
                fn from(d: $t) -> $name {
                    $name::$case_name(d)
                }
            }
        )*
    }
}

descriptor_enum! {
    /// The descriptors for which this crate has a codec
    #[derive(Debug, Clone, PartialEq, Eq)]
    CoreDescriptor {
        Registration => RegistrationDescriptor,
        ISO639Language => Iso639LanguageDescriptor,
        SystemClock => SystemClockDescriptor,
        MaximumBitrate => MaximumBitrateDescriptor,
        /// ETSI EN 300 468
        StreamIdentifier => StreamIdentifierDescriptor,
        /// ETSI EN 300 468
        Scrambling => ScramblingDescriptor,
        /// ETSI EN 300 468
        TransportStream => TransportStreamDescriptor,
    }
}

/// A descriptor attached to a table or to one of the table's elements.
#[derive(Clone)]
pub struct Descriptor {
    tag: u8,
    data: Vec<u8>,
    decoded: OnceCell<Result<CoreDescriptor, DescriptorError>>,
}

impl Descriptor {
    /// The largest payload which the 8-bit `descriptor_length` field can describe
    pub const MAX_PAYLOAD: usize = 255;

    pub fn new(tag: u8, payload: &[u8]) -> Result<Descriptor, DescriptorError> {
        if payload.len() > Self::MAX_PAYLOAD {
            return Err(DescriptorError::PayloadTooLong { len: payload.len() });
        }
        Ok(Descriptor {
            tag,
            data: payload.to_vec(),
            decoded: OnceCell::new(),
        })
    }

    /// Encodes `decoded` into a new descriptor.  If `duplicate` is `true`, a copy of `decoded` is
    /// also cached so that a later call to `decoded()` need not parse the payload again.
    pub fn generate<D>(decoded: &D, duplicate: bool) -> Result<Descriptor, DescriptorError>
    where
        D: DescriptorCodec + Clone + Into<CoreDescriptor>,
    {
        let mut data = vec![];
        decoded.encode(&mut data)?;
        let desc = Descriptor::new(D::TAG, &data)?;
        if duplicate {
            let _ = desc.decoded.set(Ok(decoded.clone().into()));
        }
        Ok(desc)
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Length of the payload, not counting the tag and length bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Size of the descriptor on the wire, including the tag and length bytes
    pub fn encoded_len(&self) -> usize {
        2 + self.data.len()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.tag);
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
    }

    /// The structured form of this descriptor, parsed on first use and cached thereafter.
    /// Tags without a codec give `DescriptorError::UnhandledTagValue`.
    pub fn decoded(&self) -> Result<&CoreDescriptor, DescriptorError> {
        self.decoded
            .get_or_init(|| CoreDescriptor::decode(self.tag, &self.data))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Parses the payload with the given codec, which must handle this descriptor's tag
    pub fn decode<D: DescriptorCodec>(&self) -> Result<D, DescriptorError> {
        if self.tag != D::TAG {
            return Err(DescriptorError::TagMismatch {
                expected: D::TAG,
                actual: self.tag,
            });
        }
        D::decode(&self.data)
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Descriptor) -> bool {
        self.tag == other.tag && self.data == other.data
    }
}
impl Eq for Descriptor {}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decoded() {
            Ok(decoded) => decoded.fmt(f),
            Err(_) => f
                .debug_struct("Descriptor")
                .field("tag", &self.tag)
                .field("len", &self.data.len())
                .finish(),
        }
    }
}

/// Iterates over the descriptors packed into a descriptor loop.  Once a descriptor claims more
/// bytes than remain, the error is produced and iteration stops.
pub struct DescriptorIter<'buf> {
    buf: &'buf [u8],
}
impl<'buf> DescriptorIter<'buf> {
    pub fn new(buf: &'buf [u8]) -> DescriptorIter<'buf> {
        DescriptorIter { buf }
    }
}
impl<'buf> Iterator for DescriptorIter<'buf> {
    type Item = Result<Descriptor, DescriptorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < 2 {
            let buflen = self.buf.len();
            self.buf = &self.buf[0..0];
            return Some(Err(DescriptorError::BufferTooShort { buflen }));
        }
        let tag = self.buf[0];
        let len = self.buf[1] as usize;
        let remaining_size = self.buf.len() - 2;
        if len > remaining_size {
            // ensure anther call to next() will yield None,
            self.buf = &self.buf[0..0];
            Some(Err(DescriptorError::NotEnoughData {
                tag,
                actual: remaining_size,
                expected: len,
            }))
        } else {
            let (desc, rest) = self.buf.split_at(len + 2);
            self.buf = rest;
            Some(Ok(Descriptor {
                tag,
                data: desc[2..].to_vec(),
                decoded: OnceCell::new(),
            }))
        }
    }
}

/// Appends each descriptor in `buf` to `out`, stopping at the first malformed one.  Descriptors
/// parsed before the error are kept.
pub(crate) fn read_descriptors(buf: &[u8], out: &mut Vec<Descriptor>, context: &str) {
    for desc in DescriptorIter::new(buf) {
        match desc {
            Ok(desc) => out.push(desc),
            Err(e) => {
                warn!("{}: {}", context, e);
                break;
            }
        }
    }
}

/// Checks that a descriptor payload has exactly the length required for its tag
pub(crate) fn descriptor_len(buf: &[u8], tag: u8, len: usize) -> Result<(), DescriptorError> {
    if buf.len() < len {
        Err(DescriptorError::NotEnoughData {
            tag,
            actual: buf.len(),
            expected: len,
        })
    } else if buf.len() > len {
        Err(DescriptorError::InvalidContent {
            tag,
            reason: "descriptor longer than expected",
        })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("descriptor {tag:#04x} needs {expected} bytes, but only {actual} available")]
    NotEnoughData {
        tag: u8,
        actual: usize,
        expected: usize,
    },
    #[error("{buflen} bytes remaining is too short for a descriptor header")]
    BufferTooShort { buflen: usize },
    #[error("no codec for descriptor tag {0:#04x}")]
    UnhandledTagValue(u8),
    #[error("descriptor payload of {len} bytes exceeds 255")]
    PayloadTooLong { len: usize },
    #[error("descriptor {tag:#04x}: {reason}")]
    InvalidContent { tag: u8, reason: &'static str },
    #[error("expected descriptor tag {expected:#04x}, got {actual:#04x}")]
    TagMismatch { expected: u8, actual: u8 },
}
