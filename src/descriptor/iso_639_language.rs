//! Language information for an audio elementary stream

use super::DescriptorCodec;
use super::DescriptorError;

/// Gives one or more language codes (and associated audio types) for the stream to which it is
/// attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iso639LanguageDescriptor {
    pub languages: Vec<Language>,
}

impl DescriptorCodec for Iso639LanguageDescriptor {
    const TAG: u8 = 10;

    fn decode(buf: &[u8]) -> Result<Self, DescriptorError> {
        if buf.len() % 4 != 0 {
            return Err(DescriptorError::InvalidContent {
                tag: Self::TAG,
                reason: "length must be a multiple of 4",
            });
        }
        Ok(Iso639LanguageDescriptor {
            languages: buf.chunks_exact(4).map(Language::from_bytes).collect(),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), DescriptorError> {
        for lang in &self.languages {
            let code = encoding_rs::mem::encode_latin1_lossy(&lang.code);
            if code.len() != 3 {
                return Err(DescriptorError::InvalidContent {
                    tag: Self::TAG,
                    reason: "language code must be three ISO-8859-1 characters",
                });
            }
            out.extend_from_slice(&code);
            out.push(lang.audio_type.into());
        }
        Ok(())
    }
}

/// Metadata about the role of the audio elementary stream to which this descriptor is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioType {
    /// The audio has no particular role defined
    Undefined,
    /// There is no language-specific content within the audio
    CleanEffects,
    /// The audio is prepared for the heading impaired
    HearingImpaired,
    /// The audio is prepared for the visually impaired
    VisualImpairedCommentary,
    /// Values `0x04` to `0x7F` are reserved
    Reserved(u8),
    /// Values `0x80` to `0xFF` are user-private
    Private(u8),
}
impl From<u8> for AudioType {
    fn from(v: u8) -> Self {
        match v {
            0 => AudioType::Undefined,
            1 => AudioType::CleanEffects,
            2 => AudioType::HearingImpaired,
            3 => AudioType::VisualImpairedCommentary,
            4..=127 => AudioType::Reserved(v),
            _ => AudioType::Private(v),
        }
    }
}
impl From<AudioType> for u8 {
    fn from(v: AudioType) -> Self {
        match v {
            AudioType::Undefined => 0,
            AudioType::CleanEffects => 1,
            AudioType::HearingImpaired => 2,
            AudioType::VisualImpairedCommentary => 3,
            AudioType::Reserved(v) | AudioType::Private(v) => v,
        }
    }
}

/// One language entry within an `Iso639LanguageDescriptor`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    /// The 3-letter ISO-639 language code
    pub code: String,
    pub audio_type: AudioType,
}
impl Language {
    fn from_bytes(buf: &[u8]) -> Language {
        Language {
            code: encoding_rs::mem::decode_latin1(&buf[0..3]).into_owned(),
            audio_type: AudioType::from(buf[3]),
        }
    }
}
