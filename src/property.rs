//! Typed properties attached to pids.
//!
//! A [`PropertyMap`] is a small ordered bag of [`PropertyKey`] to
//! [`PropertyValue`]. Maps are short (a dozen entries for a typical
//! stream) so a vector with linear lookup beats hashing and keeps
//! declaration order for logging and copies.

use bytes::Bytes;
use std::fmt;

use crate::format::{CodecId, Fraction, PixelFormat, SampleFormat, StreamType};

/// Stable property identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// Stream type, as [`StreamType`] enum value.
    StreamType,
    /// Codec identifier, as [`CodecId`] enum value.
    CodecId,
    /// Timescale of packet timestamps, in ticks per second.
    Timescale,
    /// Picture width in pixels.
    Width,
    /// Picture height in pixels.
    Height,
    /// Audio sample rate in Hz.
    SampleRate,
    /// Audio channel count.
    NumChannels,
    /// Audio channel layout mask.
    ChannelLayout,
    /// Pixel format, as [`PixelFormat`] enum value.
    PixelFormat,
    /// Audio sample format, as [`SampleFormat`] enum value.
    AudioFormat,
    /// Id of the stream used as clock reference.
    ClockId,
    /// Stream id.
    Id,
    /// Video frame rate.
    Fps,
    /// Sample aspect ratio.
    Sar,
    /// Stream duration.
    Duration,
    /// Bitrate in bits per second.
    Bitrate,
    /// Bytes per line of the first plane.
    Stride,
    /// Bytes per line of the chroma planes.
    StrideUv,
    /// Path of the source file.
    FilePath,
    /// MIME type of the source.
    Mime,
    /// File extension of the source.
    FileExt,
    /// Out-of-band decoder configuration.
    DecoderConfig,
    /// Bitstream is not framed into access units.
    Unframed,
    /// Number of priming samples to discard at the start of decoding.
    AudioDelay,
}

impl PropertyKey {
    /// Short name used in logs and argument strings.
    pub const fn name(self) -> &'static str {
        match self {
            Self::StreamType => "StreamType",
            Self::CodecId => "CodecID",
            Self::Timescale => "Timescale",
            Self::Width => "Width",
            Self::Height => "Height",
            Self::SampleRate => "SampleRate",
            Self::NumChannels => "NumChannels",
            Self::ChannelLayout => "ChannelLayout",
            Self::PixelFormat => "PixelFormat",
            Self::AudioFormat => "AudioFormat",
            Self::ClockId => "ClockID",
            Self::Id => "ID",
            Self::Fps => "FPS",
            Self::Sar => "SAR",
            Self::Duration => "Duration",
            Self::Bitrate => "Bitrate",
            Self::Stride => "Stride",
            Self::StrideUv => "StrideUV",
            Self::FilePath => "FilePath",
            Self::Mime => "MIMEType",
            Self::FileExt => "Extension",
            Self::DecoderConfig => "DecoderConfig",
            Self::Unframed => "Unframed",
            Self::AudioDelay => "AudioDelay",
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A property value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// Boolean.
    Bool(bool),
    /// Unsigned integer.
    Uint(u64),
    /// Signed integer.
    Int(i64),
    /// Double precision float.
    Double(f64),
    /// Fraction.
    Fraction(Fraction),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Blob(Bytes),
    /// Enumerated constant (stream type, codec id, formats).
    Enum(u32),
}

impl PropertyValue {
    /// Get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as unsigned integer. Non-negative signed values and enum
    /// constants convert too.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Int(v) if *v >= 0 => Some(*v as u64),
            Self::Enum(v) => Some(*v as u64),
            _ => None,
        }
    }

    /// Get as signed integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get as double.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Fraction(f) => Some(f.as_f64()),
            Self::Uint(v) => Some(*v as f64),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as fraction.
    pub fn as_fraction(&self) -> Option<Fraction> {
        match self {
            Self::Fraction(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as binary data.
    pub fn as_blob(&self) -> Option<&Bytes> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Get as enum constant.
    pub fn as_enum(&self) -> Option<u32> {
        match self {
            Self::Enum(v) => Some(*v),
            Self::Uint(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Fraction(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Self::Enum(v) => write!(f, "#{v}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        Self::Uint(v as u64)
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<Fraction> for PropertyValue {
    fn from(v: Fraction) -> Self {
        Self::Fraction(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Bytes> for PropertyValue {
    fn from(v: Bytes) -> Self {
        Self::Blob(v)
    }
}

impl From<StreamType> for PropertyValue {
    fn from(v: StreamType) -> Self {
        Self::Enum(v.as_u32())
    }
}

impl From<CodecId> for PropertyValue {
    fn from(v: CodecId) -> Self {
        Self::Enum(v.as_u32())
    }
}

impl From<PixelFormat> for PropertyValue {
    fn from(v: PixelFormat) -> Self {
        Self::Enum(v.as_u32())
    }
}

impl From<SampleFormat> for PropertyValue {
    fn from(v: SampleFormat) -> Self {
        Self::Enum(v.as_u32())
    }
}

/// Ordered property bag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyMap {
    entries: Vec<(PropertyKey, PropertyValue)>,
}

impl PropertyMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: PropertyKey, value: impl Into<PropertyValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or overwrite a property. Overwriting keeps the original
    /// position. Returns true if the stored value changed.
    pub fn set(&mut self, key: PropertyKey, value: impl Into<PropertyValue>) -> bool {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, current)) if *current == value => false,
            Some((_, current)) => {
                *current = value;
                true
            }
            None => {
                self.entries.push((key, value));
                true
            }
        }
    }

    /// Get a property.
    pub fn get(&self, key: PropertyKey) -> Option<&PropertyValue> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Remove a property, returning its value.
    pub fn remove(&mut self, key: PropertyKey) -> Option<PropertyValue> {
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Check whether a property is present.
    pub fn contains(&self, key: PropertyKey) -> bool {
        self.get(key).is_some()
    }

    /// Copy every entry of `other` into this map.
    pub fn merge(&mut self, other: &PropertyMap) {
        for (key, value) in other.iter() {
            self.set(key, value.clone());
        }
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyKey, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Get an unsigned integer property.
    pub fn uint(&self, key: PropertyKey) -> Option<u64> {
        self.get(key).and_then(PropertyValue::as_uint)
    }

    /// Get a u32 property, ignoring out of range values.
    pub fn u32(&self, key: PropertyKey) -> Option<u32> {
        self.uint(key).and_then(|v| u32::try_from(v).ok())
    }

    /// Get a string property.
    pub fn str(&self, key: PropertyKey) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    /// Stream type, if declared.
    pub fn stream_type(&self) -> Option<StreamType> {
        self.get(PropertyKey::StreamType)
            .and_then(PropertyValue::as_enum)
            .map(StreamType::from_u32)
    }

    /// Codec id, if declared and known.
    pub fn codec_id(&self) -> Option<CodecId> {
        self.get(PropertyKey::CodecId)
            .and_then(PropertyValue::as_enum)
            .and_then(CodecId::from_u32)
    }

    /// Pixel format, if declared and known.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.get(PropertyKey::PixelFormat)
            .and_then(PropertyValue::as_enum)
            .and_then(PixelFormat::from_u32)
    }

    /// Audio sample format, if declared and known.
    pub fn sample_format(&self) -> Option<SampleFormat> {
        self.get(PropertyKey::AudioFormat)
            .and_then(PropertyValue::as_enum)
            .and_then(SampleFormat::from_u32)
    }
}

impl FromIterator<(PropertyKey, PropertyValue)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (PropertyKey, PropertyValue)>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        for (key, value) in iter {
            map.set(key, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_keeps_position() {
        let mut map = PropertyMap::new()
            .with(PropertyKey::StreamType, StreamType::Visual)
            .with(PropertyKey::Width, 320u32)
            .with(PropertyKey::Height, 240u32);

        assert!(map.set(PropertyKey::Width, 640u32));
        assert!(!map.set(PropertyKey::Width, 640u32));

        let keys: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![PropertyKey::StreamType, PropertyKey::Width, PropertyKey::Height]
        );
        assert_eq!(map.u32(PropertyKey::Width), Some(640));
    }

    #[test]
    fn test_absent_is_none() {
        let map = PropertyMap::new();
        assert!(map.get(PropertyKey::Stride).is_none());
        assert!(map.stream_type().is_none());
    }

    #[test]
    fn test_typed_getters() {
        let map = PropertyMap::new()
            .with(PropertyKey::StreamType, StreamType::Audio)
            .with(PropertyKey::CodecId, CodecId::Raw)
            .with(PropertyKey::AudioFormat, SampleFormat::F32)
            .with(PropertyKey::FilePath, "/tmp/a.mpg");

        assert_eq!(map.stream_type(), Some(StreamType::Audio));
        assert_eq!(map.codec_id(), Some(CodecId::Raw));
        assert_eq!(map.sample_format(), Some(SampleFormat::F32));
        assert_eq!(map.str(PropertyKey::FilePath), Some("/tmp/a.mpg"));
    }

    #[test]
    fn test_merge_and_remove() {
        let mut dst = PropertyMap::new().with(PropertyKey::Id, 1u32);
        let src = PropertyMap::new()
            .with(PropertyKey::Id, 2u32)
            .with(PropertyKey::Timescale, 90000u32);
        dst.merge(&src);
        assert_eq!(dst.u32(PropertyKey::Id), Some(2));
        assert_eq!(dst.len(), 2);

        assert_eq!(dst.remove(PropertyKey::Id), Some(PropertyValue::Uint(2)));
        assert_eq!(dst.remove(PropertyKey::Id), None);
        assert_eq!(dst.len(), 1);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(PropertyValue::Int(-3).as_uint(), None);
        assert_eq!(PropertyValue::Int(3).as_uint(), Some(3));
        assert_eq!(
            PropertyValue::Fraction(Fraction::new(1, 4)).as_double(),
            Some(0.25)
        );
        assert_eq!(PropertyValue::Enum(7).as_uint(), Some(7));
    }
}
