//! Codec library seam.
//!
//! The encoder filter drives an external codec library through these
//! traits. Closing an encoder is dropping its [`EncoderSession`].

use bytes::Bytes;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::error::Result;
use crate::format::{CodecId, Fraction, PixelFormat, SampleFormat};
use crate::packet::{Interlacing, Plane};

/// Lookup of encoders by codec.
pub trait CodecLibrary: Send + Sync {
    /// Encoder producing `codec_id`, if the library has one.
    fn find_encoder(&self, codec_id: CodecId) -> Option<Arc<dyn EncoderCodec>>;
}

/// An encoder implementation.
pub trait EncoderCodec: Send + Sync {
    /// Implementation name, e.g. `libx264`.
    fn name(&self) -> &str;

    /// Produced codec.
    fn codec_id(&self) -> CodecId;

    /// Accepted pixel formats in order of preference. Empty accepts any.
    fn pixel_formats(&self) -> &[PixelFormat] {
        &[]
    }

    /// Accepted sample formats in order of preference. Empty accepts any.
    fn sample_formats(&self) -> &[SampleFormat] {
        &[]
    }

    /// Open an encoding session.
    fn open(&self, params: &EncoderParams, options: &EncoderOptions) -> Result<Box<dyn EncoderSession>>;
}

/// An opened encoder.
pub trait EncoderSession: Send {
    /// Samples per audio frame, 0 when any size is accepted.
    fn frame_size(&self) -> u32 {
        0
    }

    /// Out-of-band decoder configuration.
    fn extradata(&self) -> Option<Bytes> {
        None
    }

    /// Submit a frame, or `None` to drain, and write at most one packet
    /// into `out`.
    fn encode(&mut self, frame: Option<EncoderFrame<'_>>, out: &mut [u8]) -> Result<Option<EncodedPacket>>;
}

/// Parameters of a video encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoParams {
    /// Picture width.
    pub width: u32,
    /// Picture height.
    pub height: u32,
    /// Input pixel format.
    pub pixel_format: PixelFormat,
    /// Sample aspect ratio, 1/1 when unknown.
    pub sar: Fraction,
    /// Time base of frame timestamps.
    pub time_base: Fraction,
    /// Distance between intra pictures, 0 for the codec default.
    pub gop_size: u32,
    /// Whether low-delay encoding was requested.
    pub low_delay: bool,
}

/// Parameters of an audio encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParams {
    /// Sample rate.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u32,
    /// Channel layout mask, if declared.
    pub channel_layout: Option<u64>,
    /// Input sample format.
    pub sample_format: SampleFormat,
    /// Time base of frame timestamps.
    pub time_base: Fraction,
}

/// Parameters passed to [`EncoderCodec::open`].
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderParams {
    /// Video encoder.
    Video(VideoParams),
    /// Audio encoder.
    Audio(AudioParams),
}

/// Ordered string options handed to the codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderOptions {
    entries: SmallVec<[(String, String); 8]>,
}

impl EncoderOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, replacing a previous value in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Value of an option.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Options in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no option is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A raw picture.
#[derive(Debug, Clone)]
pub struct VideoFrame<'a> {
    /// Planes, borrowed from the input packet.
    pub planes: SmallVec<[Plane<'a>; 3]>,
    /// Picture width.
    pub width: u32,
    /// Picture height.
    pub height: u32,
    /// Pixel format.
    pub pixel_format: PixelFormat,
    /// Presentation timestamp.
    pub pts: u64,
    /// Field layout.
    pub interlacing: Interlacing,
    /// Whether the encoder must code an intra picture.
    pub force_intra: bool,
}

/// A block of interleaved or planar audio samples.
#[derive(Debug, Clone)]
pub struct AudioFrame<'a> {
    /// Sample bytes.
    pub data: &'a [u8],
    /// Samples per channel.
    pub nb_samples: u32,
    /// Channel count.
    pub channels: u32,
    /// Sample format.
    pub sample_format: SampleFormat,
    /// Presentation timestamp of the first sample.
    pub pts: u64,
}

/// Input of [`EncoderSession::encode`].
#[derive(Debug, Clone)]
pub enum EncoderFrame<'a> {
    /// A picture.
    Video(VideoFrame<'a>),
    /// Audio samples.
    Audio(AudioFrame<'a>),
}

/// Description of a packet the encoder wrote into the output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedPacket {
    /// Bytes written.
    pub size: usize,
    /// Presentation timestamp.
    pub pts: i64,
    /// Decoding timestamp.
    pub dts: i64,
    /// Duration.
    pub duration: u32,
    /// Whether the packet is a random access point.
    pub keyframe: bool,
}
