//! Stream formats: stream types, codec ids, pixel and sample layouts.
//!
//! These are the values carried by the `StreamType`, `CodecId`,
//! `PixelFormat` and `AudioFormat` pid properties. Everything here is
//! `Copy` and cheap to compare so filters can match on it during
//! configuration.

use std::fmt;

// ============================================================================
// Fractions
// ============================================================================

/// Rational number used for frame rates, aspect ratios and durations.
///
/// Using a fraction allows exact representation of common frame rates
/// like 29.97 fps (30000/1001) and 23.976 fps (24000/1001).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fraction {
    /// Numerator.
    pub num: i64,
    /// Denominator.
    pub den: u64,
}

impl Fraction {
    /// Create a new fraction.
    pub const fn new(num: i64, den: u64) -> Self {
        Self { num, den }
    }

    /// Get the value as floating point. A zero denominator yields zero.
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Get the inverse fraction (e.g. a frame rate into a time base).
    pub fn inverse(&self) -> Option<Self> {
        if self.num <= 0 {
            return None;
        }
        Some(Self::new(self.den as i64, self.num as u64))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Rescale `value` expressed in `from` units per second into `to` units.
///
/// Returns `value` unchanged when `from` is zero.
#[inline]
pub fn rescale(value: u64, from: u32, to: u32) -> u64 {
    if from == 0 || from == to {
        return value;
    }
    ((value as u128 * to as u128) / from as u128) as u64
}

// ============================================================================
// Stream types and codecs
// ============================================================================

/// Kind of media carried by a pid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum StreamType {
    /// Not yet known.
    #[default]
    Unknown = 0,
    /// Opaque file content (source filters).
    File,
    /// Video.
    Visual,
    /// Audio.
    Audio,
    /// Scene description.
    Scene,
    /// Text and subtitles.
    Text,
}

impl StreamType {
    /// Stable numeric value used in enum properties.
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Reverse of [`StreamType::as_u32`].
    pub const fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::File,
            2 => Self::Visual,
            3 => Self::Audio,
            4 => Self::Scene,
            5 => Self::Text,
            _ => Self::Unknown,
        }
    }

    /// Short lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::File => "file",
            Self::Visual => "visual",
            Self::Audio => "audio",
            Self::Scene => "scene",
            Self::Text => "text",
        }
    }
}

/// Codec identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CodecId {
    /// Uncompressed samples.
    Raw = 1,
    /// MPEG-1 video.
    Mpeg1Video,
    /// MPEG-2 video.
    Mpeg2Video,
    /// MPEG-4 part 2 video.
    Mpeg4Part2,
    /// H.264 / AVC.
    Avc,
    /// H.265 / HEVC.
    Hevc,
    /// MPEG-1/2 audio layers I, II, III.
    MpegAudio,
    /// AAC.
    Aac,
    /// AC-3.
    Ac3,
    /// Linear PCM as carried in program streams.
    Lpcm,
    /// Opus.
    Opus,
}

impl CodecId {
    /// Stable numeric value used in enum properties.
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Reverse of [`CodecId::as_u32`].
    pub const fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Raw,
            2 => Self::Mpeg1Video,
            3 => Self::Mpeg2Video,
            4 => Self::Mpeg4Part2,
            5 => Self::Avc,
            6 => Self::Hevc,
            7 => Self::MpegAudio,
            8 => Self::Aac,
            9 => Self::Ac3,
            10 => Self::Lpcm,
            11 => Self::Opus,
            _ => return None,
        })
    }

    /// Parse a codec short name as used in filter arguments.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "raw" => Self::Raw,
            "m1v" | "mpeg1video" => Self::Mpeg1Video,
            "m2v" | "mpeg2video" => Self::Mpeg2Video,
            "m4v" | "mpeg4" => Self::Mpeg4Part2,
            "avc" | "h264" | "264" => Self::Avc,
            "hevc" | "h265" | "265" => Self::Hevc,
            "mp3" | "mpa" | "mp2" => Self::MpegAudio,
            "aac" => Self::Aac,
            "ac3" => Self::Ac3,
            "lpcm" => Self::Lpcm,
            "opus" => Self::Opus,
            _ => return None,
        })
    }

    /// Short lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Mpeg1Video => "m1v",
            Self::Mpeg2Video => "m2v",
            Self::Mpeg4Part2 => "m4v",
            Self::Avc => "avc",
            Self::Hevc => "hevc",
            Self::MpegAudio => "mpa",
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::Lpcm => "lpcm",
            Self::Opus => "opus",
        }
    }

    /// Codecs whose bitstream is sent without out-of-band decoder config.
    pub const fn is_unframed_nal(self) -> bool {
        matches!(self, Self::Avc | Self::Hevc)
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Pixel formats
// ============================================================================

/// Pixel formats (color space and memory layout).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar (Y plane, then U plane, then V plane).
    #[default]
    Yuv420 = 1,
    /// YUV 4:2:0 semi-planar (Y plane, then interleaved UV plane).
    Nv12,
    /// YUV 4:2:2 planar.
    Yuv422,
    /// YUV 4:4:4 planar.
    Yuv444,
    /// YUV 4:2:2 packed (Y0 U Y1 V).
    Yuyv,
    /// 8-bit grayscale.
    Gray,
    /// RGB 8-bit per channel, packed.
    Rgb24,
    /// RGBA 8-bit per channel, packed.
    Rgba,
}

/// Memory layout of one picture for a pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Bytes per line of the first plane.
    pub stride: usize,
    /// Bytes per line of the chroma planes (0 when packed).
    pub stride_uv: usize,
    /// Number of planes.
    pub nb_planes: usize,
    /// Number of lines in the chroma planes.
    pub uv_height: usize,
    /// Total size of one picture in bytes.
    pub size: usize,
}

impl PixelFormat {
    /// Stable numeric value used in enum properties.
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Reverse of [`PixelFormat::as_u32`].
    pub const fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Yuv420,
            2 => Self::Nv12,
            3 => Self::Yuv422,
            4 => Self::Yuv444,
            5 => Self::Yuyv,
            6 => Self::Gray,
            7 => Self::Rgb24,
            8 => Self::Rgba,
            _ => return None,
        })
    }

    /// Number of planes for this format.
    pub const fn nb_planes(self) -> usize {
        match self {
            Self::Yuv420 | Self::Yuv422 | Self::Yuv444 => 3,
            Self::Nv12 => 2,
            Self::Yuyv | Self::Gray | Self::Rgb24 | Self::Rgba => 1,
        }
    }

    /// Compute the plane layout for a picture.
    ///
    /// `stride` and `stride_uv` override the natural line sizes when
    /// nonzero (padded pictures).
    pub fn layout(self, width: u32, height: u32, stride: usize, stride_uv: usize) -> PlaneLayout {
        let w = width as usize;
        let h = height as usize;
        let (natural, natural_uv, uv_height) = match self {
            Self::Yuv420 => (w, w.div_ceil(2), h.div_ceil(2)),
            Self::Nv12 => (w, w.div_ceil(2) * 2, h.div_ceil(2)),
            Self::Yuv422 => (w, w.div_ceil(2), h),
            Self::Yuv444 => (w, w, h),
            Self::Yuyv => (w * 2, 0, 0),
            Self::Gray => (w, 0, 0),
            Self::Rgb24 => (w * 3, 0, 0),
            Self::Rgba => (w * 4, 0, 0),
        };
        let stride = if stride > 0 { stride } else { natural };
        let stride_uv = if natural_uv == 0 {
            0
        } else if stride_uv > 0 {
            stride_uv
        } else {
            natural_uv
        };
        let nb_planes = self.nb_planes();
        let size = stride * h + (nb_planes - 1) * stride_uv * uv_height;
        PlaneLayout {
            stride,
            stride_uv,
            nb_planes,
            uv_height,
            size,
        }
    }
}

// ============================================================================
// Audio sample formats
// ============================================================================

/// Audio sample formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum SampleFormat {
    /// Unsigned 8-bit integer.
    U8 = 1,
    /// Signed 16-bit integer, interleaved.
    #[default]
    S16,
    /// Signed 24-bit integer, interleaved.
    S24,
    /// Signed 32-bit integer, interleaved.
    S32,
    /// 32-bit float, interleaved.
    F32,
    /// 64-bit float, interleaved.
    F64,
    /// Signed 16-bit integer, one plane per channel.
    S16Planar,
    /// 32-bit float, one plane per channel.
    F32Planar,
}

impl SampleFormat {
    /// Stable numeric value used in enum properties.
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Reverse of [`SampleFormat::as_u32`].
    pub const fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::U8,
            2 => Self::S16,
            3 => Self::S24,
            4 => Self::S32,
            5 => Self::F32,
            6 => Self::F64,
            7 => Self::S16Planar,
            8 => Self::F32Planar,
            _ => return None,
        })
    }

    /// Bits per sample of one channel.
    pub const fn bit_depth(self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::S16 | Self::S16Planar => 16,
            Self::S24 => 24,
            Self::S32 | Self::F32 | Self::F32Planar => 32,
            Self::F64 => 64,
        }
    }

    /// Bytes for one sample across all channels.
    pub const fn bytes_per_sample(self, channels: u32) -> usize {
        (self.bit_depth() * channels / 8) as usize
    }

    /// Whether channels are stored in separate planes.
    pub const fn is_planar(self) -> bool {
        matches!(self, Self::S16Planar | Self::F32Planar)
    }
}
