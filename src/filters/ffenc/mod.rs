//! Audio and video encoder adapter.
//!
//! Wraps an external codec library (see [`codec`]) as a filter taking one
//! raw audio or video pid and producing one compressed pid.
//!
//! The target codec comes from the downstream chain when it asks for one
//! (`caps_query(CodecId)`), otherwise from the `c` argument. When the input
//! format is not one the encoder accepts, the filter proposes the
//! encoder's preferred format upstream and waits: nothing is opened and no
//! output pid exists until the producer re-configures the pid with the
//! proposed format.
//!
//! Undeclared arguments are forwarded to the codec as string options.

pub mod audio;
pub mod codec;
pub mod video;

use bytes::Bytes;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filter::{
    ArgDescriptor, CapsBundle, Filter, FilterArgs, FilterCaps, FilterContext, FilterRegister,
    ProcessStatus,
};
use crate::format::{CodecId, Fraction, StreamType};
use crate::packet::{Packet, Sap};
use crate::pid::Pid;
use crate::property::{PropertyKey, PropertyMap, PropertyValue};

pub use audio::AudioCounters;
pub use codec::{
    AudioFrame, AudioParams, CodecLibrary, EncodedPacket, EncoderCodec, EncoderFrame,
    EncoderOptions, EncoderParams, EncoderSession, VideoFrame, VideoParams,
};

use audio::AudioState;
use video::VideoState;

/// Registered name.
pub const NAME: &str = "ffenc";

/// Time base used for video without timescale nor frame rate.
const DEFAULT_VIDEO_TIME_BASE: Fraction = Fraction::new(1, 25);

/// Per-media processing routine, chosen when the encoder opens.
pub(crate) enum EncodePath {
    /// Picture encoding.
    Video(VideoState),
    /// Sample encoding.
    Audio(AudioState),
}

impl EncodePath {
    fn process(&mut self, input: &Pid, output: &Pid) -> Result<ProcessStatus> {
        match self {
            EncodePath::Video(state) => state.process(input, output),
            EncodePath::Audio(state) => state.process(input, output),
        }
    }

    fn is_flushed(&self) -> bool {
        match self {
            EncodePath::Video(state) => state.is_flushed(),
            EncodePath::Audio(state) => state.is_flushed(),
        }
    }

    fn extradata(&self) -> Option<Bytes> {
        match self {
            EncodePath::Video(state) => state.encoder().extradata(),
            EncodePath::Audio(state) => state.encoder().extradata(),
        }
    }
}

/// Wrap a codec error as a transient one.
pub(crate) fn service_error(error: Error) -> Error {
    match error {
        Error::ServiceError(_) => error,
        other => Error::ServiceError(other.to_string()),
    }
}

/// Copy an encoded packet out of the encoder buffer.
pub(crate) fn encoded_packet(scratch: &[u8], encoded: &EncodedPacket, shift: i64) -> Result<Packet> {
    let data = scratch.get(..encoded.size).ok_or_else(|| {
        Error::ServiceError(format!(
            "encoder reported {} bytes in a {} byte buffer",
            encoded.size,
            scratch.len()
        ))
    })?;
    let ts = |value: i64| u64::try_from(value.saturating_add(shift)).unwrap_or(0);
    Ok(Packet::new(Bytes::copy_from_slice(data))
        .with_cts(ts(encoded.pts))
        .with_dts(ts(encoded.dts))
        .with_sap(if encoded.keyframe { Sap::Type1 } else { Sap::None })
        .with_duration(encoded.duration))
}

fn required(props: &PropertyMap, key: PropertyKey) -> Result<u32> {
    props.u32(key).ok_or_else(|| {
        tracing::error!(property = %key, "input property missing");
        Error::NonCompliantBitstream(format!("input {key} unknown"))
    })
}

/// Encoder filter.
pub struct FfEncoder {
    library: Arc<dyn CodecLibrary>,
    codec_arg: Option<CodecId>,
    all_intra: bool,
    low_delay: bool,
    options: EncoderOptions,
    initialized: bool,
    input: Option<Pid>,
    output: Option<Pid>,
    stream_type: Option<StreamType>,
    open_codec: Option<CodecId>,
    path: Option<EncodePath>,
}

impl std::fmt::Debug for FfEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfEncoder")
            .field("codec_arg", &self.codec_arg)
            .field("stream_type", &self.stream_type)
            .field("open_codec", &self.open_codec)
            .field("options", &self.options)
            .finish()
    }
}

impl FfEncoder {
    /// Create an encoder using `library`.
    pub fn new(library: Arc<dyn CodecLibrary>) -> Self {
        Self {
            library,
            codec_arg: None,
            all_intra: false,
            low_delay: false,
            options: EncoderOptions::new(),
            initialized: false,
            input: None,
            output: None,
            stream_type: None,
            open_codec: None,
            path: None,
        }
    }

    fn from_args(library: Arc<dyn CodecLibrary>, args: &FilterArgs) -> Result<Self> {
        let mut encoder = Self::new(library);
        if let Some(name) = args.get_str("c") {
            let codec = CodecId::from_name(name)
                .ok_or_else(|| Error::BadParam(format!("unknown codec {name}")))?;
            encoder.codec_arg = Some(codec);
        }
        encoder.all_intra = args.get_bool("all_intra").unwrap_or(false);
        encoder.low_delay = args.get_bool("low_delay").unwrap_or(false);
        Ok(encoder)
    }

    /// Codec the encoder produces when no downstream filter asks for one.
    pub fn with_codec(mut self, codec: CodecId) -> Self {
        self.codec_arg = Some(codec);
        self
    }

    /// Options forwarded to the codec.
    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Whether an encoder is open.
    pub fn is_open(&self) -> bool {
        self.path.is_some()
    }

    /// Byte counters of the audio accumulator.
    pub fn audio_counters(&self) -> Option<AudioCounters> {
        match &self.path {
            Some(EncodePath::Audio(state)) => Some(state.counters()),
            _ => None,
        }
    }

    fn detach(&mut self, ctx: &mut FilterContext<'_>) {
        if let Some(output) = self.output.take() {
            ctx.remove_pid(&output);
        }
        self.input = None;
        self.path = None;
        self.open_codec = None;
        self.stream_type = None;
    }

    fn codec_options(&self, stream_type: StreamType, codec: CodecId) -> EncoderOptions {
        let mut options = self.options.clone();
        if stream_type == StreamType::Visual && self.low_delay {
            options.set("vprofile", "baseline");
            options.set("preset", "ultrafast");
            options.set("tune", "zerolatency");
            if codec == CodecId::Avc {
                options.set("x264opts", "no-mbtree:sliced-threads:sync-lookahead=0");
            }
        }
        if stream_type == StreamType::Audio {
            options.set("strict", "experimental");
        }
        options
    }

    /// Open a video encoder, or propose a pixel format and return `None`.
    fn open_video(
        &self,
        pid: &Pid,
        props: &PropertyMap,
        codec: &dyn EncoderCodec,
        target: CodecId,
    ) -> Result<Option<EncodePath>> {
        let width = required(props, PropertyKey::Width)?;
        let height = required(props, PropertyKey::Height)?;
        let pixel_format = props.pixel_format().ok_or_else(|| {
            Error::NonCompliantBitstream("input pixel format unknown".into())
        })?;

        let supported = codec.pixel_formats();
        if let Some(&preferred) = supported.first() {
            if !supported.contains(&pixel_format) {
                tracing::info!(
                    pid = %pid.id(),
                    from = ?pixel_format,
                    to = ?preferred,
                    "proposing pixel format supported by {}",
                    codec.name()
                );
                pid.negotiate_property(PropertyKey::PixelFormat, preferred);
                return Ok(None);
            }
        }

        let stride = props.uint(PropertyKey::Stride).unwrap_or(0) as usize;
        let stride_uv = props.uint(PropertyKey::StrideUv).unwrap_or(0) as usize;
        let layout = pixel_format.layout(width, height, stride, stride_uv);

        let fps = props.get(PropertyKey::Fps).and_then(PropertyValue::as_fraction);
        let time_base = match props.u32(PropertyKey::Timescale) {
            Some(timescale) if timescale > 0 => Fraction::new(1, u64::from(timescale)),
            _ => fps
                .and_then(|f| f.inverse())
                .unwrap_or(DEFAULT_VIDEO_TIME_BASE),
        };
        let gop_size = fps
            .filter(|f| f.den > 0 && f.num > 0)
            .map(|f| (f.num as u64 / f.den) as u32)
            .unwrap_or(0);
        let params = EncoderParams::Video(VideoParams {
            width,
            height,
            pixel_format,
            sar: props
                .get(PropertyKey::Sar)
                .and_then(PropertyValue::as_fraction)
                .unwrap_or(Fraction::new(1, 1)),
            time_base,
            gop_size,
            low_delay: self.low_delay,
        });

        let options = self.codec_options(StreamType::Visual, target);
        let session = codec.open(&params, &options).map_err(|e| {
            Error::NonCompliantBitstream(format!("{} failed to open: {e}", codec.name()))
        })?;
        Ok(Some(EncodePath::Video(VideoState::new(
            session,
            width,
            height,
            pixel_format,
            layout,
            self.all_intra,
        ))))
    }

    /// Open an audio encoder, or propose a sample format and return `None`.
    fn open_audio(
        &self,
        pid: &Pid,
        props: &PropertyMap,
        codec: &dyn EncoderCodec,
        target: CodecId,
    ) -> Result<Option<(EncodePath, u32)>> {
        let sample_rate = required(props, PropertyKey::SampleRate)?;
        let channels = required(props, PropertyKey::NumChannels)?;
        let sample_format = props.sample_format().ok_or_else(|| {
            Error::NonCompliantBitstream("input audio format unknown".into())
        })?;

        let supported = codec.sample_formats();
        if let Some(&preferred) = supported.first() {
            if !supported.contains(&sample_format) {
                tracing::info!(
                    pid = %pid.id(),
                    from = ?sample_format,
                    to = ?preferred,
                    "proposing sample format supported by {}",
                    codec.name()
                );
                pid.negotiate_property(PropertyKey::AudioFormat, preferred);
                return Ok(None);
            }
        }

        let timescale = props
            .u32(PropertyKey::Timescale)
            .filter(|t| *t > 0)
            .unwrap_or(sample_rate);
        let channel_layout = props.uint(PropertyKey::ChannelLayout).or(match channels {
            1 => Some(0x4),
            2 => Some(0x3),
            _ => None,
        });
        let params = EncoderParams::Audio(AudioParams {
            sample_rate,
            channels,
            channel_layout,
            sample_format,
            time_base: Fraction::new(1, u64::from(timescale)),
        });

        let options = self.codec_options(StreamType::Audio, target);
        let session = codec.open(&params, &options).map_err(|e| {
            Error::NonCompliantBitstream(format!("{} failed to open: {e}", codec.name()))
        })?;
        let state = AudioState::new(session, sample_rate, channels, sample_format, timescale);
        Ok(Some((EncodePath::Audio(state), timescale)))
    }

    /// Pick the target codec, open it when the input format suits it, and
    /// declare the output pid.
    fn setup(
        &mut self,
        ctx: &mut FilterContext<'_>,
        pid: &Pid,
        props: &PropertyMap,
        stream_type: StreamType,
    ) -> Result<()> {
        let target = pid
            .caps_query(PropertyKey::CodecId)
            .and_then(|v| v.as_enum())
            .and_then(CodecId::from_u32)
            .or(self.codec_arg)
            .ok_or_else(|| Error::NotSupported("no target codec".into()))?;

        if let Some(open) = self.open_codec {
            if open != target {
                return Err(Error::NotSupported(format!(
                    "cannot switch codec from {} to {} on the fly",
                    open.name(),
                    target.name()
                )));
            }
            self.path = None;
            self.open_codec = None;
        }

        let codec = self
            .library
            .find_encoder(target)
            .ok_or_else(|| Error::NotSupported(format!("no encoder for {}", target.name())))?;

        let (path, timescale) = match stream_type {
            StreamType::Visual => match self.open_video(pid, props, codec.as_ref(), target)? {
                Some(path) => (path, None),
                None => return Ok(()),
            },
            _ => match self.open_audio(pid, props, codec.as_ref(), target)? {
                Some((path, timescale)) => (path, Some(timescale)),
                None => return Ok(()),
            },
        };

        let extradata = path.extradata();
        self.path = Some(path);
        self.open_codec = Some(target);

        let output = match &self.output {
            Some(output) => output.clone(),
            None => {
                let output = ctx.new_pid();
                ctx.set_name(format!("{NAME}:{}", codec.name()));
                pid.set_framing_mode(true);
                self.output = Some(output.clone());
                output
            }
        };
        output.copy_properties(pid);
        if let Some(timescale) = timescale {
            output.set_property(PropertyKey::Timescale, timescale);
        }
        output.remove_property(PropertyKey::DecoderConfig);
        output.set_property(PropertyKey::CodecId, target);
        if target.is_unframed_nal() {
            output.set_property(PropertyKey::Unframed, true);
        } else if let Some(extradata) = extradata {
            output.set_property(PropertyKey::DecoderConfig, extradata);
        }

        tracing::info!(
            filter = %ctx.name(),
            pid = %pid.id(),
            codec = target.name(),
            "encoder opened"
        );
        Ok(())
    }
}

impl Filter for FfEncoder {
    fn initialize(&mut self, _ctx: &mut FilterContext<'_>) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn configure_pid(&mut self, ctx: &mut FilterContext<'_>, pid: &Pid, is_remove: bool) -> Result<()> {
        if is_remove {
            if self.input.as_ref() == Some(pid) {
                self.detach(ctx);
            }
            return Ok(());
        }

        let props = pid.properties();
        let stream_type = match props.stream_type() {
            Some(t @ (StreamType::Visual | StreamType::Audio)) => t,
            other => {
                return Err(Error::NotSupported(format!(
                    "stream type {other:?} is not encodable"
                )));
            }
        };
        if props.codec_id() != Some(CodecId::Raw) {
            return Err(Error::NotSupported("input is not raw media".into()));
        }

        match &self.input {
            Some(input) if input != pid => return Err(Error::RequiresNewInstance),
            _ => {}
        }
        if let Some(previous) = self.stream_type {
            if previous != stream_type {
                return Err(Error::NotSupported(format!(
                    "stream type change from {previous:?} to {stream_type:?}"
                )));
            }
        }

        let attached = self.input.is_some();
        self.input = Some(pid.clone());
        self.stream_type = Some(stream_type);
        let result = self.setup(ctx, pid, &props, stream_type);
        if result.is_err() && !attached {
            self.input = None;
            self.stream_type = None;
        }
        result
    }

    fn process(&mut self, _ctx: &mut FilterContext<'_>) -> Result<ProcessStatus> {
        let (Some(input), Some(output), Some(path)) = (&self.input, &self.output, &mut self.path)
        else {
            return Ok(ProcessStatus::Continue);
        };
        if path.is_flushed() {
            return Ok(ProcessStatus::Eos);
        }
        if output.would_block() {
            return Ok(ProcessStatus::Continue);
        }
        path.process(input, output)
    }

    fn update_arg(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        if self.initialized {
            return Err(Error::NotSupported(format!(
                "argument {name} cannot change after initialization"
            )));
        }
        match name {
            "global_header" | "local_header" => return Ok(()),
            "low_delay" => self.low_delay = true,
            _ => {}
        }
        let value = match value {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Bool(_)
            | PropertyValue::Uint(_)
            | PropertyValue::Int(_)
            | PropertyValue::Double(_) => value.to_string(),
            other => {
                return Err(Error::NotSupported(format!(
                    "option {name}: unsupported value {other}"
                )));
            }
        };
        self.options.set(name, value);
        Ok(())
    }

    fn finalize(&mut self, _ctx: &mut FilterContext<'_>) {
        self.path = None;
    }
}

fn caps() -> FilterCaps {
    let bundle = |stream_type: StreamType| {
        CapsBundle::new()
            .input(PropertyKey::StreamType, [stream_type])
            .input(PropertyKey::CodecId, [CodecId::Raw])
            .output(PropertyKey::StreamType, [stream_type])
    };
    FilterCaps::none()
        .bundle(bundle(StreamType::Visual))
        .bundle(bundle(StreamType::Audio))
}

/// Register of the encoder using `library` for codecs.
pub fn register(library: Arc<dyn CodecLibrary>) -> FilterRegister {
    FilterRegister::new(NAME, move |args: &FilterArgs| {
        Ok(Box::new(FfEncoder::from_args(library.clone(), args)?) as Box<dyn Filter>)
    })
    .with_description("Audio/video encoder")
    .with_arg(ArgDescriptor::string("c", None, "codec name, unless the destination asks for one"))
    .with_arg(ArgDescriptor::bool("all_intra", false, "only produce intra pictures"))
    .with_arg(ArgDescriptor::bool("low_delay", false, "configure the encoder for low latency"))
    .with_caps(caps())
    .wildcard_args()
}
