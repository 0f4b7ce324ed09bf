//! MPEG program stream demuxer.
//!
//! The container itself is parsed by an external library reached through
//! [`ProgramStreamLibrary`]. The filter takes a file pid (from `fin`),
//! opens the file on the first input packet, declares one output pid per
//! elementary stream and, once PLAY arrived, pulls one access unit per
//! stream and tick.
//!
//! ```text
//! fin ──file pid──> m2psdmx ──video pids (ID 1+n)──>
//!                           └─audio pids (ID 100+n)─>
//! ```
//!
//! Output pids are pooled per stream type: switching to another file keeps
//! the existing pids and their links.

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::event::{EventResult, FilterEvent};
use crate::filter::{
    ArgDescriptor, CapsBundle, Filter, FilterArgs, FilterCaps, FilterContext, FilterRegister,
    ProcessStatus,
};
use crate::format::{CodecId, Fraction, StreamType};
use crate::packet::{Packet, Sap};
use crate::pid::Pid;
use crate::pool::PidPool;
use crate::property::PropertyKey;

/// Registered name.
pub const NAME: &str = "m2psdmx";

/// Timescale of every declared stream.
pub const TIMESCALE: u32 = 90_000;

/// Video coding of a program stream track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVideoType {
    /// MPEG-1 video.
    Mpeg1,
    /// MPEG-2 video.
    Mpeg2,
    /// Anything else.
    Unknown,
}

/// Audio coding of a program stream track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegAudioType {
    /// MPEG-1/2 audio.
    Mpeg,
    /// AC-3.
    Ac3,
    /// Linear PCM.
    Lpcm,
    /// Not recognized; the track is skipped.
    Unknown,
}

/// One video access unit, timestamps in 90 kHz units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoAccessUnit {
    /// Elementary stream bytes.
    pub data: Bytes,
    /// Whether this is an intra picture.
    pub keyframe: bool,
    /// Decoding timestamp.
    pub dts: u64,
    /// Composition timestamp.
    pub cts: u64,
}

/// One audio access unit, timestamp in 90 kHz units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAccessUnit {
    /// Elementary stream bytes.
    pub data: Bytes,
    /// Composition timestamp.
    pub cts: u64,
}

/// Entry point of the program stream parser.
pub trait ProgramStreamLibrary: Send + Sync {
    /// Open a file. `None` when the file is missing or not a program
    /// stream. Closing is dropping the handle.
    fn open(&self, path: &Path) -> Option<Box<dyn ProgramStream>>;
}

/// An opened program stream.
pub trait ProgramStream: Send {
    /// Duration in milliseconds.
    fn max_time_ms(&self) -> u64;
    /// First composition timestamp of the file.
    fn first_cts(&self) -> u64;

    /// Number of video tracks.
    fn video_stream_count(&self) -> u32;
    /// Coding of a video track.
    fn video_stream_type(&self, stream: u32) -> MpegVideoType;
    /// Frame rate, 0 when unknown.
    fn video_framerate(&self, stream: u32) -> f64;
    /// Picture width.
    fn video_width(&self, stream: u32) -> u32;
    /// Picture height.
    fn video_height(&self, stream: u32) -> u32;
    /// Pixel aspect ratio packed as 16.16, 0 when unknown.
    fn video_aspect_ratio(&self, stream: u32) -> u32;

    /// Number of audio tracks.
    fn audio_stream_count(&self) -> u32;
    /// Coding of an audio track.
    fn audio_stream_type(&self, stream: u32) -> MpegAudioType;
    /// Sample rate.
    fn audio_sample_rate(&self, stream: u32) -> u32;
    /// Channel count.
    fn audio_channels(&self, stream: u32) -> u32;
    /// Bitrate in bits per second.
    fn audio_bitrate(&self, stream: u32) -> u32;

    /// Reposition a video track.
    fn seek_video(&mut self, stream: u32, time_ms: u64);
    /// Reposition an audio track.
    fn seek_audio(&mut self, stream: u32, time_ms: u64);
    /// Next video access unit, `None` at the end of the track.
    fn next_video_frame(&mut self, stream: u32) -> Option<VideoAccessUnit>;
    /// Next audio access unit, `None` at the end of the track.
    fn next_audio_frame(&mut self, stream: u32) -> Option<AudioAccessUnit>;
}

/// Frame rate as a fraction, with NTSC rates snapped to their exact
/// 1001-based values.
pub fn video_timing(fps: f64) -> Fraction {
    let fps_1000 = (fps * 1000.0 + 0.5) as u32;
    match fps_1000 {
        29_970 => Fraction::new(30_000, 1001),
        23_976 => Fraction::new(24_000, 1001),
        59_940 => Fraction::new(60_000, 1001),
        other => Fraction::new(i64::from(other), 1000),
    }
}

/// Strip a trailing `00 00 01 xx` start code.
pub(crate) fn trim_end_code(data: Bytes) -> Bytes {
    let len = data.len();
    if len >= 4 && data[len - 4] == 0 && data[len - 3] == 0 && data[len - 2] == 1 {
        return data.slice(..len - 4);
    }
    data
}

fn input_caps() -> FilterCaps {
    let outputs = [StreamType::Visual, StreamType::Audio];
    FilterCaps::none()
        .bundle(
            CapsBundle::new()
                .input(PropertyKey::Mime, ["video/mpeg", "audio/mpeg"])
                .output(PropertyKey::StreamType, outputs),
        )
        .bundle(
            CapsBundle::new()
                .input(PropertyKey::FileExt, ["mpg", "mpeg", "vob"])
                .output(PropertyKey::StreamType, outputs),
        )
}

/// Program stream demuxer.
pub struct ProgramStreamDemux {
    library: Arc<dyn ProgramStreamLibrary>,
    trim_end_code: bool,
    input: Option<Pid>,
    src_url: Option<String>,
    source: Option<Box<dyn ProgramStream>>,
    /// Pooled outputs, tagged with the track number.
    pool: PidPool<u32>,
    first_dts: u64,
    start_range: f64,
    playing: bool,
    in_seek: bool,
}

impl std::fmt::Debug for ProgramStreamDemux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramStreamDemux")
            .field("src_url", &self.src_url)
            .field("opened", &self.source.is_some())
            .field("streams", &self.pool.len())
            .field("playing", &self.playing)
            .finish()
    }
}

impl ProgramStreamDemux {
    /// Create a demuxer using `library`.
    pub fn new(library: Arc<dyn ProgramStreamLibrary>) -> Self {
        Self {
            library,
            trim_end_code: true,
            input: None,
            src_url: None,
            source: None,
            pool: PidPool::new(),
            first_dts: 0,
            start_range: 0.0,
            playing: false,
            in_seek: false,
        }
    }

    /// Enable or disable the trailing start code trim.
    pub fn with_trim_end_code(mut self, trim: bool) -> Self {
        self.trim_end_code = trim;
        self
    }

    /// Whether a file is open.
    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Whether PLAY was received and not stopped.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn open(&mut self, ctx: &mut FilterContext<'_>) -> Result<()> {
        let Some(url) = self.src_url.clone() else {
            return Err(Error::NotSupported("no source locator".into()));
        };
        let path = Path::new(&url);
        let Some(source) = self.library.open(path) else {
            let error = if path.exists() {
                Error::NonCompliantBitstream(url.clone())
            } else {
                Error::UrlError(url.clone())
            };
            ctx.setup_failure(error);
            return Err(Error::NotSupported(format!("cannot open {url}")));
        };
        tracing::info!(
            filter = %ctx.name(),
            src = %url,
            video = source.video_stream_count(),
            audio = source.audio_stream_count(),
            "program stream opened"
        );
        self.declare_streams(ctx, source.as_ref());
        self.source = Some(source);
        Ok(())
    }

    fn declare_streams(&mut self, ctx: &mut FilterContext<'_>, source: &dyn ProgramStream) {
        let duration = Fraction::new(source.max_time_ms() as i64, 1000);
        self.first_dts = source.first_cts();
        let mut clock_id = 0u32;

        for n in 0..source.video_stream_count() {
            let pid = self.pool.acquire(StreamType::Visual, n, || ctx.new_pid());
            let id = 1 + n;
            if clock_id == 0 {
                clock_id = id;
            }
            pid.set_name(format!("video{n}"));
            pid.set_property(PropertyKey::StreamType, StreamType::Visual);
            match source.video_stream_type(n) {
                MpegVideoType::Mpeg1 => pid.set_property(PropertyKey::CodecId, CodecId::Mpeg1Video),
                MpegVideoType::Mpeg2 => pid.set_property(PropertyKey::CodecId, CodecId::Mpeg2Video),
                MpegVideoType::Unknown => {}
            }
            pid.set_property(PropertyKey::Timescale, TIMESCALE);
            pid.set_property(PropertyKey::Id, id);
            pid.set_property(PropertyKey::ClockId, clock_id);

            let fps = source.video_framerate(n);
            if fps > 0.0 {
                pid.set_property(PropertyKey::Fps, video_timing(fps));
            }
            pid.set_property(PropertyKey::Width, source.video_width(n));
            pid.set_property(PropertyKey::Height, source.video_height(n));
            let par = source.video_aspect_ratio(n);
            if par != 0 {
                let sar = Fraction::new(i64::from(par >> 16), u64::from(par & 0xffff));
                pid.set_property(PropertyKey::Sar, sar);
            }
            pid.set_property(PropertyKey::Duration, duration);
        }

        for n in 0..source.audio_stream_count() {
            let codec = match source.audio_stream_type(n) {
                MpegAudioType::Mpeg => CodecId::MpegAudio,
                MpegAudioType::Ac3 => CodecId::Ac3,
                MpegAudioType::Lpcm => CodecId::Lpcm,
                MpegAudioType::Unknown => {
                    tracing::debug!(stream = n, "skipping audio track of unknown type");
                    continue;
                }
            };
            let pid = self.pool.acquire(StreamType::Audio, n, || ctx.new_pid());
            let id = 100 + n;
            if clock_id == 0 {
                clock_id = id;
            }
            pid.set_name(format!("audio{n}"));
            pid.set_property(PropertyKey::StreamType, StreamType::Audio);
            pid.set_property(PropertyKey::CodecId, codec);
            pid.set_property(PropertyKey::SampleRate, source.audio_sample_rate(n));
            pid.set_property(PropertyKey::NumChannels, source.audio_channels(n));
            pid.set_property(PropertyKey::Bitrate, source.audio_bitrate(n));
            pid.set_property(PropertyKey::Timescale, TIMESCALE);
            pid.set_property(PropertyKey::Id, id);
            pid.set_property(PropertyKey::ClockId, clock_id);
            pid.set_property(PropertyKey::Duration, duration);
        }
    }
}

impl Filter for ProgramStreamDemux {
    fn configure_pid(&mut self, ctx: &mut FilterContext<'_>, pid: &Pid, is_remove: bool) -> Result<()> {
        if is_remove {
            self.input = None;
            self.src_url = None;
            self.source = None;
            for output in self.pool.drain() {
                ctx.remove_pid(&output);
            }
            return Ok(());
        }

        let props = pid.properties();
        if !input_caps().accepts_input(&props) {
            return Err(Error::NotSupported(format!("{} is not a program stream", pid.id())));
        }
        self.input = Some(pid.clone());
        pid.set_framing_mode(true);

        let Some(url) = props.str(PropertyKey::FilePath) else {
            return Err(Error::NotSupported("input pid has no file path".into()));
        };
        if self.src_url.as_deref() == Some(url) {
            return Ok(());
        }
        if self.source.take().is_some() {
            tracing::debug!(filter = %ctx.name(), src = %url, "source changed, releasing streams");
            self.pool.release_all();
        }
        self.src_url = Some(url.to_string());
        Ok(())
    }

    fn process(&mut self, ctx: &mut FilterContext<'_>) -> Result<ProcessStatus> {
        let Some(input) = self.input.clone() else {
            return Ok(ProcessStatus::Continue);
        };
        let Some(pck) = input.get_packet() else {
            return Ok(ProcessStatus::Continue);
        };
        if !pck.framing_end() {
            return Err(Error::NotSupported("partial file delivery".into()));
        }
        if self.source.is_none() {
            self.open(ctx)?;
        }
        if !self.playing {
            return Ok(ProcessStatus::Continue);
        }
        let Some(source) = self.source.as_mut() else {
            return Ok(ProcessStatus::Continue);
        };

        if self.in_seek {
            let seek_to = (self.start_range.max(0.0) * 1000.0) as u64;
            for entry in self.pool.active() {
                if entry.category() == StreamType::Visual {
                    source.seek_video(*entry.data(), seek_to);
                } else {
                    source.seek_audio(*entry.data(), seek_to);
                }
            }
            tracing::debug!(seek_ms = seek_to, "program stream seek");
            self.in_seek = false;
        }

        let mut done = 0;
        for entry in self.pool.iter() {
            if !entry.in_use() {
                done += 1;
                continue;
            }
            let pid = entry.pid();
            if pid.would_block() {
                continue;
            }
            let n = *entry.data();
            let packet = if entry.category() == StreamType::Visual {
                source.next_video_frame(n).map(|au| {
                    let data = if self.trim_end_code {
                        trim_end_code(au.data)
                    } else {
                        au.data
                    };
                    Packet::new(data)
                        .with_dts(au.dts.saturating_sub(self.first_dts))
                        .with_cts(au.cts.saturating_sub(self.first_dts))
                        .with_sap(if au.keyframe { Sap::Type1 } else { Sap::None })
                })
            } else {
                source.next_audio_frame(n).map(|au| {
                    let cts = au.cts.saturating_sub(self.first_dts);
                    Packet::new(au.data)
                        .with_dts(cts)
                        .with_cts(cts)
                        .with_sap(Sap::Type1)
                })
            };
            match packet {
                Some(packet) => pid.send(packet)?,
                None => done += 1,
            }
        }

        if done == self.pool.len() {
            for entry in self.pool.iter() {
                entry.pid().set_eos();
            }
            input.drop_packet();
            tracing::info!(filter = %ctx.name(), "all program stream tracks exhausted");
            return Ok(ProcessStatus::Eos);
        }
        Ok(ProcessStatus::Continue)
    }

    fn process_event(&mut self, _ctx: &mut FilterContext<'_>, event: &FilterEvent) -> EventResult {
        match event {
            FilterEvent::Play(play) => {
                if self.playing && self.start_range == play.start_range {
                    tracing::debug!(start = play.start_range, "already playing from this position");
                    return EventResult::Cancel;
                }
                self.start_range = play.start_range;
                self.playing = true;
                self.in_seek = true;
                EventResult::Cancel
            }
            FilterEvent::SourceSeek { start_range } => {
                self.start_range = *start_range;
                self.in_seek = true;
                EventResult::Cancel
            }
            FilterEvent::Stop => {
                self.playing = false;
                EventResult::Propagate
            }
            FilterEvent::SetSpeed { .. } => EventResult::Cancel,
            FilterEvent::Custom(_) => EventResult::Propagate,
        }
    }

    fn finalize(&mut self, _ctx: &mut FilterContext<'_>) {
        self.source = None;
        self.pool.drain();
    }
}

/// Register of the demuxer using `library` to parse files.
pub fn register(library: Arc<dyn ProgramStreamLibrary>) -> FilterRegister {
    FilterRegister::new(NAME, move |args: &FilterArgs| {
        let demux = ProgramStreamDemux::new(library.clone())
            .with_trim_end_code(args.get_bool("trim_end_code").unwrap_or(true));
        Ok(Box::new(demux) as Box<dyn Filter>)
    })
    .with_description("MPEG program stream demuxer")
    .with_arg(ArgDescriptor::bool(
        "trim_end_code",
        true,
        "strip a trailing start code from video access units",
    ))
    .with_caps(input_caps())
}
