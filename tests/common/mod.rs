//! Shared mocks for integration tests: a program stream parser, a codec
//! library and a few test filters.

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use pidflow::event::{CustomEvent, EventDirection};
use pidflow::filters::ffenc::{
    CodecLibrary, EncodedPacket, EncoderCodec, EncoderFrame, EncoderOptions, EncoderParams,
    EncoderSession,
};
use pidflow::filters::inspect::{self, SharedReport};
use pidflow::filters::m2psdmx::{
    AudioAccessUnit, MpegAudioType, MpegVideoType, ProgramStream, ProgramStreamLibrary,
    VideoAccessUnit,
};
use pidflow::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

// ============================================================================
// Program stream parser
// ============================================================================

/// Content of one mock container.
#[derive(Debug, Clone, Default)]
pub struct Container {
    pub first_cts: u64,
    pub duration_ms: u64,
    /// Per video track: (payload, keyframe, raw cts).
    pub video: Vec<Vec<(Vec<u8>, bool, u64)>>,
    /// Per audio track: type and (payload, raw cts).
    pub audio: Vec<(MpegAudioType, Vec<(Vec<u8>, u64)>)>,
}

impl Container {
    /// `video` video tracks and `audio` MPEG audio tracks of `frames`
    /// access units each, 3600 ticks apart, starting at `first_cts`.
    pub fn simple(video: usize, audio: usize, frames: usize, first_cts: u64) -> Self {
        let vframes = (0..frames)
            .map(|i| {
                let cts = first_cts + i as u64 * 3600;
                (vec![0x10, 0x20, 0, 0, 1, 0xb7], i % 3 == 0, cts)
            })
            .collect::<Vec<_>>();
        let aframes = (0..frames)
            .map(|i| (vec![0xff; 8], first_cts + i as u64 * 2160))
            .collect::<Vec<_>>();
        Self {
            first_cts,
            duration_ms: frames as u64 * 40,
            video: vec![vframes; video],
            audio: vec![(MpegAudioType::Mpeg, aframes); audio],
        }
    }
}

/// What the parser was asked to do.
#[derive(Debug, Default)]
pub struct ParserLog {
    pub opens: AtomicUsize,
    /// (is_video, stream, time_ms)
    pub seeks: Mutex<Vec<(bool, u32, u64)>>,
}

/// Parser serving containers registered by path.
#[derive(Debug, Default)]
pub struct MockParser {
    pub files: HashMap<PathBuf, Container>,
    pub log: Arc<ParserLog>,
}

impl MockParser {
    pub fn with_file(mut self, path: impl Into<PathBuf>, container: Container) -> Self {
        self.files.insert(path.into(), container);
        self
    }
}

struct MockStream {
    container: Container,
    video: Vec<VecDeque<VideoAccessUnit>>,
    audio: Vec<VecDeque<AudioAccessUnit>>,
    log: Arc<ParserLog>,
}

impl ProgramStreamLibrary for MockParser {
    fn open(&self, path: &Path) -> Option<Box<dyn ProgramStream>> {
        let container = self.files.get(path)?.clone();
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        let video = container
            .video
            .iter()
            .map(|track| {
                track
                    .iter()
                    .map(|(data, keyframe, cts)| VideoAccessUnit {
                        data: Bytes::from(data.clone()),
                        keyframe: *keyframe,
                        dts: *cts,
                        cts: *cts,
                    })
                    .collect()
            })
            .collect();
        let audio = container
            .audio
            .iter()
            .map(|(_, track)| {
                track
                    .iter()
                    .map(|(data, cts)| AudioAccessUnit {
                        data: Bytes::from(data.clone()),
                        cts: *cts,
                    })
                    .collect()
            })
            .collect();
        Some(Box::new(MockStream {
            container,
            video,
            audio,
            log: self.log.clone(),
        }))
    }
}

impl ProgramStream for MockStream {
    fn max_time_ms(&self) -> u64 {
        self.container.duration_ms
    }
    fn first_cts(&self) -> u64 {
        self.container.first_cts
    }
    fn video_stream_count(&self) -> u32 {
        self.video.len() as u32
    }
    fn video_stream_type(&self, _: u32) -> MpegVideoType {
        MpegVideoType::Mpeg2
    }
    fn video_framerate(&self, _: u32) -> f64 {
        25.0
    }
    fn video_width(&self, _: u32) -> u32 {
        720
    }
    fn video_height(&self, _: u32) -> u32 {
        576
    }
    fn video_aspect_ratio(&self, _: u32) -> u32 {
        0
    }
    fn audio_stream_count(&self) -> u32 {
        self.audio.len() as u32
    }
    fn audio_stream_type(&self, stream: u32) -> MpegAudioType {
        self.container
            .audio
            .get(stream as usize)
            .map_or(MpegAudioType::Unknown, |(t, _)| *t)
    }
    fn audio_sample_rate(&self, _: u32) -> u32 {
        48_000
    }
    fn audio_channels(&self, _: u32) -> u32 {
        2
    }
    fn audio_bitrate(&self, _: u32) -> u32 {
        192_000
    }
    fn seek_video(&mut self, stream: u32, time_ms: u64) {
        self.log.seeks.lock().push((true, stream, time_ms));
    }
    fn seek_audio(&mut self, stream: u32, time_ms: u64) {
        self.log.seeks.lock().push((false, stream, time_ms));
    }
    fn next_video_frame(&mut self, stream: u32) -> Option<VideoAccessUnit> {
        self.video.get_mut(stream as usize)?.pop_front()
    }
    fn next_audio_frame(&mut self, stream: u32) -> Option<AudioAccessUnit> {
        self.audio.get_mut(stream as usize)?.pop_front()
    }
}

// ============================================================================
// Codec library
// ============================================================================

/// What the codecs were asked to do.
#[derive(Debug, Default)]
pub struct CodecLog {
    pub opened: Mutex<Vec<(String, EncoderParams)>>,
    pub frames: AtomicU64,
    pub submitted_bytes: AtomicU64,
    /// Drain calls that returned nothing.
    pub empty_drains: AtomicU64,
}

/// Library with `libx264` (YUV 4:2:0 or NV12, one frame of delay) and
/// `aac` (S16, 1024 sample frames, 1024 samples of priming).
#[derive(Debug, Default)]
pub struct MockCodecs {
    pub log: Arc<CodecLog>,
}

struct MockCodec {
    id: CodecId,
    name: &'static str,
    pixel_formats: Vec<PixelFormat>,
    sample_formats: Vec<SampleFormat>,
    log: Arc<CodecLog>,
}

impl CodecLibrary for MockCodecs {
    fn find_encoder(&self, codec_id: CodecId) -> Option<Arc<dyn EncoderCodec>> {
        let codec = match codec_id {
            CodecId::Avc => MockCodec {
                id: codec_id,
                name: "libx264",
                pixel_formats: vec![PixelFormat::Yuv420, PixelFormat::Nv12],
                sample_formats: Vec::new(),
                log: self.log.clone(),
            },
            CodecId::Aac => MockCodec {
                id: codec_id,
                name: "aac",
                pixel_formats: Vec::new(),
                sample_formats: vec![SampleFormat::S16],
                log: self.log.clone(),
            },
            _ => return None,
        };
        Some(Arc::new(codec))
    }
}

impl EncoderCodec for MockCodec {
    fn name(&self) -> &str {
        self.name
    }

    fn codec_id(&self) -> CodecId {
        self.id
    }

    fn pixel_formats(&self) -> &[PixelFormat] {
        &self.pixel_formats
    }

    fn sample_formats(&self) -> &[SampleFormat] {
        &self.sample_formats
    }

    fn open(&self, params: &EncoderParams, _options: &EncoderOptions) -> Result<Box<dyn EncoderSession>> {
        self.log.opened.lock().push((self.name.to_string(), params.clone()));
        let audio = matches!(params, EncoderParams::Audio(_));
        Ok(Box::new(MockEncoder {
            audio,
            pending: None,
            log: self.log.clone(),
        }))
    }
}

struct MockEncoder {
    audio: bool,
    pending: Option<i64>,
    log: Arc<CodecLog>,
}

impl MockEncoder {
    fn packet(out: &mut [u8], pts: i64, keyframe: bool) -> EncodedPacket {
        out[..3].copy_from_slice(&[0, 0, 1]);
        EncodedPacket {
            size: 3,
            pts,
            dts: pts,
            duration: 1,
            keyframe,
        }
    }
}

impl EncoderSession for MockEncoder {
    fn frame_size(&self) -> u32 {
        if self.audio { 1024 } else { 0 }
    }

    fn encode(&mut self, frame: Option<EncoderFrame<'_>>, out: &mut [u8]) -> Result<Option<EncodedPacket>> {
        match frame {
            Some(EncoderFrame::Video(frame)) => {
                self.log.frames.fetch_add(1, Ordering::SeqCst);
                let bytes: usize = frame.planes.iter().map(|p| p.data.len()).sum();
                self.log.submitted_bytes.fetch_add(bytes as u64, Ordering::SeqCst);
                let previous = self.pending.replace(frame.pts as i64);
                Ok(previous.map(|pts| Self::packet(out, pts, false)))
            }
            Some(EncoderFrame::Audio(frame)) => {
                self.log.frames.fetch_add(1, Ordering::SeqCst);
                self.log
                    .submitted_bytes
                    .fetch_add(frame.data.len() as u64, Ordering::SeqCst);
                Ok(Some(Self::packet(out, frame.pts as i64 - 1024, true)))
            }
            None => match self.pending.take() {
                Some(pts) => Ok(Some(Self::packet(out, pts, false))),
                None => {
                    self.log.empty_drains.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            },
        }
    }
}

// ============================================================================
// Test filters
// ============================================================================

/// Raw media a [`RawSource`] produces.
#[derive(Debug, Clone, Copy)]
pub enum RawMedia {
    Video { format: PixelFormat, width: u32, height: u32 },
    Audio { format: SampleFormat, sample_rate: u32, channels: u32, packet_size: usize },
}

/// Counters shared by a [`RawSource`] with the test.
#[derive(Debug, Default)]
pub struct SourceStats {
    pub sent: AtomicU64,
    pub bytes: AtomicU64,
    pub adopted: AtomicU64,
}

/// Source of raw media that adopts (or refuses) format proposals.
pub struct RawSource {
    media: RawMedia,
    pids: usize,
    packets: u64,
    adopt: bool,
    outputs: Vec<(Pid, u64)>,
    pub stats: Arc<SourceStats>,
}

impl RawSource {
    pub fn new(media: RawMedia, packets: u64) -> Self {
        Self {
            media,
            pids: 1,
            packets,
            adopt: true,
            outputs: Vec::new(),
            stats: Arc::new(SourceStats::default()),
        }
    }

    pub fn with_pids(mut self, pids: usize) -> Self {
        self.pids = pids;
        self
    }

    pub fn refusing(mut self) -> Self {
        self.adopt = false;
        self
    }

    fn packet_size(&self, pid: &Pid) -> usize {
        match self.media {
            RawMedia::Video { width, height, .. } => pid
                .properties()
                .pixel_format()
                .map_or(0, |f| f.layout(width, height, 0, 0).size),
            RawMedia::Audio { packet_size, .. } => packet_size,
        }
    }
}

impl Filter for RawSource {
    fn initialize(&mut self, ctx: &mut FilterContext<'_>) -> Result<()> {
        for _ in 0..self.pids {
            let pid = ctx.new_pid();
            pid.set_property(PropertyKey::CodecId, CodecId::Raw);
            match self.media {
                RawMedia::Video { format, width, height } => {
                    pid.set_property(PropertyKey::Width, width);
                    pid.set_property(PropertyKey::Height, height);
                    pid.set_property(PropertyKey::PixelFormat, format);
                    pid.set_property(PropertyKey::Timescale, 25u32);
                    pid.set_property(PropertyKey::StreamType, StreamType::Visual);
                }
                RawMedia::Audio { format, sample_rate, channels, .. } => {
                    pid.set_property(PropertyKey::SampleRate, sample_rate);
                    pid.set_property(PropertyKey::NumChannels, channels);
                    pid.set_property(PropertyKey::AudioFormat, format);
                    pid.set_property(PropertyKey::Timescale, sample_rate);
                    pid.set_property(PropertyKey::StreamType, StreamType::Audio);
                }
            }
            self.outputs.push((pid, 0));
        }
        Ok(())
    }

    fn configure_pid(&mut self, _: &mut FilterContext<'_>, _: &Pid, _: bool) -> Result<()> {
        Err(Error::NotSupported("source".into()))
    }

    fn process(&mut self, _ctx: &mut FilterContext<'_>) -> Result<ProcessStatus> {
        let mut done = 0;
        for index in 0..self.outputs.len() {
            let (pid, sent) = self.outputs[index].clone();
            if sent >= self.packets {
                pid.set_eos();
                done += 1;
                continue;
            }
            if pid.would_block() {
                continue;
            }
            let size = self.packet_size(&pid);
            let step = match self.media {
                RawMedia::Video { .. } => 1,
                RawMedia::Audio { format, channels, .. } => {
                    // The adopted format decides how many samples a packet holds.
                    let format = pid.properties().sample_format().unwrap_or(format);
                    (size / format.bytes_per_sample(channels).max(1)) as u64
                }
            };
            pid.send(Packet::new(vec![0u8; size]).with_cts(sent * step).with_sap(Sap::Type1))?;
            self.stats.sent.fetch_add(1, Ordering::SeqCst);
            self.stats.bytes.fetch_add(size as u64, Ordering::SeqCst);
            self.outputs[index].1 = sent + 1;
        }
        if done == self.outputs.len() {
            return Ok(ProcessStatus::Eos);
        }
        Ok(ProcessStatus::Continue)
    }

    fn reconfigure_output(&mut self, _: &mut FilterContext<'_>, pid: &Pid, proposals: &PropertyMap) -> Result<()> {
        if !self.adopt {
            return Err(Error::NotSupported("raw source keeps its format".into()));
        }
        for (key, value) in proposals.iter() {
            pid.set_property(key, value.clone());
        }
        self.stats.adopted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink releasing one packet per input every `every` ticks, recording the
/// deepest queue it saw.
pub struct SlowSink {
    inputs: Vec<Pid>,
    every: u64,
    calls: u64,
    pub max_depth: Arc<AtomicUsize>,
    pub received: Arc<AtomicU64>,
}

impl SlowSink {
    pub fn new(every: u64) -> Self {
        Self {
            inputs: Vec::new(),
            every: every.max(1),
            calls: 0,
            max_depth: Arc::new(AtomicUsize::new(0)),
            received: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Filter for SlowSink {
    fn configure_pid(&mut self, ctx: &mut FilterContext<'_>, pid: &Pid, is_remove: bool) -> Result<()> {
        if is_remove {
            self.inputs.retain(|p| p != pid);
        } else if !self.inputs.contains(pid) {
            self.inputs.push(pid.clone());
            ctx.send_event(FilterEvent::play(0.0));
        }
        Ok(())
    }

    fn process(&mut self, _ctx: &mut FilterContext<'_>) -> Result<ProcessStatus> {
        self.calls += 1;
        let release = self.calls % self.every == 0;
        for pid in &self.inputs {
            self.max_depth.fetch_max(pid.queued_packets(), Ordering::SeqCst);
            if release && pid.get_packet().is_some() {
                pid.drop_packet();
                self.received.fetch_add(1, Ordering::SeqCst);
            }
        }
        if !self.inputs.is_empty() && self.inputs.iter().all(Pid::is_eos) {
            return Ok(ProcessStatus::Eos);
        }
        Ok(ProcessStatus::Continue)
    }
}

/// File source whose pid can be touched (a property rewritten) by an
/// upstream `touch` event.
pub struct TouchableFile {
    path: String,
    output: Option<Pid>,
    sent: bool,
    touches: u64,
}

impl TouchableFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            output: None,
            sent: false,
            touches: 0,
        }
    }
}

impl Filter for TouchableFile {
    fn initialize(&mut self, ctx: &mut FilterContext<'_>) -> Result<()> {
        let pid = ctx.new_pid();
        pid.set_property(PropertyKey::FilePath, self.path.as_str());
        pid.set_property(PropertyKey::FileExt, "mpg");
        pid.set_property(PropertyKey::StreamType, StreamType::File);
        self.output = Some(pid);
        Ok(())
    }

    fn configure_pid(&mut self, _: &mut FilterContext<'_>, _: &Pid, _: bool) -> Result<()> {
        Err(Error::NotSupported("source".into()))
    }

    fn process(&mut self, _ctx: &mut FilterContext<'_>) -> Result<ProcessStatus> {
        if let (Some(pid), false) = (&self.output, self.sent) {
            pid.send(Packet::new(Vec::new()))?;
            pid.set_eos();
            self.sent = true;
        }
        Ok(ProcessStatus::Eos)
    }

    fn process_event(&mut self, _ctx: &mut FilterContext<'_>, event: &FilterEvent) -> EventResult {
        if event.name() == "touch" {
            if let Some(pid) = &self.output {
                self.touches += 1;
                pid.set_property(PropertyKey::Bitrate, self.touches);
            }
            return EventResult::Cancel;
        }
        EventResult::Propagate
    }
}

/// Upstream custom event named `name`.
pub fn custom_upstream(name: &str) -> FilterEvent {
    FilterEvent::Custom(CustomEvent {
        name: name.to_string(),
        direction: EventDirection::Upstream,
    })
}

/// Registry with the built-ins, the demux over `parser`, the encoder
/// over `codecs`, and an inspect sink writing into the returned report.
pub fn registry(parser: MockParser, codecs: MockCodecs) -> (FilterRegistry, SharedReport) {
    let report = SharedReport::default();
    let mut registry = FilterRegistry::with_builtins();
    registry.register(inspect::register_with(report.clone()));
    registry.register(m2psdmx::register(Arc::new(parser)));
    registry.register(ffenc::register(Arc::new(codecs)));
    (registry, report)
}
