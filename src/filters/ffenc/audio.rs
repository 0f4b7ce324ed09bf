//! Audio encoding routine.
//!
//! Encoders with a fixed frame size get exactly `frame_size` samples per
//! submission. Input packets are released as soon as possible: bytes that
//! do not complete a frame are copied into an accumulation buffer, and the
//! tail of a packet that overflowed the frame is copied back into it with
//! its own timestamp.

use super::codec::{AudioFrame, EncodedPacket, EncoderFrame, EncoderSession};
use super::{encoded_packet, service_error};
use crate::error::Result;
use crate::filter::ProcessStatus;
use crate::format::{SampleFormat, rescale};
use crate::pid::Pid;
use crate::property::PropertyKey;

/// Byte counters of the accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioCounters {
    /// Bytes taken from input packets.
    pub received: u64,
    /// Bytes handed to the encoder.
    pub submitted: u64,
    /// Bytes waiting in the accumulation buffer.
    pub buffered: u64,
}

/// State of an opened audio encoder.
pub(crate) struct AudioState {
    encoder: Box<dyn EncoderSession>,
    sample_rate: u32,
    channels: u32,
    sample_format: SampleFormat,
    bytes_per_sample: usize,
    timescale: u32,
    buffer: Vec<u8>,
    first_byte_cts: u64,
    last_pts: u64,
    init_cts_setup: bool,
    ts_shift: i64,
    scratch: Vec<u8>,
    flushed: bool,
    received: u64,
    submitted: u64,
}

impl AudioState {
    pub(crate) fn new(
        encoder: Box<dyn EncoderSession>,
        sample_rate: u32,
        channels: u32,
        sample_format: SampleFormat,
        timescale: u32,
    ) -> Self {
        Self {
            encoder,
            sample_rate,
            channels,
            sample_format,
            bytes_per_sample: sample_format.bytes_per_sample(channels),
            timescale,
            buffer: Vec::with_capacity(sample_rate as usize),
            first_byte_cts: 0,
            last_pts: 0,
            init_cts_setup: true,
            ts_shift: 0,
            scratch: vec![0; sample_rate as usize],
            flushed: false,
            received: 0,
            submitted: 0,
        }
    }

    pub(crate) fn encoder(&self) -> &dyn EncoderSession {
        self.encoder.as_ref()
    }

    pub(crate) fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub(crate) fn counters(&self) -> AudioCounters {
        AudioCounters {
            received: self.received,
            submitted: self.submitted,
            buffered: self.buffer.len() as u64,
        }
    }

    fn frame_bytes(&self) -> usize {
        self.encoder.frame_size() as usize * self.bytes_per_sample
    }

    /// Timestamp offset of `bytes` of samples, in the pid timescale.
    fn ts_diff(&self, bytes: usize) -> u64 {
        if self.bytes_per_sample == 0 || self.sample_rate == 0 {
            return 0;
        }
        rescale((bytes / self.bytes_per_sample) as u64, self.sample_rate, self.timescale)
    }

    pub(crate) fn process(&mut self, input: &Pid, output: &Pid) -> Result<ProcessStatus> {
        if self.flushed {
            return Ok(ProcessStatus::Eos);
        }
        let frame_bytes = self.frame_bytes();
        if frame_bytes > 0 && self.buffer.len() >= frame_bytes {
            return self.submit_buffered(frame_bytes, output);
        }

        let Some(pck) = input.get_packet() else {
            if input.is_eos() {
                return self.flush(output);
            }
            return Ok(ProcessStatus::Continue);
        };
        let Some(data) = pck.data() else {
            tracing::warn!(pid = %input.id(), "audio packet without data");
            input.drop_packet();
            return Ok(ProcessStatus::Continue);
        };
        let cts = pck.cts().unwrap_or(0);
        if self.buffer.is_empty() {
            self.first_byte_cts = cts;
        }
        self.received += data.len() as u64;

        if frame_bytes == 0 {
            let pts = self.first_byte_cts;
            let nb_samples = data.len().checked_div(self.bytes_per_sample).unwrap_or(0) as u32;
            let frame = AudioFrame {
                data,
                nb_samples,
                channels: self.channels,
                sample_format: self.sample_format,
                pts,
            };
            let result = self.encoder.encode(Some(EncoderFrame::Audio(frame)), &mut self.scratch);
            self.submitted += data.len() as u64;
            self.last_pts = pts;
            input.drop_packet();
            return self.emit(result, output);
        }

        if self.buffer.len() + data.len() < frame_bytes {
            self.buffer.extend_from_slice(data);
            input.drop_packet();
            return Ok(ProcessStatus::Continue);
        }

        let nb_copy = frame_bytes - self.buffer.len();
        self.buffer.extend_from_slice(&data[..nb_copy]);
        let pts = self.first_byte_cts;
        let frame = AudioFrame {
            data: &self.buffer[..frame_bytes],
            nb_samples: self.encoder.frame_size(),
            channels: self.channels,
            sample_format: self.sample_format,
            pts,
        };
        let result = self.encoder.encode(Some(EncoderFrame::Audio(frame)), &mut self.scratch);
        self.submitted += frame_bytes as u64;
        self.last_pts = pts;

        self.buffer.clear();
        let rest = &data[nb_copy..];
        if !rest.is_empty() {
            self.buffer.extend_from_slice(rest);
            self.first_byte_cts = cts + self.ts_diff(nb_copy);
        }
        input.drop_packet();
        self.emit(result, output)
    }

    /// Submit one frame taken from the head of the buffer.
    fn submit_buffered(&mut self, frame_bytes: usize, output: &Pid) -> Result<ProcessStatus> {
        let pts = self.first_byte_cts;
        let frame = AudioFrame {
            data: &self.buffer[..frame_bytes],
            nb_samples: self.encoder.frame_size(),
            channels: self.channels,
            sample_format: self.sample_format,
            pts,
        };
        let result = self.encoder.encode(Some(EncoderFrame::Audio(frame)), &mut self.scratch);
        self.submitted += frame_bytes as u64;
        self.last_pts = pts;
        self.buffer.drain(..frame_bytes);
        self.first_byte_cts = pts + self.ts_diff(frame_bytes);
        self.emit(result, output)
    }

    fn flush(&mut self, output: &Pid) -> Result<ProcessStatus> {
        match self.encoder.encode(None, &mut self.scratch) {
            Ok(None) => {
                self.flushed = true;
                output.set_eos();
                if !self.buffer.is_empty() {
                    tracing::debug!(bytes = self.buffer.len(), "incomplete audio frame left at end of stream");
                }
                Ok(ProcessStatus::Eos)
            }
            Err(error) => {
                self.flushed = true;
                output.set_eos();
                Err(service_error(error))
            }
            result => self.emit(result, output),
        }
    }

    fn emit(&mut self, result: Result<Option<EncodedPacket>>, output: &Pid) -> Result<ProcessStatus> {
        let Some(encoded) = result.map_err(service_error)? else {
            return Ok(ProcessStatus::Continue);
        };
        if self.init_cts_setup {
            self.init_cts_setup = false;
            self.ts_shift = self.last_pts as i64 - encoded.pts;
            if self.ts_shift != 0 && self.timescale > 0 {
                let delay = self.ts_shift * i64::from(self.sample_rate) / i64::from(self.timescale);
                output.set_property(PropertyKey::AudioDelay, delay);
                tracing::debug!(pid = %output.id(), shift = self.ts_shift, delay, "encoder delay signaled");
            }
        }
        output.send(encoded_packet(&self.scratch, &encoded, self.ts_shift)?)?;
        Ok(ProcessStatus::Continue)
    }
}
