//! Video encoding routine.

use smallvec::SmallVec;

use super::codec::{EncoderFrame, EncoderSession, VideoFrame};
use super::{encoded_packet, service_error};
use crate::error::{Error, Result};
use crate::filter::ProcessStatus;
use crate::format::{PixelFormat, PlaneLayout};
use crate::packet::{Packet, Payload, Plane};
use crate::pid::Pid;

/// State of an opened video encoder.
pub(crate) struct VideoState {
    encoder: Box<dyn EncoderSession>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    layout: PlaneLayout,
    all_intra: bool,
    scratch: Vec<u8>,
    flushed: bool,
}

impl VideoState {
    pub(crate) fn new(
        encoder: Box<dyn EncoderSession>,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        layout: PlaneLayout,
        all_intra: bool,
    ) -> Self {
        Self {
            encoder,
            width,
            height,
            pixel_format,
            layout,
            all_intra,
            scratch: vec![0; width as usize * height as usize],
            flushed: false,
        }
    }

    pub(crate) fn encoder(&self) -> &dyn EncoderSession {
        self.encoder.as_ref()
    }

    pub(crate) fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub(crate) fn process(&mut self, input: &Pid, output: &Pid) -> Result<ProcessStatus> {
        if self.flushed {
            return Ok(ProcessStatus::Eos);
        }
        let Some(pck) = input.get_packet() else {
            if input.is_eos() {
                return self.flush(output);
            }
            return Ok(ProcessStatus::Continue);
        };

        let result = match self.frame(&pck) {
            Ok(frame) => self
                .encoder
                .encode(Some(EncoderFrame::Video(frame)), &mut self.scratch)
                .map_err(service_error),
            Err(error) => Err(error),
        };
        input.drop_packet();

        if let Some(encoded) = result? {
            output.send(encoded_packet(&self.scratch, &encoded, 0)?)?;
        }
        Ok(ProcessStatus::Continue)
    }

    fn flush(&mut self, output: &Pid) -> Result<ProcessStatus> {
        match self.encoder.encode(None, &mut self.scratch) {
            Ok(Some(encoded)) => {
                output.send(encoded_packet(&self.scratch, &encoded, 0)?)?;
                Ok(ProcessStatus::Continue)
            }
            Ok(None) => {
                self.flushed = true;
                output.set_eos();
                tracing::debug!(pid = %output.id(), "video encoder drained");
                Ok(ProcessStatus::Eos)
            }
            Err(error) => {
                self.flushed = true;
                output.set_eos();
                Err(service_error(error))
            }
        }
    }

    /// Borrow the planes of `pck` without copying.
    fn frame<'a>(&self, pck: &'a Packet) -> Result<VideoFrame<'a>> {
        let layout = &self.layout;
        let mut planes: SmallVec<[Plane<'a>; 3]> = SmallVec::new();
        match pck.payload() {
            Payload::Data(data) => {
                let luma = layout.stride * self.height as usize;
                let chroma = layout.stride_uv * layout.uv_height;
                let short = || {
                    Error::ServiceError(format!(
                        "frame of {} bytes is shorter than the {} byte picture",
                        data.len(),
                        layout.size
                    ))
                };
                planes.push(Plane {
                    data: data.get(..luma).ok_or_else(short)?,
                    stride: layout.stride,
                });
                let mut offset = luma;
                for _ in 1..layout.nb_planes {
                    planes.push(Plane {
                        data: data.get(offset..offset + chroma).ok_or_else(short)?,
                        stride: layout.stride_uv,
                    });
                    offset += chroma;
                }
            }
            Payload::HwFrame(frame) => {
                for index in 0..layout.nb_planes {
                    let plane = frame.plane(index).map_err(|e| {
                        Error::ServiceError(format!("failed to fetch hardware plane {index}: {e}"))
                    })?;
                    planes.push(plane);
                }
            }
        }
        Ok(VideoFrame {
            planes,
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format,
            pts: pck.cts().unwrap_or(0),
            interlacing: pck.interlacing(),
            force_intra: self.all_intra,
        })
    }
}
