//! Packets: one timestamped unit of payload flowing through a pid.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Random access classification of a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, PartialOrd, Ord)]
#[repr(u8)]
pub enum Sap {
    /// Not a random access point.
    #[default]
    None = 0,
    /// Closed GOP, clean sync point.
    Type1 = 1,
    /// Open GOP sync point with leading pictures decodable.
    Type2 = 2,
    /// Open GOP sync point.
    Type3 = 3,
    /// Gradual decoding refresh.
    Type4 = 4,
}

impl Sap {
    /// Whether decoding can start at this packet.
    pub fn is_rap(self) -> bool {
        self != Sap::None
    }
}

/// Field structure of a video frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interlacing {
    /// Progressive frame.
    #[default]
    Progressive,
    /// Interlaced, top field first.
    TopFieldFirst,
    /// Interlaced, bottom field first.
    BottomFieldFirst,
}

/// Borrowed view on one picture plane.
#[derive(Clone, Copy, Debug)]
pub struct Plane<'a> {
    /// Plane bytes, at least `stride * lines` long.
    pub data: &'a [u8],
    /// Bytes per line.
    pub stride: usize,
}

/// Frame stored outside addressable packet memory (GPU surface, mapped
/// device buffer).
pub trait HwFrame: Send + Sync + fmt::Debug {
    /// Resolve plane `index` into a CPU-readable view.
    fn plane(&self, index: usize) -> Result<Plane<'_>>;
}

/// Packet payload.
#[derive(Clone, Debug)]
pub enum Payload {
    /// Shared bytes.
    Data(Bytes),
    /// Hardware frame handle.
    HwFrame(Arc<dyn HwFrame>),
}

/// A packet and its timing metadata.
///
/// Timestamps are expressed in the timescale of the pid carrying the
/// packet.
#[derive(Clone, Debug)]
pub struct Packet {
    payload: Payload,
    dts: Option<u64>,
    cts: Option<u64>,
    duration: u32,
    sap: Sap,
    framing_start: bool,
    framing_end: bool,
    interlacing: Interlacing,
}

impl Packet {
    /// Create a packet holding a complete frame of data.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_payload(Payload::Data(data.into()))
    }

    /// Create a packet referencing a hardware frame.
    pub fn from_hw_frame(frame: Arc<dyn HwFrame>) -> Self {
        Self::with_payload(Payload::HwFrame(frame))
    }

    fn with_payload(payload: Payload) -> Self {
        Self {
            payload,
            dts: None,
            cts: None,
            duration: 0,
            sap: Sap::None,
            framing_start: true,
            framing_end: true,
            interlacing: Interlacing::Progressive,
        }
    }

    /// Builder: set the decode timestamp.
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Builder: set the composition timestamp.
    pub fn with_cts(mut self, cts: u64) -> Self {
        self.cts = Some(cts);
        self
    }

    /// Builder: set the duration.
    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    /// Builder: set the random access level.
    pub fn with_sap(mut self, sap: Sap) -> Self {
        self.sap = sap;
        self
    }

    /// Builder: set framing flags.
    pub fn with_framing(mut self, start: bool, end: bool) -> Self {
        self.framing_start = start;
        self.framing_end = end;
        self
    }

    /// Builder: set interlacing.
    pub fn with_interlacing(mut self, interlacing: Interlacing) -> Self {
        self.interlacing = interlacing;
        self
    }

    /// Payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Payload bytes, or `None` for hardware frames.
    pub fn data(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Data(bytes) => Some(bytes),
            Payload::HwFrame(_) => None,
        }
    }

    /// Hardware frame, if the payload is one.
    pub fn hw_frame(&self) -> Option<&Arc<dyn HwFrame>> {
        match &self.payload {
            Payload::HwFrame(frame) => Some(frame),
            Payload::Data(_) => None,
        }
    }

    /// Payload size in bytes (0 for hardware frames).
    pub fn size(&self) -> usize {
        self.data().map_or(0, Bytes::len)
    }

    /// Decode timestamp.
    pub fn dts(&self) -> Option<u64> {
        self.dts
    }

    /// Composition timestamp.
    pub fn cts(&self) -> Option<u64> {
        self.cts
    }

    /// Duration.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Random access level.
    pub fn sap(&self) -> Sap {
        self.sap
    }

    /// Whether this packet starts a frame.
    pub fn framing_start(&self) -> bool {
        self.framing_start
    }

    /// Whether this packet ends a frame.
    pub fn framing_end(&self) -> bool {
        self.framing_end
    }

    /// Interlacing.
    pub fn interlacing(&self) -> Interlacing {
        self.interlacing
    }
}
