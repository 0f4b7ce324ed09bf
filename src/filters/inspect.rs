//! Inspection sink.
//!
//! Consumes every pid it is given, releases each packet immediately and
//! keeps per-pid statistics in a shared [`InspectReport`]. On each new
//! input it sends PLAY upstream, which is what starts sources.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Result;
use crate::event::FilterEvent;
use crate::filter::{
    ArgDescriptor, CapsBundle, Filter, FilterArgs, FilterCaps, FilterContext, FilterRegister,
    ProcessStatus,
};
use crate::format::{CodecId, StreamType};
use crate::pid::{Pid, PidId};
use crate::property::PropertyKey;

/// Registered name.
pub const NAME: &str = "inspect";

/// Statistics of one inspected pid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PidReport {
    /// Pid identifier.
    pub pid: Option<PidId>,
    /// Value of the `ID` property.
    pub stream_id: Option<u64>,
    /// Stream type when configured.
    pub stream_type: Option<StreamType>,
    /// Codec when configured.
    pub codec_id: Option<CodecId>,
    /// Number of `configure_pid` calls seen.
    pub configures: u32,
    /// Packets received.
    pub packets: u64,
    /// Payload bytes received.
    pub bytes: u64,
    /// CTS of the first packet carrying one.
    pub first_cts: Option<u64>,
    /// CTS of the last packet carrying one.
    pub last_cts: Option<u64>,
    /// Whether every CTS was at least the previous one.
    pub cts_monotonic: bool,
    /// Number of random access packets.
    pub rap_packets: u64,
    /// Whether end of stream was reached.
    pub eos: bool,
    /// Whether the producer removed the pid.
    pub removed: bool,
}

/// Statistics of every pid an inspect instance saw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InspectReport {
    /// Per-pid entries, in link order.
    pub pids: Vec<PidReport>,
}

impl InspectReport {
    /// Entry for a pid.
    pub fn pid(&self, id: PidId) -> Option<&PidReport> {
        self.pids.iter().find(|p| p.pid == Some(id))
    }

    /// Entries of a stream type.
    pub fn of_type(&self, stream_type: StreamType) -> Vec<&PidReport> {
        self.pids
            .iter()
            .filter(|p| p.stream_type == Some(stream_type))
            .collect()
    }

    /// Packets received over all pids.
    pub fn total_packets(&self) -> u64 {
        self.pids.iter().map(|p| p.packets).sum()
    }

    fn entry(&mut self, id: PidId) -> &mut PidReport {
        let index = match self.pids.iter().position(|p| p.pid == Some(id)) {
            Some(index) => index,
            None => {
                self.pids.push(PidReport {
                    pid: Some(id),
                    cts_monotonic: true,
                    ..PidReport::default()
                });
                self.pids.len() - 1
            }
        };
        &mut self.pids[index]
    }
}

/// Handle to a report shared between the sink and the application.
pub type SharedReport = Arc<Mutex<InspectReport>>;

/// Inspection sink.
#[derive(Debug)]
pub struct Inspect {
    inputs: Vec<Pid>,
    report: SharedReport,
    autoplay: bool,
    start: f64,
}

impl Inspect {
    /// Create a sink writing into `report`.
    pub fn with_report(report: SharedReport) -> Self {
        Self {
            inputs: Vec::new(),
            report,
            autoplay: true,
            start: 0.0,
        }
    }

    /// The shared report.
    pub fn report(&self) -> SharedReport {
        self.report.clone()
    }
}

impl Filter for Inspect {
    fn configure_pid(&mut self, ctx: &mut FilterContext<'_>, pid: &Pid, is_remove: bool) -> Result<()> {
        let mut report = self.report.lock();
        let entry = report.entry(pid.id());
        if is_remove {
            entry.removed = true;
            self.inputs.retain(|p| p != pid);
            return Ok(());
        }
        entry.configures += 1;
        pid.with_properties(|props| {
            entry.stream_type = props.stream_type();
            entry.codec_id = props.codec_id();
            entry.stream_id = props.uint(PropertyKey::Id);
        });
        if !self.inputs.contains(pid) {
            self.inputs.push(pid.clone());
            if self.autoplay {
                ctx.send_event(FilterEvent::play(self.start));
            }
        }
        Ok(())
    }

    fn process(&mut self, _ctx: &mut FilterContext<'_>) -> Result<ProcessStatus> {
        let mut report = self.report.lock();
        for pid in &self.inputs {
            let entry = report.entry(pid.id());
            while let Some(pck) = pid.get_packet() {
                entry.packets += 1;
                entry.bytes += pck.size() as u64;
                if pck.sap().is_rap() {
                    entry.rap_packets += 1;
                }
                if let Some(cts) = pck.cts() {
                    if entry.last_cts.is_some_and(|last| cts < last) {
                        entry.cts_monotonic = false;
                    }
                    entry.first_cts.get_or_insert(cts);
                    entry.last_cts = Some(cts);
                }
                pid.drop_packet();
            }
            if pid.is_eos() && !entry.eos {
                tracing::debug!(pid = %pid.id(), packets = entry.packets, "inspected pid reached end of stream");
                entry.eos = true;
            }
        }
        if !self.inputs.is_empty() && self.inputs.iter().all(Pid::is_eos) {
            return Ok(ProcessStatus::Eos);
        }
        Ok(ProcessStatus::Continue)
    }
}

/// Register of the inspection sink with a private report.
pub fn register() -> FilterRegister {
    register_with(SharedReport::default())
}

/// Register whose instances all write into `report`.
pub fn register_with(report: SharedReport) -> FilterRegister {
    FilterRegister::new(NAME, move |args: &FilterArgs| {
        let mut inspect = Inspect::with_report(report.clone());
        inspect.autoplay = args.get_bool("autoplay").unwrap_or(true);
        inspect.start = args.get_double("start").unwrap_or_default();
        Ok(Box::new(inspect) as Box<dyn Filter>)
    })
    .with_description("Packet inspection sink")
    .with_arg(ArgDescriptor::bool("autoplay", true, "send PLAY when a pid is linked"))
    .with_arg(ArgDescriptor::double("start", 0.0, "PLAY start offset in seconds"))
    .with_caps(
        FilterCaps::none().bundle(
            CapsBundle::new()
                .input_any(PropertyKey::StreamType)
                .input_excluded(PropertyKey::StreamType, StreamType::File),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TestHarness;
    use crate::packet::{Packet, Sap};
    use crate::property::PropertyMap;

    #[test]
    fn test_records_packets_and_eos() {
        let mut harness = TestHarness::new(NAME);
        let report = SharedReport::default();
        let mut inspect = Inspect::with_report(report.clone());
        let pid = harness.upstream_pid();
        pid.set_property(PropertyKey::StreamType, StreamType::Audio);
        pid.set_property(PropertyKey::Id, 100u32);

        harness.run(|ctx| inspect.configure_pid(ctx, &pid, false)).expect("configure");
        pid.send(Packet::new(vec![0u8; 4]).with_cts(10).with_sap(Sap::Type1)).expect("send");
        pid.send(Packet::new(vec![0u8; 6]).with_cts(5)).expect("send");
        pid.set_eos();

        let status = harness.run(|ctx| inspect.process(ctx)).expect("process");
        assert_eq!(status, ProcessStatus::Eos);

        let report = report.lock();
        let entry = report.pid(pid.id()).expect("entry");
        assert_eq!(entry.stream_id, Some(100));
        assert_eq!(entry.packets, 2);
        assert_eq!(entry.bytes, 10);
        assert_eq!(entry.rap_packets, 1);
        assert_eq!(entry.first_cts, Some(10));
        assert!(!entry.cts_monotonic);
        assert!(entry.eos);
    }

    #[test]
    fn test_caps_skip_file_pids() {
        let caps = register().caps().clone();
        let file = PropertyMap::new().with(PropertyKey::StreamType, StreamType::File);
        let video = PropertyMap::new().with(PropertyKey::StreamType, StreamType::Visual);
        assert!(!caps.accepts_input(&file));
        assert!(caps.accepts_input(&video));
    }

    #[test]
    fn test_waits_without_inputs() {
        let mut harness = TestHarness::new(NAME);
        let mut inspect = Inspect::with_report(SharedReport::default());
        let status = harness.run(|ctx| inspect.process(ctx)).expect("process");
        assert_eq!(status, ProcessStatus::Continue);
    }
}
