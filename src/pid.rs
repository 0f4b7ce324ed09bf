//! Pids: typed endpoints connecting a producing filter to a consumer.
//!
//! A [`Pid`] is a cheap cloneable handle. The producer sees it as one of
//! its outputs and sets properties and sends packets on it; the consumer
//! sees the same pid as one of its inputs and reads properties and pulls
//! packets. Each side only touches the channel under its lock, so one
//! producer and one consumer may live on different threads.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::channel::{ChannelStats, PacketChannel, WaterMarks};
use crate::error::{Error, Result};
use crate::filter::FilterId;
use crate::observability;
use crate::packet::Packet;
use crate::property::{PropertyKey, PropertyMap, PropertyValue};

/// Session-unique pid identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PidId(pub u32);

impl fmt::Display for PidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Link {
    consumer: Option<FilterId>,
    seen_version: u64,
}

#[derive(Debug)]
struct PidInner {
    id: PidId,
    owner: FilterId,
    filter: RwLock<String>,
    name: RwLock<String>,
    props: RwLock<PropertyMap>,
    version: AtomicU64,
    caps: RwLock<PropertyMap>,
    proposals: Mutex<PropertyMap>,
    channel: Mutex<PacketChannel>,
    removed: AtomicBool,
    full_frames: AtomicBool,
    link: Mutex<Link>,
}

/// Handle to a pid.
#[derive(Clone)]
pub struct Pid {
    inner: Arc<PidInner>,
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pid")
            .field("id", &self.inner.id)
            .field("owner", &self.inner.owner)
            .field("name", &*self.inner.name.read())
            .finish()
    }
}

impl PartialEq for Pid {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Pid {}

impl Pid {
    pub(crate) fn new(id: PidId, owner: FilterId, marks: WaterMarks) -> Self {
        Self {
            inner: Arc::new(PidInner {
                id,
                owner,
                filter: RwLock::new(String::new()),
                name: RwLock::new(id.to_string()),
                props: RwLock::new(PropertyMap::new()),
                version: AtomicU64::new(0),
                caps: RwLock::new(PropertyMap::new()),
                proposals: Mutex::new(PropertyMap::new()),
                channel: Mutex::new(PacketChannel::new(marks)),
                removed: AtomicBool::new(false),
                full_frames: AtomicBool::new(false),
                link: Mutex::new(Link::default()),
            }),
        }
    }

    /// Pid identifier.
    pub fn id(&self) -> PidId {
        self.inner.id
    }

    /// Filter producing on this pid.
    pub fn owner(&self) -> FilterId {
        self.inner.owner
    }

    /// Name of the producing filter, used to label pid metrics.
    pub fn filter_name(&self) -> String {
        self.inner.filter.read().clone()
    }

    pub(crate) fn set_filter_name(&self, name: &str) {
        let mut filter = self.inner.filter.write();
        filter.clear();
        filter.push_str(name);
    }

    /// Pid name.
    pub fn name(&self) -> String {
        self.inner.name.read().clone()
    }

    /// Rename the pid.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.inner.name.write() = name.into();
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Attach or overwrite a property, visible immediately to readers.
    pub fn set_property(&self, key: PropertyKey, value: impl Into<PropertyValue>) {
        if self.inner.props.write().set(key, value) {
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Remove a property.
    pub fn remove_property(&self, key: PropertyKey) {
        if self.inner.props.write().remove(key).is_some() {
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Current value of a property. Absence is a normal answer.
    pub fn get_property(&self, key: PropertyKey) -> Option<PropertyValue> {
        self.inner.props.read().get(key).cloned()
    }

    /// Consistent snapshot of every property.
    pub fn properties(&self) -> PropertyMap {
        self.inner.props.read().clone()
    }

    /// Run `f` on the property map under a single read lock.
    pub fn with_properties<R>(&self, f: impl FnOnce(&PropertyMap) -> R) -> R {
        f(&self.inner.props.read())
    }

    /// Copy every property of `src` onto this pid.
    pub fn copy_properties(&self, src: &Pid) {
        if Arc::ptr_eq(&self.inner, &src.inner) {
            return;
        }
        let snapshot = src.properties();
        let mut props = self.inner.props.write();
        let mut changed = false;
        for (key, value) in snapshot.iter() {
            changed |= props.set(key, value.clone());
        }
        if changed {
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Property version, bumped on every effective write.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Probe a candidate property the downstream chain would like this pid
    /// to carry, as opposed to the committed value.
    pub fn caps_query(&self, key: PropertyKey) -> Option<PropertyValue> {
        self.inner.caps.read().get(key).cloned()
    }

    /// Ask the producer to switch a property to `value`.
    ///
    /// Called by the consumer from `configure_pid`. The session forwards
    /// the proposals to the producer once the consumer returns and calls
    /// `configure_pid` again after the producer adopted them.
    pub fn negotiate_property(&self, key: PropertyKey, value: impl Into<PropertyValue>) {
        let value = value.into();
        tracing::debug!(pid = %self.id(), key = %key, value = %value, "property negotiation requested");
        self.inner.proposals.lock().set(key, value);
    }

    /// Pending proposals, without consuming them.
    pub fn negotiated_properties(&self) -> PropertyMap {
        self.inner.proposals.lock().clone()
    }

    /// Whether a negotiation is pending.
    pub fn has_pending_negotiation(&self) -> bool {
        !self.inner.proposals.lock().is_empty()
    }

    pub(crate) fn take_proposals(&self) -> PropertyMap {
        std::mem::take(&mut *self.inner.proposals.lock())
    }

    pub(crate) fn set_caps_hints(&self, caps: PropertyMap) {
        *self.inner.caps.write() = caps;
    }

    /// Ask the producer to deliver complete frames only.
    pub fn set_framing_mode(&self, full_frames: bool) {
        self.inner.full_frames.store(full_frames, Ordering::Release);
    }

    /// Whether the consumer asked for complete frames.
    pub fn full_frames(&self) -> bool {
        self.inner.full_frames.load(Ordering::Acquire)
    }

    // ========================================================================
    // Packets
    // ========================================================================

    /// Queue a packet for the consumer.
    ///
    /// Producers check [`Pid::would_block`] before creating packets; this
    /// call does not enforce it.
    pub fn send(&self, packet: Packet) -> Result<()> {
        if self.is_removed() {
            return Err(Error::PidRemoved(self.name()));
        }
        let size = packet.size();
        let (queued, depth) = {
            let mut channel = self.inner.channel.lock();
            let queued = channel.push(packet);
            (queued, channel.len())
        };
        if queued {
            let (filter, name) = (self.filter_name(), self.name());
            observability::record_packet_sent(&filter, &name, size);
            observability::record_queue_depth(&filter, &name, depth);
        } else {
            tracing::trace!(pid = %self.id(), "packet discarded, pid has no consumer");
        }
        Ok(())
    }

    /// Head packet of the queue, without releasing it.
    ///
    /// Calling it again returns the same packet until
    /// [`Pid::drop_packet`] is called.
    pub fn get_packet(&self) -> Option<Packet> {
        self.inner.channel.lock().peek().cloned()
    }

    /// Release the head packet.
    pub fn drop_packet(&self) {
        let (dropped, depth) = {
            let mut channel = self.inner.channel.lock();
            let dropped = channel.pop().is_some();
            (dropped, channel.len())
        };
        if dropped {
            let (filter, name) = (self.filter_name(), self.name());
            observability::record_packet_dropped(&filter, &name);
            observability::record_queue_depth(&filter, &name, depth);
        }
    }

    /// Whether the producer must not create new packets for now.
    pub fn would_block(&self) -> bool {
        let blocked = self.inner.channel.lock().would_block();
        if blocked {
            observability::record_backpressure_stall(&self.filter_name(), &self.name());
        }
        blocked
    }

    /// Signal end of stream after the queued packets.
    pub fn set_eos(&self) {
        tracing::debug!(pid = %self.id(), "end of stream");
        self.inner.channel.lock().set_eos();
    }

    /// Whether end of stream was reached: signaled and fully consumed.
    pub fn is_eos(&self) -> bool {
        self.inner.channel.lock().is_eos()
    }

    /// Whether the producer signaled end of stream.
    pub fn eos_signaled(&self) -> bool {
        self.inner.channel.lock().eos_signaled()
    }

    /// Whether at least one packet is queued.
    pub fn has_packets(&self) -> bool {
        !self.inner.channel.lock().is_empty()
    }

    /// Number of queued packets.
    pub fn queued_packets(&self) -> usize {
        self.inner.channel.lock().len()
    }

    /// Channel counters.
    pub fn stats(&self) -> ChannelStats {
        self.inner.channel.lock().stats()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Whether the pid was removed by its producer.
    pub fn is_removed(&self) -> bool {
        self.inner.removed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_removed(&self) {
        self.inner.removed.store(true, Ordering::Release);
    }

    /// Consumer filter, if linked.
    pub fn consumer(&self) -> Option<FilterId> {
        self.inner.link.lock().consumer
    }

    /// Whether the pid throws packets away for lack of a consumer.
    pub fn is_discarding(&self) -> bool {
        self.inner.channel.lock().is_discarding()
    }

    pub(crate) fn link_to(&self, consumer: FilterId) {
        let mut link = self.inner.link.lock();
        link.consumer = Some(consumer);
        link.seen_version = self.version();
        self.inner.channel.lock().set_discard(false);
    }

    pub(crate) fn unlink(&self) -> Option<FilterId> {
        self.inner.link.lock().consumer.take()
    }

    pub(crate) fn set_discard(&self, discard: bool) {
        self.inner.channel.lock().set_discard(discard);
    }

    pub(crate) fn seen_version(&self) -> u64 {
        self.inner.link.lock().seen_version
    }

    pub(crate) fn mark_seen(&self, version: u64) {
        self.inner.link.lock().seen_version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{PixelFormat, StreamType};

    fn pid() -> Pid {
        Pid::new(PidId(1), FilterId(0), WaterMarks::new(2, 0))
    }

    #[test]
    fn test_property_version() {
        let pid = pid();
        assert_eq!(pid.version(), 0);
        pid.set_property(PropertyKey::StreamType, StreamType::Visual);
        assert_eq!(pid.version(), 1);
        pid.set_property(PropertyKey::StreamType, StreamType::Visual);
        assert_eq!(pid.version(), 1);
        pid.remove_property(PropertyKey::Width);
        assert_eq!(pid.version(), 1);
        pid.remove_property(PropertyKey::StreamType);
        assert_eq!(pid.version(), 2);
    }

    #[test]
    fn test_copy_properties() {
        let src = pid();
        src.set_property(PropertyKey::Width, 320u32);
        src.set_property(PropertyKey::Height, 240u32);
        let dst = Pid::new(PidId(2), FilterId(1), WaterMarks::default());
        dst.set_property(PropertyKey::Id, 7u32);
        dst.copy_properties(&src);

        let props = dst.properties();
        assert_eq!(props.len(), 3);
        assert_eq!(props.u32(PropertyKey::Width), Some(320));
        assert_eq!(props.u32(PropertyKey::Id), Some(7));
    }

    #[test]
    fn test_negotiation_proposals() {
        let pid = pid();
        assert!(!pid.has_pending_negotiation());
        pid.negotiate_property(PropertyKey::PixelFormat, PixelFormat::Nv12);
        assert!(pid.has_pending_negotiation());
        let proposals = pid.take_proposals();
        assert_eq!(proposals.pixel_format(), Some(PixelFormat::Nv12));
        assert!(!pid.has_pending_negotiation());
    }

    #[test]
    fn test_caps_query_is_separate_from_properties() {
        let pid = pid();
        pid.set_caps_hints(PropertyMap::new().with(PropertyKey::Stride, 512u32));
        assert!(pid.get_property(PropertyKey::Stride).is_none());
        assert_eq!(
            pid.caps_query(PropertyKey::Stride).and_then(|v| v.as_uint()),
            Some(512)
        );
    }

    #[test]
    fn test_single_outstanding_packet() {
        let pid = pid();
        pid.send(Packet::new(vec![1u8]).with_cts(1)).expect("send");
        pid.send(Packet::new(vec![2u8]).with_cts(2)).expect("send");
        assert!(pid.would_block());

        let first = pid.get_packet().and_then(|p| p.cts());
        let again = pid.get_packet().and_then(|p| p.cts());
        assert_eq!(first, again);
        pid.drop_packet();
        assert_eq!(pid.get_packet().and_then(|p| p.cts()), Some(2));
    }

    #[test]
    fn test_send_on_removed_pid() {
        let pid = pid();
        pid.mark_removed();
        assert!(matches!(
            pid.send(Packet::new(vec![0u8])),
            Err(Error::PidRemoved(_))
        ));
    }

    #[test]
    fn test_link_clears_discard() {
        let pid = pid();
        pid.set_discard(true);
        pid.send(Packet::new(vec![0u8])).expect("send");
        assert!(!pid.has_packets());

        pid.link_to(FilterId(3));
        assert_eq!(pid.consumer(), Some(FilterId(3)));
        pid.send(Packet::new(vec![0u8])).expect("send");
        assert!(pid.has_packets());
        assert_eq!(pid.unlink(), Some(FilterId(3)));
    }
}
