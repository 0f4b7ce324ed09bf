//! Per-pid packet channel with water-mark back-pressure.
//!
//! ```text
//! Producer ──send──> PacketChannel ──get/drop──> Consumer
//!     ^                                              │
//!     └────────── would_block (FlowSignal::Busy) ────┘
//! ```
//!
//! When the queue fills to its high-water mark the channel switches to
//! [`FlowSignal::Busy`] and producers must stop creating packets for it.
//! It switches back to [`FlowSignal::Ready`] once the consumer drained the
//! queue to the low-water mark. The mark is advisory: `push` never fails
//! because of it, the producer is expected to check `would_block` first.

use std::collections::VecDeque;

use crate::packet::Packet;

/// Flow control signal from a channel to its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FlowSignal {
    /// Normal operation - continue producing.
    #[default]
    Ready = 0,
    /// Channel is full - stop producing until it drains.
    Busy = 1,
}

impl FlowSignal {
    /// Check if production should continue.
    #[inline]
    pub fn should_produce(&self) -> bool {
        matches!(self, FlowSignal::Ready)
    }
}

/// Water mark configuration for a packet channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterMarks {
    /// High water mark - signal back-pressure when reached.
    pub high: usize,
    /// Low water mark - release back-pressure when reached.
    pub low: usize,
}

impl WaterMarks {
    /// Create water marks with explicit high and low values.
    ///
    /// `high` is at least 1 and `low` is kept below `high`.
    pub fn new(high: usize, low: usize) -> Self {
        let high = high.max(1);
        Self {
            high,
            low: low.min(high - 1),
        }
    }

    /// Create water marks from a capacity.
    ///
    /// High = 80% of capacity, Low = 20% of capacity.
    pub fn from_capacity(capacity: usize) -> Self {
        Self::new((capacity * 80) / 100, (capacity * 20) / 100)
    }

    /// Check if level is at or above high water mark.
    #[inline]
    pub fn is_high(&self, level: usize) -> bool {
        level >= self.high
    }

    /// Check if level is at or below low water mark.
    #[inline]
    pub fn is_low(&self, level: usize) -> bool {
        level <= self.low
    }
}

impl Default for WaterMarks {
    fn default() -> Self {
        Self::from_capacity(10)
    }
}

/// Counters kept by a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Packets pushed into the queue.
    pub packets_sent: u64,
    /// Packets released by the consumer.
    pub packets_dropped: u64,
    /// Payload bytes pushed into the queue.
    pub bytes_sent: u64,
    /// Packets thrown away because the channel has no consumer.
    pub packets_discarded: u64,
    /// Number of Ready to Busy transitions.
    pub backpressure_events: u64,
}

/// Queue of packets between one producer and one consumer.
#[derive(Debug)]
pub struct PacketChannel {
    queue: VecDeque<Packet>,
    marks: WaterMarks,
    signal: FlowSignal,
    eos: bool,
    discard: bool,
    stats: ChannelStats,
}

impl PacketChannel {
    /// Create an empty channel.
    pub fn new(marks: WaterMarks) -> Self {
        Self {
            queue: VecDeque::with_capacity(marks.high),
            marks,
            signal: FlowSignal::Ready,
            eos: false,
            discard: false,
            stats: ChannelStats::default(),
        }
    }

    /// Queue a packet. Returns false if the channel discards packets.
    ///
    /// Pushing after end of stream resumes the stream.
    pub fn push(&mut self, packet: Packet) -> bool {
        if self.discard {
            self.stats.packets_discarded += 1;
            return false;
        }
        self.eos = false;
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += packet.size() as u64;
        self.queue.push_back(packet);
        self.update_signal();
        true
    }

    /// Head of the queue.
    pub fn peek(&self) -> Option<&Packet> {
        self.queue.front()
    }

    /// Release the head of the queue.
    pub fn pop(&mut self) -> Option<Packet> {
        let packet = self.queue.pop_front()?;
        self.stats.packets_dropped += 1;
        self.update_signal();
        Some(packet)
    }

    /// Number of queued packets.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no packet is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Current flow signal.
    pub fn signal(&self) -> FlowSignal {
        self.signal
    }

    /// Whether the producer must hold off.
    pub fn would_block(&self) -> bool {
        !self.discard && !self.signal.should_produce()
    }

    /// Mark end of stream after the queued packets.
    pub fn set_eos(&mut self) {
        self.eos = true;
    }

    /// Whether end of stream was signaled, regardless of queued packets.
    pub fn eos_signaled(&self) -> bool {
        self.eos
    }

    /// Whether end of stream was signaled and every packet consumed.
    pub fn is_eos(&self) -> bool {
        self.eos && self.queue.is_empty()
    }

    /// Switch discard mode. Entering it flushes queued packets.
    pub fn set_discard(&mut self, discard: bool) {
        self.discard = discard;
        if discard {
            self.stats.packets_discarded += self.queue.len() as u64;
            self.queue.clear();
            self.signal = FlowSignal::Ready;
        }
    }

    /// Whether the channel discards packets.
    pub fn is_discarding(&self) -> bool {
        self.discard
    }

    /// Counters.
    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Water marks in use.
    pub fn marks(&self) -> WaterMarks {
        self.marks
    }

    fn update_signal(&mut self) {
        let level = self.queue.len();
        match self.signal {
            FlowSignal::Ready if self.marks.is_high(level) => {
                self.signal = FlowSignal::Busy;
                self.stats.backpressure_events += 1;
            }
            FlowSignal::Busy if self.marks.is_low(level) => {
                self.signal = FlowSignal::Ready;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pck(n: u64) -> Packet {
        Packet::new(vec![0u8; 4]).with_cts(n)
    }

    #[test]
    fn test_water_marks() {
        let marks = WaterMarks::from_capacity(100);
        assert_eq!(marks.high, 80);
        assert_eq!(marks.low, 20);
        assert!(marks.is_high(80));
        assert!(marks.is_low(20));

        let clamped = WaterMarks::new(0, 5);
        assert_eq!(clamped.high, 1);
        assert_eq!(clamped.low, 0);
    }

    #[test]
    fn test_backpressure_hysteresis() {
        let mut ch = PacketChannel::new(WaterMarks::new(4, 1));
        for i in 0..3 {
            ch.push(pck(i));
            assert!(!ch.would_block());
        }
        ch.push(pck(3));
        assert!(ch.would_block());

        // Stays busy until the low mark is reached.
        ch.pop();
        assert!(ch.would_block());
        ch.pop();
        assert!(ch.would_block());
        ch.pop();
        assert!(!ch.would_block());
        assert_eq!(ch.stats().backpressure_events, 1);
    }

    #[test]
    fn test_fifo_order_and_peek() {
        let mut ch = PacketChannel::new(WaterMarks::default());
        ch.push(pck(1));
        ch.push(pck(2));
        assert_eq!(ch.peek().and_then(Packet::cts), Some(1));
        assert_eq!(ch.peek().and_then(Packet::cts), Some(1));
        assert_eq!(ch.pop().and_then(|p| p.cts()), Some(1));
        assert_eq!(ch.peek().and_then(Packet::cts), Some(2));
    }

    #[test]
    fn test_eos_after_drain() {
        let mut ch = PacketChannel::new(WaterMarks::default());
        ch.push(pck(1));
        ch.set_eos();
        assert!(ch.eos_signaled());
        assert!(!ch.is_eos());
        ch.pop();
        assert!(ch.is_eos());

        // New data resumes the stream.
        ch.push(pck(2));
        assert!(!ch.eos_signaled());
    }

    #[test]
    fn test_discard_mode() {
        let mut ch = PacketChannel::new(WaterMarks::new(1, 0));
        ch.push(pck(1));
        assert!(ch.would_block());
        ch.set_discard(true);
        assert!(ch.is_empty());
        assert!(!ch.would_block());
        assert!(!ch.push(pck(2)));
        let stats = ch.stats();
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.packets_discarded, 2);
    }
}
