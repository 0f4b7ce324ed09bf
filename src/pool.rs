//! Output pid pool keyed by stream category.
//!
//! Source filters that re-open a new source keep the pids they already
//! declared: releasing the pool marks every pid unused without removing
//! it, and the next declaration of a stream of the same category picks an
//! unused pid back up. Downstream filters thus keep their links across
//! source switches.

use crate::format::StreamType;
use crate::pid::Pid;

/// A pooled pid with its per-use payload.
#[derive(Debug)]
pub struct PoolEntry<T> {
    pid: Pid,
    category: StreamType,
    in_use: bool,
    data: T,
}

impl<T> PoolEntry<T> {
    /// The pid.
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Stream category this pid was created for.
    pub fn category(&self) -> StreamType {
        self.category
    }

    /// Whether the pid is assigned to a live stream.
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Payload set by the last acquire.
    pub fn data(&self) -> &T {
        &self.data
    }
}

/// Pool of output pids.
#[derive(Debug)]
pub struct PidPool<T> {
    entries: Vec<PoolEntry<T>>,
}

impl<T> Default for PidPool<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> PidPool<T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an unused pid of `category`, or create one with `create`.
    ///
    /// The returned pid is marked in use and tagged with `data`.
    pub fn acquire(&mut self, category: StreamType, data: T, create: impl FnOnce() -> Pid) -> Pid {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| !e.in_use && e.category == category)
        {
            entry.in_use = true;
            entry.data = data;
            return entry.pid.clone();
        }
        let pid = create();
        self.entries.push(PoolEntry {
            pid: pid.clone(),
            category,
            in_use: true,
            data,
        });
        pid
    }

    /// Mark every pid unused. Pids stay declared.
    pub fn release_all(&mut self) {
        for entry in &mut self.entries {
            entry.in_use = false;
        }
    }

    /// Remove every pid from the pool and return them.
    pub fn drain(&mut self) -> Vec<Pid> {
        self.entries.drain(..).map(|e| e.pid).collect()
    }

    /// Iterate over all entries, used or not.
    pub fn iter(&self) -> impl Iterator<Item = &PoolEntry<T>> {
        self.entries.iter()
    }

    /// Iterate over entries in use.
    pub fn active(&self) -> impl Iterator<Item = &PoolEntry<T>> {
        self.entries.iter().filter(|e| e.in_use)
    }

    /// Number of pooled pids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool holds no pid.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pids in use.
    pub fn in_use_count(&self) -> usize {
        self.active().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::WaterMarks;
    use crate::filter::FilterId;
    use crate::pid::PidId;

    fn maker(next: &mut u32) -> impl FnOnce() -> Pid + '_ {
        move || {
            *next += 1;
            Pid::new(PidId(*next), FilterId(0), WaterMarks::default())
        }
    }

    #[test]
    fn test_acquire_creates_per_category() {
        let mut next = 0;
        let mut pool = PidPool::new();
        let v = pool.acquire(StreamType::Visual, 0u32, maker(&mut next));
        let a = pool.acquire(StreamType::Audio, 0u32, maker(&mut next));
        let v2 = pool.acquire(StreamType::Visual, 1u32, maker(&mut next));
        assert_ne!(v, v2);
        assert_ne!(v, a);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.in_use_count(), 3);
    }

    #[test]
    fn test_release_preserves_identity() {
        let mut next = 0;
        let mut pool = PidPool::new();
        let v = pool.acquire(StreamType::Visual, 0u32, maker(&mut next));
        let a = pool.acquire(StreamType::Audio, 0u32, maker(&mut next));
        pool.release_all();
        assert_eq!(pool.in_use_count(), 0);

        let a2 = pool.acquire(StreamType::Audio, 5u32, maker(&mut next));
        assert_eq!(a, a2);
        assert_eq!(pool.len(), 2);
        assert_eq!(next, 2);

        let tagged: Vec<_> = pool.active().map(|e| *e.data()).collect();
        assert_eq!(tagged, vec![5]);
        assert!(pool.iter().any(|e| e.pid() == &v && !e.in_use()));
    }

    #[test]
    fn test_drain() {
        let mut next = 0;
        let mut pool = PidPool::new();
        pool.acquire(StreamType::Visual, (), maker(&mut next));
        let pids = pool.drain();
        assert_eq!(pids.len(), 1);
        assert!(pool.is_empty());
    }
}
