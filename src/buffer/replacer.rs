use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::{Error, Result};

use super::{FrameId, Replacer};

struct LRUKNode {
    /// Total accesses observed for the frame.
    count: u64,
    /// Up to k most recent access timestamps, oldest in front. Once the
    /// frame has k accesses this holds exactly k entries and the front is
    /// the k-th most recent access.
    history: VecDeque<u64>,
    evictable: bool,
}

impl LRUKNode {
    fn new(timestamp: u64, k: usize) -> Self {
        let mut history = VecDeque::with_capacity(k);
        history.push_back(timestamp);
        LRUKNode { count: 1, history, evictable: false }
    }

    fn record(&mut self, timestamp: u64, k: usize) {
        self.count += 1;
        if self.history.len() == k {
            self.history.pop_front();
        }
        self.history.push_back(timestamp);
    }

    /// Timestamp of the k-th most recent access. Only called for frames
    /// in the cache queue, whose history is full, so front() exists.
    fn kth_recent(&self) -> u64 {
        *self.history.front().unwrap()
    }
}

/// LRUKReplacer implements the LRU-k replacement policy.
///
/// The LRU-k algorithm evicts the frame whose backward k-distance is the
/// maximum over all evictable frames. Backward k-distance is the
/// difference between the current timestamp and the timestamp of the k-th
/// previous access.
///
/// A frame with fewer than k recorded accesses is given +inf as its
/// backward k-distance. When multiple frames have +inf backward
/// k-distance, the tie breaks FIFO on first observation: the frame that
/// entered the replacer earliest goes first, regardless of how recently
/// it was touched since.
pub struct LRUKReplacer {
    k: usize,
    /// Exclusive upper bound of the frame id space.
    capacity: usize,
    /// Logical clock, bumped on every recorded access.
    clock: u64,
    /// Count of evictable tracked frames.
    curr_size: usize,
    nodes: HashMap<FrameId, LRUKNode>,
    /// Frames with fewer than k accesses, in first-observation order with
    /// the oldest at the front. Later accesses never reorder this queue.
    history: VecDeque<FrameId>,
    /// Frames with at least k accesses. Membership only: the victim among
    /// these is chosen by comparing k-th most recent access timestamps,
    /// so the queue order itself does not encode the policy.
    cache: VecDeque<FrameId>,
}

impl LRUKReplacer {
    pub fn new(k: usize, capacity: usize) -> Self {
        assert!(k > 0, "replacer k must be greater than zero");
        LRUKReplacer {
            k,
            capacity,
            clock: 0,
            curr_size: 0,
            nodes: HashMap::new(),
            history: VecDeque::new(),
            cache: VecDeque::new(),
        }
    }

    /// Record an access to the given frame at the current timestamp. A
    /// frame seen for the first time starts non-evictable; a frame
    /// reaching its k-th access migrates from the history queue to the
    /// cache queue.
    fn record_access(&mut self, frame_id: FrameId) -> Result<()> {
        if frame_id >= self.capacity {
            return Err(Error::invariant(format!(
                "frame id {} out of range, capacity {}",
                frame_id, self.capacity
            )));
        }
        self.clock += 1;
        match self.nodes.get_mut(&frame_id) {
            None => {
                self.nodes.insert(frame_id, LRUKNode::new(self.clock, self.k));
                if self.k == 1 {
                    self.cache.push_back(frame_id);
                } else {
                    self.history.push_back(frame_id);
                }
            }
            Some(node) => {
                node.record(self.clock, self.k);
                if node.count == self.k as u64 {
                    if let Some(pos) = self.history.iter().position(|&f| f == frame_id) {
                        self.history.remove(pos);
                    }
                    self.cache.push_back(frame_id);
                }
            }
        }
        Ok(())
    }

    /// Pick and drop the evictable frame with the greatest backward
    /// k-distance: any history frame (+inf distance, FIFO tie-break)
    /// beats every cache frame; among cache frames the oldest k-th most
    /// recent access wins.
    fn evict(&mut self) -> Option<FrameId> {
        if let Some(pos) = self.history.iter().position(|f| self.nodes[f].evictable) {
            let frame_id = self.history[pos];
            self.history.remove(pos);
            self.nodes.remove(&frame_id);
            self.curr_size -= 1;
            return Some(frame_id);
        }

        let victim = self
            .cache
            .iter()
            .copied()
            .filter(|f| self.nodes[f].evictable)
            .min_by_key(|f| self.nodes[f].kth_recent())?;
        if let Some(pos) = self.cache.iter().position(|&f| f == victim) {
            self.cache.remove(pos);
        }
        self.nodes.remove(&victim);
        self.curr_size -= 1;
        Some(victim)
    }

    /// Toggle whether a frame is evictable, keeping `curr_size` equal to
    /// the number of evictable tracked frames. Unknown frames are left
    /// alone.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let node = match self.nodes.get_mut(&frame_id) {
            None => return,
            Some(node) => node,
        };
        if node.evictable == evictable {
            return;
        }
        node.evictable = evictable;
        if evictable {
            self.curr_size += 1;
        } else {
            self.curr_size -= 1;
        }
    }

    /// Remove a specific frame with its access history, regardless of its
    /// backward k-distance. Unknown frames are a no-op; a non-evictable
    /// frame cannot be removed.
    fn remove(&mut self, frame_id: FrameId) -> Result<()> {
        let (count, evictable) = match self.nodes.get(&frame_id) {
            None => return Ok(()),
            Some(node) => (node.count, node.evictable),
        };
        if !evictable {
            return Err(Error::invariant(format!("removing non-evictable frame {}", frame_id)));
        }
        let queue = if count < self.k as u64 { &mut self.history } else { &mut self.cache };
        if let Some(pos) = queue.iter().position(|&f| f == frame_id) {
            queue.remove(pos);
        }
        self.nodes.remove(&frame_id);
        self.curr_size -= 1;
        Ok(())
    }

    fn size(&self) -> usize {
        self.curr_size
    }
}

/// SyncLRUKReplacer implements the thread-safe version of the LRU-k
/// replacement policy, basically all the heavy lifting happens in the
/// LRUKReplacer.
pub struct SyncLRUKReplacer {
    inner: Mutex<LRUKReplacer>,
}

impl SyncLRUKReplacer {
    pub fn new(k: usize, capacity: usize) -> Self {
        let inner = Mutex::new(LRUKReplacer::new(k, capacity));
        SyncLRUKReplacer { inner }
    }
}

impl Replacer for SyncLRUKReplacer {
    fn record_access(&self, frame_id: FrameId) -> Result<()> {
        let mut guard = self.inner.lock()?;
        guard.record_access(frame_id)
    }

    fn evict(&self) -> Option<FrameId> {
        let mut guard = self.inner.lock().unwrap();
        guard.evict()
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut guard = self.inner.lock().unwrap();
        guard.set_evictable(frame_id, evictable)
    }

    fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut guard = self.inner.lock()?;
        guard.remove(frame_id)
    }

    fn size(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_fifo_by_first_observation() -> Result<()> {
        // k = 3: no frame ever reaches k accesses, all distances are
        // +inf. Re-accessing frame 0 must not move it behind frame 1.
        let mut replacer = LRUKReplacer::new(3, 4);
        replacer.record_access(0)?;
        replacer.record_access(1)?;
        replacer.record_access(0)?;
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);

        assert_eq!(Some(0), replacer.evict());
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(None, replacer.evict());
        Ok(())
    }

    #[test]
    fn test_cache_victim_by_kth_recent_access() -> Result<()> {
        // k = 2. Frame 0 is accessed at times 1 and 4, frame 1 at times
        // 2 and 3. Frame 0 has the older second-most-recent access
        // (1 < 2), hence the greater backward k-distance, even though its
        // latest access is the most recent of all.
        let mut replacer = LRUKReplacer::new(2, 4);
        replacer.record_access(0)?;
        replacer.record_access(1)?;
        replacer.record_access(1)?;
        replacer.record_access(0)?;
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);

        assert_eq!(Some(0), replacer.evict());
        assert_eq!(Some(1), replacer.evict());
        Ok(())
    }

    #[test]
    fn test_k_equals_one_degenerates_to_lru() -> Result<()> {
        let mut replacer = LRUKReplacer::new(1, 4);
        replacer.record_access(0)?;
        replacer.record_access(1)?;
        replacer.record_access(2)?;
        replacer.record_access(0)?;
        for f in 0..3 {
            replacer.set_evictable(f, true);
        }

        assert_eq!(Some(1), replacer.evict());
        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(0), replacer.evict());
        Ok(())
    }

    #[test]
    fn test_out_of_range_frame_id() {
        let mut replacer = LRUKReplacer::new(2, 4);
        assert!(replacer.record_access(4).is_err());
        assert!(replacer.record_access(3).is_ok());
    }

    #[test]
    fn test_remove_semantics() -> Result<()> {
        let mut replacer = LRUKReplacer::new(2, 4);
        replacer.record_access(0)?;
        replacer.record_access(1)?;

        // untracked: no-op
        replacer.remove(3)?;
        assert_eq!(0, replacer.size());

        // non-evictable: invariant violation
        assert!(replacer.remove(0).is_err());

        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);
        assert_eq!(2, replacer.size());
        replacer.remove(0)?;
        assert_eq!(1, replacer.size());
        assert_eq!(Some(1), replacer.evict());
        Ok(())
    }

    #[test]
    fn test_set_evictable_bookkeeping() -> Result<()> {
        let mut replacer = LRUKReplacer::new(2, 4);
        replacer.record_access(0)?;
        assert_eq!(0, replacer.size());

        replacer.set_evictable(0, true);
        assert_eq!(1, replacer.size());
        // idempotent
        replacer.set_evictable(0, true);
        assert_eq!(1, replacer.size());
        replacer.set_evictable(0, false);
        assert_eq!(0, replacer.size());
        // unknown frame: ignored
        replacer.set_evictable(2, true);
        assert_eq!(0, replacer.size());

        // nothing evictable
        assert_eq!(None, replacer.evict());
        Ok(())
    }

    #[test]
    fn test_lruk_replacer() -> Result<()> {
        let mut replacer = LRUKReplacer::new(2, 7);

        // Scenario: add six frames. Frames 1-5 are evictable, 6 is not.
        for f in 1..=6 {
            replacer.record_access(f)?;
        }
        for f in 1..=5 {
            replacer.set_evictable(f, true);
        }
        replacer.set_evictable(6, false);
        assert_eq!(5, replacer.size());

        // Scenario: frame 1 gets a second access and moves to the cache
        // queue. Every other frame still has +inf backward k-distance,
        // so the eviction order becomes [2, 3, 4, 5, 1].
        replacer.record_access(1)?;

        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(3), replacer.evict());
        assert_eq!(Some(4), replacer.evict());
        assert_eq!(2, replacer.size());

        // Scenario: 3 and 4 come back with fresh histories, 5 reaches
        // the cache queue, and 4 reaches it too.
        replacer.record_access(3)?;
        replacer.record_access(4)?;
        replacer.record_access(5)?;
        replacer.record_access(4)?;
        replacer.set_evictable(3, true);
        replacer.set_evictable(4, true);
        assert_eq!(4, replacer.size());

        // 3 is the only history frame, so it goes first.
        assert_eq!(Some(3), replacer.evict());
        assert_eq!(3, replacer.size());

        // Frame 6 still has a single access from the very beginning;
        // once evictable it is the oldest +inf frame and goes next.
        replacer.set_evictable(6, true);
        assert_eq!(4, replacer.size());
        assert_eq!(Some(6), replacer.evict());
        assert_eq!(3, replacer.size());

        // Cache frames left: 1, 5, 4. Pinning 1 leaves 5 with the oldest
        // k-th most recent access.
        replacer.set_evictable(1, false);
        assert_eq!(2, replacer.size());
        assert_eq!(Some(5), replacer.evict());
        assert_eq!(1, replacer.size());

        // Two more accesses push frame 1's k-th most recent access past
        // frame 4's. Victim order is [4, 1].
        replacer.record_access(1)?;
        replacer.record_access(1)?;
        replacer.set_evictable(1, true);
        assert_eq!(2, replacer.size());
        assert_eq!(Some(4), replacer.evict());
        assert_eq!(1, replacer.size());
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(0, replacer.size());

        // Operations on an empty replacer change nothing.
        assert_eq!(None, replacer.evict());
        assert_eq!(0, replacer.size());
        replacer.remove(1)?;
        assert_eq!(0, replacer.size());
        Ok(())
    }
}
