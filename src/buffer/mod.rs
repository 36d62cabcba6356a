use crate::error::Result;

pub mod page;
pub mod pool;
pub mod replacer;

/// Index of a memory slot in the buffer pool, in `[0, pool_size)`.
pub type FrameId = usize;

/// Replacer tracks frame usage and picks victims when the buffer pool is
/// full. Only frames marked evictable are candidates for eviction.
pub trait Replacer: Send + Sync {
    /// Record the event that the given frame id is accessed at the
    /// current timestamp. Create a new entry for the access history if
    /// the frame id has not been seen before.
    ///
    /// A frame id outside the index space the replacer was sized for is
    /// an invariant violation.
    fn record_access(&self, frame_id: FrameId) -> Result<()>;

    /// Find the frame with the largest backward k-distance and evict it.
    ///
    /// Successful eviction decrements the size of the replacer and drops
    /// the frame's access history. Return None if no frame is evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle whether a frame is evictable or non-evictable, adjusting
    /// the replacer size accordingly. Unknown frame ids are ignored.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Remove the given frame with its access history, no matter what
    /// its backward k-distance is. Removing a frame that is currently
    /// non-evictable is an invariant violation; an unknown frame id is a
    /// no-op.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// Number of evictable tracked frames.
    fn size(&self) -> usize;
}
