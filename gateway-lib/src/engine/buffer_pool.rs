use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Size class of a pooled buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Small,
    Medium,
    Large,
}

impl Tier {
    fn index(self) -> usize {
        match self {
            Tier::Small => 0,
            Tier::Medium => 1,
            Tier::Large => 2,
        }
    }
}

/// Sizes and retention limits for the three buffer tiers.
#[derive(Debug, Clone)]
pub struct PoolParams {
    /// Small tier buffer size in bytes. Default: 2048.
    pub small_size: usize,
    /// Medium tier buffer size in bytes. Default: 8192.
    pub medium_size: usize,
    /// Large tier buffer size in bytes, used by the relay. Default: 32768.
    pub large_size: usize,
    /// Idle buffers kept per tier; extra releases are freed. Default: 256.
    pub max_idle_per_tier: usize,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            small_size: 2 * 1024,
            medium_size: 8 * 1024,
            large_size: 32 * 1024,
            max_idle_per_tier: 256,
        }
    }
}

struct TierSlot {
    size: usize,
    idle: Mutex<Vec<Box<[u8]>>>,
}

impl TierSlot {
    fn new(size: usize) -> Self {
        Self { size, idle: Mutex::new(Vec::new()) }
    }
}

/// Tiered free lists of fixed-size byte buffers.
///
/// Acquisition pops an idle buffer or allocates a fresh one of the tier's
/// size. The lock is only held to push or pop, never while the buffer is used.
pub struct BufferPool {
    tiers: [TierSlot; 3],
    max_idle: usize,
}

impl BufferPool {
    pub fn new(params: &PoolParams) -> Self {
        Self {
            tiers: [
                TierSlot::new(params.small_size),
                TierSlot::new(params.medium_size),
                TierSlot::new(params.large_size),
            ],
            max_idle: params.max_idle_per_tier,
        }
    }

    pub fn buffer_size(&self, tier: Tier) -> usize {
        self.tiers[tier.index()].size
    }

    /// Take a buffer from `tier`. It goes back to the pool when dropped.
    pub fn acquire(self: &Arc<Self>, tier: Tier) -> PooledBuffer {
        let slot = &self.tiers[tier.index()];
        let data = slot
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; slot.size].into_boxed_slice());
        PooledBuffer { tier, data, pool: Arc::clone(self) }
    }

    fn release(&self, tier: Tier, data: Box<[u8]>) {
        let slot = &self.tiers[tier.index()];
        if data.len() != slot.size {
            return;
        }
        let mut idle = slot.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(data);
        }
    }

    /// Number of buffers currently parked in `tier`.
    pub fn idle_count(&self, tier: Tier) -> usize {
        self.tiers[tier.index()].idle.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(&PoolParams::default())
    }
}

/// A buffer on loan from a [`BufferPool`].
pub struct PooledBuffer {
    tier: Tier,
    data: Box<[u8]>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    pub fn tier(&self) -> Tier {
        self.tier
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.release(self.tier, data);
    }
}
