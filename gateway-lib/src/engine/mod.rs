pub mod buffer_pool;
pub mod relay;

pub use buffer_pool::{BufferPool, PoolParams, PooledBuffer, Tier};
pub use relay::{copy_buffer, relay};
