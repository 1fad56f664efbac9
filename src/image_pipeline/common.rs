//! Common utilities module
//!
//! Shared error type, the compute context every merge stage runs in and the
//! buffer pool that backs its scratch storage.

pub mod error;
pub mod context;
pub mod buffer_pool;

pub use error::{MergeError, Result};
pub use context::ComputeContext;
pub use buffer_pool::{BufferFormat, BufferKey, BufferPool, PooledBuffer};
