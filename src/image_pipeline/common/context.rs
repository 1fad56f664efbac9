use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use super::buffer_pool::BufferPool;
use super::error::{MergeError, Result};

/// Execution context shared by every merge stage.
///
/// Owns the worker pool the data-parallel kernels run on and the buffer pool
/// for their scratch storage. One context is built per pipeline and passed by
/// reference; nothing here is global.
pub struct ComputeContext {
    workers: ThreadPool,
    buffers: BufferPool,
}

impl ComputeContext {
    /// Builds a context with `threads` workers, or one per core when `None`.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("burst-merge-{i}"));
        if let Some(threads) = threads {
            builder = builder.num_threads(threads.max(1));
        }

        let workers = builder
            .build()
            .map_err(|e| MergeError::ThreadPool(e.to_string()))?;

        debug!(threads = workers.current_num_threads(), "Compute context ready");

        Ok(Self {
            workers,
            buffers: BufferPool::new(),
        })
    }

    /// Runs `op` on this context's workers; rayon iterators inside it use them too.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.workers.install(op)
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    pub fn num_threads(&self) -> usize {
        self.workers.current_num_threads()
    }
}

impl std::fmt::Debug for ComputeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeContext")
            .field("threads", &self.num_threads())
            .finish()
    }
}
