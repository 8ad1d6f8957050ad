//! Async read adapter
//!
//! Input reads block on the session queue, so async callers run them on
//! tokio's blocking pool instead of stalling a runtime worker.

use crate::context::HidContext;
use crate::error::{HidError, Result};
use crate::registry::SessionId;
use std::sync::Arc;

impl HidContext {
    /// [`HidContext::read_timeout`] on the blocking pool
    pub async fn read_timeout_async(
        self: &Arc<Self>,
        id: SessionId,
        length: usize,
        milliseconds: i32,
    ) -> Result<Vec<u8>> {
        let ctx = Arc::clone(self);
        tokio::task::spawn_blocking(move || ctx.read_timeout(id, length, milliseconds))
            .await
            .map_err(|e| HidError::transport(format!("Read task failed: {}", e)))?
    }

    /// [`HidContext::read`] on the blocking pool
    pub async fn read_async(self: &Arc<Self>, id: SessionId, length: usize) -> Result<Vec<u8>> {
        let ctx = Arc::clone(self);
        tokio::task::spawn_blocking(move || ctx.read(id, length))
            .await
            .map_err(|e| HidError::transport(format!("Read task failed: {}", e)))?
    }
}
