//! Handler contract invoked by the dispatch loop.
//!
//! Handlers are supplied by the integrator; the core never enumerates them.
//! Each queue has exactly one handler and its deliveries are handled one at a
//! time, so a handler is never called concurrently with itself for the same
//! queue. Handlers of different queues run independently.

use std::future::Future;

use async_trait::async_trait;

/// Processes the payload of one delivery.
///
/// An error is terminal for that delivery: it is logged by the dispatch loop
/// and the message is dropped. Implementations must not block indefinitely,
/// since that stalls every later delivery on the same queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()>;
}

/// Handler backed by an async closure.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a `MessageHandler`.
///
/// The closure receives an owned copy of the payload.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<()> {
        (self.f)(payload.to_vec()).await
    }
}
