//! Queue-to-handler dispatch.
//!
//! The `Dispatcher` declares each registered queue on the broker, then runs one
//! dispatch loop per queue. Every loop owns its subscription stream and calls
//! its handler once per delivery, in arrival order, one delivery at a time.
//!
//! ## Flow
//!
//! ```text
//! register(queue, handler)* → start_all() → wait(shutdown) → close() → join()
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::broker::{Broker, BrokerError, DeliveryStream};
use crate::handler::MessageHandler;

/// Registry of queue handlers plus the loops serving them.
pub struct Dispatcher<B: Broker> {
    broker: Arc<B>,
    handlers: BTreeMap<String, Arc<dyn MessageHandler>>,
    loops: JoinSet<()>,
}

impl<B: Broker> Dispatcher<B> {
    /// Create an empty dispatcher over an open broker connection.
    pub fn new(broker: Arc<B>) -> Self {
        Self {
            broker,
            handlers: BTreeMap::new(),
            loops: JoinSet::new(),
        }
    }

    /// Declare `queue` and bind `handler` to it.
    ///
    /// A later registration for the same queue replaces the earlier handler.
    /// Nothing is stored when the declaration fails.
    pub async fn register(
        &mut self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError> {
        self.broker.declare_queue(queue).await?;

        if self.handlers.insert(queue.to_owned(), handler).is_some() {
            warn!(queue = queue, "handler_replaced");
        }

        info!(queue = queue, "queue_registered");
        Ok(())
    }

    /// Subscribe to every registered queue and spawn its dispatch loop.
    ///
    /// Queues are started in name order. The first subscription failure
    /// aborts the remaining startups; loops that already started keep running.
    pub async fn start_all(&mut self) -> Result<(), BrokerError> {
        for (queue, handler) in &self.handlers {
            let stream = self.broker.subscribe(queue).await?;

            self.loops.spawn(run_dispatch_loop(
                queue.clone(),
                stream,
                Arc::clone(handler),
            ));

            info!(queue = %queue, "dispatch_loop_started");
        }

        Ok(())
    }

    /// Names of the registered queues, in startup order.
    pub fn queues(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of dispatch loops that have not been reaped yet.
    pub fn running(&self) -> usize {
        self.loops.len()
    }

    /// Block until `shutdown` resolves or every dispatch loop has ended.
    pub async fn wait<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("dispatcher_shutdown_requested");
                    return;
                }
                joined = self.loops.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!(error = %e, "dispatch_loop_panicked"),
                    None => {
                        warn!("dispatch_loops_exhausted");
                        return;
                    }
                },
            }
        }
    }

    /// Close the broker connection.
    ///
    /// Running loops are not stopped directly; they end once their stream
    /// observes the closed channel.
    pub async fn close(&self) {
        self.broker.close().await;
    }

    /// Wait for every dispatch loop to finish.
    pub async fn join(&mut self) {
        while let Some(joined) = self.loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "dispatch_loop_panicked");
            }
        }
    }
}

/// Serve one queue until its stream closes.
///
/// Handler failures are logged and never end the loop.
pub async fn run_dispatch_loop(
    queue: String,
    mut deliveries: DeliveryStream,
    handler: Arc<dyn MessageHandler>,
) {
    while let Some(delivery) = deliveries.next().await {
        info!(
            queue = %queue,
            body_length = delivery.data.len(),
            "message_received"
        );

        match handler.handle(&delivery.data).await {
            Ok(()) => info!(queue = %queue, "message_handled"),
            Err(e) => warn!(queue = %queue, error = %format!("{e:#}"), "message_handler_failed"),
        }
    }

    info!(queue = %queue, "dispatch_loop_terminated");
}
