//! In-process broker used to drive the dispatcher in tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::{Broker, BrokerError, Delivery, DeliveryStream};

fn closed_channel() -> lapin::Error {
    lapin::Error::InvalidChannelState(lapin::ChannelState::Closed)
}

fn rejected(reason: &str) -> lapin::Error {
    lapin::Error::IOError(Arc::new(io::Error::other(reason.to_owned())))
}

#[derive(Default)]
struct State {
    declared: HashSet<String>,
    publishers: HashMap<String, mpsc::UnboundedSender<Delivery>>,
    closed: bool,
}

/// Broker whose queues are unbounded tokio channels.
///
/// Closing drops every sender, which ends all open subscriptions.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
    fail_declare: HashSet<String>,
    fail_subscribe: HashSet<String>,
    pub declare_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub channel_closes: AtomicUsize,
    pub connection_closes: AtomicUsize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_declare(mut self, queue: &str) -> Self {
        self.fail_declare.insert(queue.to_owned());
        self
    }

    pub fn failing_subscribe(mut self, queue: &str) -> Self {
        self.fail_subscribe.insert(queue.to_owned());
        self
    }

    /// Push a payload onto a subscribed queue. Returns false when nobody is
    /// consuming it.
    pub fn publish(&self, queue: &str, data: &[u8]) -> bool {
        let state = self.state.lock().unwrap();
        match state.publishers.get(queue) {
            Some(tx) => tx
                .send(Delivery {
                    queue: queue.to_owned(),
                    data: data.to_vec(),
                })
                .is_ok(),
            None => false,
        }
    }

    pub fn is_declared(&self, queue: &str) -> bool {
        self.state.lock().unwrap().declared.contains(queue)
    }

    pub fn is_subscribed(&self, queue: &str) -> bool {
        self.state.lock().unwrap().publishers.contains_key(queue)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.declare_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrokerError::Declare {
                queue: queue.to_owned(),
                source: closed_channel(),
            });
        }
        if self.fail_declare.contains(queue) {
            return Err(BrokerError::Declare {
                queue: queue.to_owned(),
                source: rejected("PRECONDITION_FAILED - inequivalent arg 'durable'"),
            });
        }
        state.declared.insert(queue.to_owned());
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrokerError::Subscribe {
                queue: queue.to_owned(),
                source: closed_channel(),
            });
        }
        if self.fail_subscribe.contains(queue) {
            return Err(BrokerError::Subscribe {
                queue: queue.to_owned(),
                source: rejected("NOT_FOUND - no queue"),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.publishers.insert(queue.to_owned(), tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (delivery, rx))
        });
        Ok(stream.boxed())
    }

    async fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        state.publishers.clear();
        self.channel_closes.fetch_add(1, Ordering::SeqCst);
        self.connection_closes.fetch_add(1, Ordering::SeqCst);
    }
}
