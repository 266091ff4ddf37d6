//! Simple stateless pub-sub event plumbing.
//!
//! Components subscribe to engine events (audit entries, completed payments) and react to them.
//! Handlers receive only the event itself, never engine state. Events from one channel are
//! handled strictly in publication order.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc;

pub type Hook<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventChannel<E: Send + Sync + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    hook: Hook<E>,
}

impl<E: Send + Sync + 'static> EventChannel<E> {
    pub fn new(buffer_size: usize, hook: Hook<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { receiver, sender, hook }
    }

    pub fn subscribe(&self) -> EventEmitter<E> {
        EventEmitter::new(self.sender.clone())
    }

    /// Drain events until every emitter has been dropped. Events are handled one at a time, in
    /// order.
    pub async fn run(mut self) {
        debug!("📬️ Event channel running");
        // Without this drop the channel would keep itself alive through its own sender.
        drop(self.sender);
        while let Some(event) = self.receiver.recv().await {
            trace!("📬️ Handling event");
            (self.hook)(event).await;
        }
        debug!("📬️ Event channel drained; shutting down");
    }
}

#[derive(Clone)]
pub struct EventEmitter<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventEmitter<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to publish event: {e}");
        }
    }
}
