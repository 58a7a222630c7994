//! Simple stateless pub-sub event handler
//!
//! Components subscribe to gateway events through hooks and react to them. Handlers are stateless: all they receive
//! is the event itself. Each handler owns a bounded channel and runs every event in its own task, so a slow handler
//! only ever back-pressures publishers through its own channel.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    name: String,
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(name: &str, buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { name: name.to_string(), listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for in-flight handler tasks to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler [{}]", self.name);
        // Drop the internal sender so that the handler shuts down once the last producer goes away
        drop(self.sender);
        let mut jobs = JoinSet::new();
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ [{}] Handling event", self.name);
            let handler = Arc::clone(&self.handler);
            jobs.spawn(async move { (handler)(ev).await });
            // Reap whatever has already finished so the set does not grow without bound
            while let Some(result) = jobs.try_join_next() {
                log_outcome(&self.name, result);
            }
        }
        if !jobs.is_empty() {
            debug!("📬️ [{}] Waiting for {} jobs to complete", self.name, jobs.len());
        }
        while let Some(result) = jobs.join_next().await {
            log_outcome(&self.name, result);
        }
        debug!("📬️ Event handler [{}] has shut down", self.name);
    }
}

fn log_outcome(name: &str, result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ [{name}] Event handled"),
        Err(e) if e.is_panic() => error!("📬️ [{name}] Event handler panicked. The event was dropped. {e}"),
        Err(e) => warn!("📬️ [{name}] Event handler task was cancelled. {e}"),
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}
