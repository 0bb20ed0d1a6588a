//! Stateless pub-sub plumbing for engine events.
//!
//! Subscribers react to fulfilment events (order confirmed, order refunded) without any access to engine state;
//! all a handler receives is the event payload itself. Handlers are async and each event is dispatched on its own
//! task, so a slow subscriber never blocks checkout.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every subscribed producer has been dropped, then waits for in-flight handler tasks to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // The internal sender must go, otherwise the channel never closes when the last subscriber drops.
        drop(self.sender);
        let mut in_flight: JoinSet<()> = JoinSet::new();
        loop {
            tokio::select! {
                received = self.listener.recv() => match received {
                    Some(ev) => {
                        trace!("📬️ Dispatching event");
                        let handler = Arc::clone(&self.handler);
                        in_flight.spawn(async move { (handler)(ev).await });
                    },
                    None => break,
                },
                Some(finished) = in_flight.join_next() => {
                    if let Err(e) = finished {
                        warn!("📬️ Event handler task failed: {e}");
                    } else {
                        trace!("📬️ Event handled");
                    }
                },
            }
        }
        debug!("📬️ Channel closed. Draining {} in-flight handler task(s)", in_flight.len());
        while let Some(finished) = in_flight.join_next().await {
            if let Err(e) = finished {
                warn!("📬️ Event handler task failed: {e}");
            }
        }
        debug!("📬️ Event handler has shut down");
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

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU64;

    use super::*;

    #[tokio::test]
    async fn events_from_multiple_producers_all_reach_the_handler() {
        let _ = env_logger::try_init();
        let count = Arc::new(AtomicU64::new(0));
        let total = count.clone();
        let handler = Arc::new(move |v| {
            let count = count.clone();
            Box::pin(async move {
                debug!("Handler received {v}");
                let _ = count.fetch_add(v, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(1, handler);
        let producer_1 = event_handler.subscribe();
        let producer_2 = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..5u64 {
                producer_1.publish_event(i * 2 + 1).await;
            }
        });
        tokio::spawn(async move {
            for i in 0..5u64 {
                producer_2.publish_event(i * 2).await;
            }
        });
        event_handler.start_handler().await;
        assert_eq!(total.load(std::sync::atomic::Ordering::SeqCst), 45);
    }
}
