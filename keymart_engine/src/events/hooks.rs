use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderConfirmedEvent, OrderRefundedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_confirmed_producer: Vec<EventProducer<OrderConfirmedEvent>>,
    pub order_refunded_producer: Vec<EventProducer<OrderRefundedEvent>>,
}

pub struct EventHandlers {
    pub on_order_confirmed: Option<EventHandler<OrderConfirmedEvent>>,
    pub on_order_refunded: Option<EventHandler<OrderRefundedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_confirmed = hooks.on_order_confirmed.map(|f| EventHandler::new(buffer_size, f));
        let on_order_refunded = hooks.on_order_refunded.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_confirmed, on_order_refunded }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_confirmed {
            result.order_confirmed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_refunded {
            result.order_refunded_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_confirmed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_refunded {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_confirmed: Option<Handler<OrderConfirmedEvent>>,
    pub on_order_refunded: Option<Handler<OrderRefundedEvent>>,
}

impl EventHooks {
    pub fn on_order_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderConfirmedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_order_refunded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderRefundedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_refunded = Some(Arc::new(f));
        self
    }
}
