use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderClosedEvent, OrderCreatedEvent, OrderPaidEvent};

/// The publishing side of the event bus. Cheap to clone; every clone publishes to every registered hook.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_closed_producer: Vec<EventProducer<OrderClosedEvent>>,
}

impl EventProducers {
    pub async fn publish_order_created(&self, event: OrderCreatedEvent) {
        for p in &self.order_created_producer {
            p.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_paid(&self, event: OrderPaidEvent) {
        for p in &self.order_paid_producer {
            p.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_closed(&self, event: OrderClosedEvent) {
        for p in &self.order_closed_producer {
            p.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_created: Vec<EventHandler<OrderCreatedEvent>>,
    pub on_order_paid: Vec<EventHandler<OrderPaidEvent>>,
    pub on_order_closed: Vec<EventHandler<OrderClosedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_created =
            hooks.on_order_created.into_iter().map(|f| EventHandler::new("order_created", buffer_size, f)).collect();
        let on_order_paid =
            hooks.on_order_paid.into_iter().map(|f| EventHandler::new("order_paid", buffer_size, f)).collect();
        let on_order_closed =
            hooks.on_order_closed.into_iter().map(|f| EventHandler::new("order_closed", buffer_size, f)).collect();
        Self { on_order_created, on_order_paid, on_order_closed }
    }

    pub fn producers(&self) -> EventProducers {
        EventProducers {
            order_created_producer: self.on_order_created.iter().map(|h| h.subscribe()).collect(),
            order_paid_producer: self.on_order_paid.iter().map(|h| h.subscribe()).collect(),
            order_closed_producer: self.on_order_closed.iter().map(|h| h.subscribe()).collect(),
        }
    }

    /// Spawns every handler. Each one stops by itself once all producers have been dropped.
    pub async fn start_handlers(self) {
        for handler in self.on_order_created {
            tokio::spawn(handler.start_handler());
        }
        for handler in self.on_order_paid {
            tokio::spawn(handler.start_handler());
        }
        for handler in self.on_order_closed {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Vec<Handler<OrderCreatedEvent>>,
    pub on_order_paid: Vec<Handler<OrderPaidEvent>>,
    pub on_order_closed: Vec<Handler<OrderClosedEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_created.push(Arc::new(f));
        self
    }

    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid.push(Arc::new(f));
        self
    }

    pub fn on_order_closed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderClosedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_closed.push(Arc::new(f));
        self
    }
}
