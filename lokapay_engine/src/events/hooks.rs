use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, PaymentClosedEvent, PaymentSettledEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub settled_producer: Vec<EventProducer<PaymentSettledEvent>>,
    pub closed_producer: Vec<EventProducer<PaymentClosedEvent>>,
}

pub struct EventHandlers {
    pub on_payment_settled: Option<EventHandler<PaymentSettledEvent>>,
    pub on_payment_closed: Option<EventHandler<PaymentClosedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_settled = hooks.on_payment_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_closed = hooks.on_payment_closed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_settled, on_payment_closed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_settled {
            result.settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_closed {
            result.closed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_closed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_settled: Option<Handler<PaymentSettledEvent>>,
    pub on_payment_closed: Option<Handler<PaymentClosedEvent>>,
}

impl EventHooks {
    pub fn on_payment_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_settled = Some(Arc::new(f));
        self
    }

    pub fn on_payment_closed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentClosedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_closed = Some(Arc::new(f));
        self
    }
}
