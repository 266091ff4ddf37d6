use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{AuditEvent, EventChannel, EventEmitter, Hook, PaymentCompletedEvent};

/// The handler functions an embedder wires in: the external audit collaborator and any
/// fulfilment logic.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_audit: Option<Hook<AuditEvent>>,
    pub on_payment_completed: Option<Hook<PaymentCompletedEvent>>,
}

impl EventHooks {
    pub fn on_audit<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AuditEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_audit = Some(Arc::new(f));
        self
    }

    pub fn on_payment_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentCompletedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_completed = Some(Arc::new(f));
        self
    }
}

pub struct EventHandlers {
    pub audit: Option<EventChannel<AuditEvent>>,
    pub payment_completed: Option<EventChannel<PaymentCompletedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let audit = hooks.on_audit.map(|f| EventChannel::new(buffer_size, f));
        let payment_completed = hooks.on_payment_completed.map(|f| EventChannel::new(buffer_size, f));
        Self { audit, payment_completed }
    }

    pub fn emitters(&self) -> EventEmitters {
        let mut result = EventEmitters::default();
        if let Some(channel) = &self.audit {
            result.audit.push(channel.subscribe());
        }
        if let Some(channel) = &self.payment_completed {
            result.payment_completed.push(channel.subscribe());
        }
        result
    }

    pub fn start_handlers(self) {
        if let Some(channel) = self.audit {
            tokio::spawn(channel.run());
        }
        if let Some(channel) = self.payment_completed {
            tokio::spawn(channel.run());
        }
    }
}

/// The emitter ends held by the orchestrator. Default is empty: an engine without hooks still
/// works, it just has no subscribers to tell.
#[derive(Default, Clone)]
pub struct EventEmitters {
    pub audit: Vec<EventEmitter<AuditEvent>>,
    pub payment_completed: Vec<EventEmitter<PaymentCompletedEvent>>,
}
