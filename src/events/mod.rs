use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::gateway::PaymentStatus;

/// Events emitted by the checkout and order services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutSessionOpened {
        session_id: Uuid,
        product_id: Uuid,
    },
    ChargeCreated {
        session_id: Uuid,
        charge_id: String,
        amount_cents: i64,
        is_upsell: bool,
    },
    PaymentConfirmed {
        charge_id: String,
    },
    PaymentNotCompleted {
        charge_id: String,
        status: PaymentStatus,
    },
    SaleRecorded(Uuid),
    CartAbandoned(Uuid),
    CartRecovered(Uuid),
    UpsellAccepted {
        sale_id: Uuid,
    },
    UpsellDeclined {
        sale_id: Uuid,
    },
    UpsellChargeAttached {
        sale_id: Uuid,
        charge_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, logging instead of failing when the processor is gone.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("failed to enqueue event: {}", e);
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Background processor draining the event channel.
///
/// Events drive structured logging today; a durable outbox can hang off
/// this loop without touching the emitters.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::PaymentConfirmed { charge_id } => {
                info!(%charge_id, "payment confirmed");
            }
            Event::PaymentNotCompleted { charge_id, status } => {
                warn!(%charge_id, %status, "payment ended without completion");
            }
            Event::SaleRecorded(sale_id) => {
                info!(%sale_id, "sale recorded");
            }
            Event::CartAbandoned(cart_id) => {
                info!(%cart_id, "abandoned cart created");
            }
            Event::CartRecovered(cart_id) => {
                info!(%cart_id, "abandoned cart recovered");
            }
            other => {
                info!(event = ?other, "event processed");
            }
        }
    }
    error!("event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_after_receiver_drop_does_not_panic() {
        let (sender, receiver) = channel(4);
        drop(receiver);
        sender
            .send(Event::PaymentConfirmed {
                charge_id: "ch_1".into(),
            })
            .await;
    }
}
