use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Services emit events after their transaction commits, so a dropped
    /// event must never turn a committed write into a request error.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderPaid(Uuid),
    OrderPaymentFailed(Uuid),
    OrderDeleted(Uuid),
    CheckoutSessionCreated {
        order_id: Uuid,
        session_id: String,
    },

    // Cart events
    CartUpdated(Uuid),
    CartCleared(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    ProductStockChanged {
        product_id: Uuid,
        in_stock: bool,
    },

    // Address events
    AddressCreated(Uuid),
}

/// Trait for components that react to events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Processes events from the receiver channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                if let Err(e) = handle_order_created(order_id).await {
                    error!(
                        "Failed to handle order created event: order_id={}, error={}",
                        order_id, e
                    );
                }
            }
            Event::OrderPaid(order_id) => {
                info!("Order paid: {}", order_id);
            }
            Event::OrderPaymentFailed(order_id) => {
                warn!("Payment failed for order: {}", order_id);
            }
            Event::OrderDeleted(order_id) => {
                info!("Order deleted: {}", order_id);
            }
            Event::CheckoutSessionCreated {
                order_id,
                session_id,
            } => {
                info!(
                    "Checkout session {} created for order {}",
                    session_id, order_id
                );
            }
            Event::CartUpdated(user_id) => {
                info!("Cart updated for user {}", user_id);
            }
            Event::CartCleared(user_id) => {
                info!("Cart cleared for user {}", user_id);
            }
            Event::ProductCreated(product_id) => {
                info!("Product created: {}", product_id);
            }
            Event::ProductStockChanged {
                product_id,
                in_stock,
            } => {
                info!("Product {} stock flag set to {}", product_id, in_stock);
            }
            Event::AddressCreated(address_id) => {
                info!("Address created: {}", address_id);
            }
        }
    }

    warn!("Event processing loop has ended");
}

// Handler functions for specific events
async fn handle_order_created(order_id: Uuid) -> Result<(), String> {
    // Fulfillment hooks (picking, notification) attach here later.
    info!("Processing order created event for order {}", order_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event_to_receiver() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();

        sender.send(Event::OrderCreated(order_id)).await.unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or propagate an error.
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }
}
