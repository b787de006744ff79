use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events emitted by the checkout domain.
///
/// Consumers are in-process only; post-commit side effects publish these
/// after the order transaction has durably committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderPlaced {
        order_id: Uuid,
        customer_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: Option<String>,
    },

    // Cart events
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartCleared(Uuid),

    // Inventory events
    StockReserved {
        product_id: Uuid,
        weight_option_id: Option<Uuid>,
        quantity: i32,
        order_id: Uuid,
    },
    StockReleased {
        product_id: Uuid,
        weight_option_id: Option<Uuid>,
        quantity: i32,
        order_id: Uuid,
    },

    // Coupon events
    CouponApplied {
        coupon_id: Uuid,
        customer_id: Uuid,
        order_id: Uuid,
    },

    // Reward events
    RewardsRedeemed {
        customer_id: Uuid,
        points: i64,
    },
    RewardsAwarded {
        customer_id: Uuid,
        order_id: Uuid,
        points: i64,
    },
    RewardsAdjusted {
        customer_id: Uuid,
        amount: i64,
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

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Used on post-commit paths where event loss must not fail the request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropped event: {}", e);
        }
    }
}

/// Background consumer for the event channel. Currently logs events;
/// notification fan-out and delivery-partner dispatch hang off this point.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                customer_id,
            } => {
                info!(%order_id, %customer_id, "Order placed");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, old_status, new_status, "Order status changed");
            }
            Event::OrderCancelled { order_id, .. } => {
                info!(%order_id, "Order cancelled");
            }
            other => {
                debug!(event = ?other, "Event processed");
            }
        }
    }
    debug!("Event channel closed, consumer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // Must not panic or error out.
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        sender
            .send(Event::OrderPlaced {
                order_id,
                customer_id,
            })
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::OrderPlaced { order_id: o, .. }) => assert_eq!(o, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
