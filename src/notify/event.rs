//! Domain events pushed to connected users.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload shared by every bid-related event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidEvent {
    /// Identity the event is routed to. Not part of the wire payload.
    #[serde(skip)]
    pub recipient: String,
    pub tender_id: Uuid,
    pub bid_id: Option<Uuid>,
    pub price: f64,
    pub message: String,
}

/// A business occurrence destined for one user.
///
/// Encodes as a flat JSON object tagged by `type`, e.g.
/// `{"type":"new_bid","tender_id":"…","bid_id":"…","price":100.0,"message":"…"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A contractor bid on one of the recipient's tenders.
    NewBid(BidEvent),
    /// The recipient's bid won a tender.
    Award(BidEvent),
}

impl DomainEvent {
    /// Event for the owner of `tender_id` when a bid arrives.
    pub fn new_bid(recipient: impl Into<String>, tender_id: Uuid, bid_id: Uuid, price: f64) -> Self {
        DomainEvent::NewBid(BidEvent {
            recipient: recipient.into(),
            tender_id,
            bid_id: Some(bid_id),
            price,
            message: format!("New bid received on tender {}", tender_id),
        })
    }

    /// Event for the contractor whose bid was awarded.
    pub fn award(
        recipient: impl Into<String>,
        tender_id: Uuid,
        bid_id: Option<Uuid>,
        price: f64,
    ) -> Self {
        DomainEvent::Award(BidEvent {
            recipient: recipient.into(),
            tender_id,
            bid_id,
            price,
            message: format!("Your bid on tender {} has been awarded", tender_id),
        })
    }

    /// Replace the human-readable message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.payload_mut().message = message.into();
        self
    }

    /// The identity this event is addressed to.
    pub fn recipient(&self) -> &str {
        &self.payload().recipient
    }

    /// The shared payload.
    pub fn payload(&self) -> &BidEvent {
        match self {
            DomainEvent::NewBid(event) | DomainEvent::Award(event) => event,
        }
    }

    fn payload_mut(&mut self) -> &mut BidEvent {
        match self {
            DomainEvent::NewBid(event) | DomainEvent::Award(event) => event,
        }
    }

    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::NewBid(_) => "new_bid",
            DomainEvent::Award(_) => "award",
        }
    }

    /// Encode the event as a single JSON message.
    pub fn to_message(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
