use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the listing change channel; slow subscribers lag rather than block writers.
pub const LISTING_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListingEventKind {
    ListingCreated,
    ListingUpdated,
    ListingDeleted,
}

impl ListingEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListingCreated => "listing_created",
            Self::ListingUpdated => "listing_updated",
            Self::ListingDeleted => "listing_deleted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEvent {
    pub kind: ListingEventKind,
    pub listing_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct ListingEvents {
    tx: broadcast::Sender<ListingEvent>,
}

impl Default for ListingEvents {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(LISTING_EVENT_CAPACITY);
        Self { tx }
    }
}

impl ListingEvents {
    pub fn subscribe(&self) -> broadcast::Receiver<ListingEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, kind: ListingEventKind, listing_id: &str, user_id: &str) {
        let _ = self.tx.send(ListingEvent {
            kind,
            listing_id: listing_id.to_string(),
            user_id: user_id.to_string(),
        });
    }

    pub fn publish_updates<'a>(&self, listing_ids: impl IntoIterator<Item = &'a String>, user_id: &str) {
        for id in listing_ids {
            self.publish(ListingEventKind::ListingUpdated, id, user_id);
        }
    }
}
