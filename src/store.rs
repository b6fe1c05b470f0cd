// =============================================================================
// BOOKING STORE
// =============================================================================
// The persistence collaborator: room catalog reads, per-day inventory, booking
// records and payment confirmations.
//
// Two implementations:
// - db::Database   PostgreSQL via SQLx (production)
// - InMemoryStore  process-local, used when DATABASE_URL is unset and in tests
//
// `append_booking` is the only write that touches inventory. It re-checks
// availability and commits the stay atomically, so two requests racing for
// the last room on a night cannot both succeed.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::availability::{first_full_night, is_available, DateRange, InventoryMap};
use crate::models::{BookingRecord, PaymentConfirmation, Room};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    /// Capacity was exhausted between the availability check and the write
    #[error("Room {room_id} is fully booked on {day}")]
    Unavailable { room_id: String, day: String },

    /// Another booking already carries this gateway reference
    #[error("Transaction {0} already paid for another booking")]
    DuplicateReference(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back into a model
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;

    async fn get_room(&self, room_id: &str) -> StoreResult<Option<Room>>;

    /// Booked counts for the occupied nights of `range`.
    async fn inventory(&self, room_id: &str, range: &DateRange) -> StoreResult<InventoryMap>;

    /// Persist `record` and commit its nights against the room's inventory.
    /// Fails with `StoreError::Unavailable` if any night is already at
    /// `capacity`, and with `StoreError::DuplicateReference` if another
    /// booking carries the same `transaction_ref`.
    async fn append_booking(&self, record: &BookingRecord, capacity: u32) -> StoreResult<BookingRecord>;

    /// Newest first.
    async fn bookings_by_user(&self, user_id: &str) -> StoreResult<Vec<BookingRecord>>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<BookingRecord>>;

    async fn booking_by_transaction_ref(&self, reference: &str) -> StoreResult<Option<BookingRecord>>;

    /// Every booking, newest first.
    async fn list_bookings(&self) -> StoreResult<Vec<BookingRecord>>;

    async fn assign_room_number(&self, id: Uuid, room_number: &str) -> StoreResult<BookingRecord>;

    /// Upsert by reference; the latest confirmation wins.
    async fn record_payment(&self, confirmation: &PaymentConfirmation) -> StoreResult<()>;

    /// Successful confirmations whose reference no booking carries.
    async fn unreconciled_payments(&self) -> StoreResult<Vec<PaymentConfirmation>>;

    async fn health_check(&self) -> bool;
}

// =============================================================================
// SAMPLE CATALOG
// =============================================================================
/// Rooms seeded into an empty store.
pub fn sample_rooms() -> Vec<Room> {
    [
        ("standard-queen", "Standard Queen", "Queen bed, city view, work desk", 45_000.0, 8, 2),
        ("deluxe-king", "Deluxe King", "King bed, lounge area, rain shower", 75_000.0, 5, 2),
        ("family-suite", "Family Suite", "Two bedrooms, kitchenette, balcony", 120_000.0, 3, 5),
        ("executive-suite", "Executive Suite", "Top floor suite with private lounge access", 180_000.0, 2, 3),
        ("presidential-suite", "Presidential Suite", "Full-floor suite with butler service", 450_000.0, 1, 4),
    ]
    .into_iter()
    .map(|(id, name, description, nightly_rate, capacity, max_guests)| Room {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        nightly_rate,
        capacity,
        max_guests,
        image_url: Some(format!("/images/rooms/{}.jpg", id)),
    })
    .collect()
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================
#[derive(Default)]
struct Inner {
    rooms: Vec<Room>,
    inventory: HashMap<String, InventoryMap>,
    bookings: Vec<BookingRecord>,
    payments: HashMap<String, PaymentConfirmation>,
}

/// Process-local store. All writes go through one lock, which makes
/// `append_booking` atomic.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                rooms,
                ..Inner::default()
            }),
        }
    }

    pub fn with_sample_rooms() -> Self {
        Self::new(sample_rooms())
    }
}

fn newest_first(mut bookings: Vec<BookingRecord>) -> Vec<BookingRecord> {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    bookings
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let mut rooms = self.inner.read().await.rooms.clone();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rooms)
    }

    async fn get_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        let inner = self.inner.read().await;
        Ok(inner.rooms.iter().find(|room| room.id == room_id).cloned())
    }

    async fn inventory(&self, room_id: &str, range: &DateRange) -> StoreResult<InventoryMap> {
        let inner = self.inner.read().await;
        Ok(inner
            .inventory
            .get(room_id)
            .map(|map| map.window(range))
            .unwrap_or_default())
    }

    async fn append_booking(&self, record: &BookingRecord, capacity: u32) -> StoreResult<BookingRecord> {
        let mut inner = self.inner.write().await;

        if !inner.rooms.iter().any(|room| room.id == record.room_id) {
            return Err(StoreError::RoomNotFound(record.room_id.clone()));
        }

        if let Some(reference) = &record.transaction_ref {
            if inner
                .bookings
                .iter()
                .any(|booking| booking.transaction_ref.as_ref() == Some(reference))
            {
                return Err(StoreError::DuplicateReference(reference.clone()));
            }
        }

        let range = record.range();
        let inventory = inner.inventory.entry(record.room_id.clone()).or_default();
        if !is_available(&range, inventory, capacity) {
            let day = first_full_night(&range, inventory, capacity)
                .map(|day| day.to_string())
                .unwrap_or_else(|| range.from.to_string());
            return Err(StoreError::Unavailable {
                room_id: record.room_id.clone(),
                day,
            });
        }
        inventory.record_stay(&range);
        inner.bookings.push(record.clone());

        Ok(record.clone())
    }

    async fn bookings_by_user(&self, user_id: &str) -> StoreResult<Vec<BookingRecord>> {
        let inner = self.inner.read().await;
        Ok(newest_first(
            inner
                .bookings
                .iter()
                .filter(|booking| booking.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<BookingRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.bookings.iter().find(|booking| booking.id == id).cloned())
    }

    async fn booking_by_transaction_ref(&self, reference: &str) -> StoreResult<Option<BookingRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .bookings
            .iter()
            .find(|booking| booking.transaction_ref.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_bookings(&self) -> StoreResult<Vec<BookingRecord>> {
        Ok(newest_first(self.inner.read().await.bookings.clone()))
    }

    async fn assign_room_number(&self, id: Uuid, room_number: &str) -> StoreResult<BookingRecord> {
        let mut inner = self.inner.write().await;
        let booking = inner
            .bookings
            .iter_mut()
            .find(|booking| booking.id == id)
            .ok_or(StoreError::BookingNotFound(id))?;
        booking.room_number = Some(room_number.to_string());
        Ok(booking.clone())
    }

    async fn record_payment(&self, confirmation: &PaymentConfirmation) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .payments
            .insert(confirmation.reference.clone(), confirmation.clone());
        Ok(())
    }

    async fn unreconciled_payments(&self) -> StoreResult<Vec<PaymentConfirmation>> {
        let inner = self.inner.read().await;
        let mut payments: Vec<_> = inner
            .payments
            .values()
            .filter(|payment| payment.status == "success")
            .filter(|payment| {
                !inner
                    .bookings
                    .iter()
                    .any(|booking| booking.transaction_ref.as_deref() == Some(payment.reference.as_str()))
            })
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        Ok(payments)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::build_booking;
    use crate::models::{ConfirmationSource, PaymentMethod};
    use chrono::{NaiveDate, Utc};
    use std::sync::Arc;

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::new(
            from.parse::<NaiveDate>().unwrap(),
            to.parse::<NaiveDate>().unwrap(),
        )
    }

    async fn room(store: &InMemoryStore, id: &str) -> Room {
        store.get_room(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn append_commits_each_night() {
        let store = InMemoryStore::with_sample_rooms();
        let suite = room(&store, "executive-suite").await;
        let stay = range("2024-08-15", "2024-08-17");
        let record = build_booking("u1", &suite, &stay, PaymentMethod::PayAtProperty, None).unwrap();

        store.append_booking(&record, suite.capacity()).await.unwrap();

        let inventory = store.inventory("executive-suite", &range("2024-08-14", "2024-08-18")).await.unwrap();
        assert_eq!(inventory.booked_on(stay.from), 1);
        assert_eq!(inventory.booked_on(stay.from.succ_opt().unwrap()), 1);
        assert_eq!(inventory.booked_on(stay.to), 0);
    }

    #[tokio::test]
    async fn append_rejects_saturated_night() {
        let store = InMemoryStore::with_sample_rooms();
        let suite = room(&store, "presidential-suite").await;
        let stay = range("2024-08-15", "2024-08-16");

        let first = build_booking("u1", &suite, &stay, PaymentMethod::PayAtProperty, None).unwrap();
        store.append_booking(&first, suite.capacity()).await.unwrap();

        let second = build_booking("u2", &suite, &stay, PaymentMethod::PayAtProperty, None).unwrap();
        let err = store.append_booking(&second, suite.capacity()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { ref day, .. } if day == "2024-08-15"));
        assert_eq!(store.list_bookings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_bookings_for_last_room_admit_one() {
        let store = Arc::new(InMemoryStore::with_sample_rooms());
        let suite = room(&store, "presidential-suite").await;
        let stay = range("2024-12-24", "2024-12-26");

        let mut handles = Vec::new();
        for n in 0..8 {
            let store = Arc::clone(&store);
            let record = build_booking(&format!("u{}", n), &suite, &stay, PaymentMethod::PayAtProperty, None).unwrap();
            handles.push(tokio::spawn(async move { store.append_booking(&record, 1).await.is_ok() }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bookings_sharing_a_reference_admit_one() {
        let store = Arc::new(InMemoryStore::with_sample_rooms());
        let queen = room(&store, "standard-queen").await;

        let mut handles = Vec::new();
        for n in 0..8 {
            let store = Arc::clone(&store);
            let record = build_booking(
                &format!("u{}", n),
                &queen,
                &range("2024-08-15", "2024-08-18"),
                PaymentMethod::Paystack,
                Some("T-ok".to_string()),
            )
            .unwrap();
            handles.push(tokio::spawn(async move { store.append_booking(&record, 10).await }));
        }

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(err) => assert!(matches!(err, StoreError::DuplicateReference(ref r) if r == "T-ok")),
            }
        }
        assert_eq!(admitted, 1);

        let inventory = store.inventory("standard-queen", &range("2024-08-15", "2024-08-18")).await.unwrap();
        assert_eq!(inventory.booked_on(range("2024-08-15", "2024-08-16").from), 1);
    }

    #[tokio::test]
    async fn unknown_room_is_rejected() {
        let store = InMemoryStore::with_sample_rooms();
        let mut ghost = room(&store, "deluxe-king").await;
        ghost.id = "ghost".to_string();
        let record = build_booking("u1", &ghost, &range("2024-08-15", "2024-08-16"), PaymentMethod::PayAtProperty, None).unwrap();
        assert!(matches!(
            store.append_booking(&record, 5).await,
            Err(StoreError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn room_number_is_the_only_update() {
        let store = InMemoryStore::with_sample_rooms();
        let king = room(&store, "deluxe-king").await;
        let record = build_booking("u1", &king, &range("2024-08-15", "2024-08-16"), PaymentMethod::PayAtProperty, None).unwrap();
        store.append_booking(&record, king.capacity()).await.unwrap();

        let updated = store.assign_room_number(record.id, "304").await.unwrap();
        assert_eq!(updated.room_number.as_deref(), Some("304"));
        assert_eq!(updated.total_cost, record.total_cost);

        assert!(matches!(
            store.assign_room_number(Uuid::new_v4(), "1").await,
            Err(StoreError::BookingNotFound(_))
        ));
    }

    #[tokio::test]
    async fn payments_without_booking_are_unreconciled() {
        let store = InMemoryStore::with_sample_rooms();
        let king = room(&store, "deluxe-king").await;

        for reference in ["T-booked", "T-orphan"] {
            store
                .record_payment(&PaymentConfirmation {
                    reference: reference.to_string(),
                    status: "success".to_string(),
                    amount: 7_500_000,
                    email: Some("guest@example.com".to_string()),
                    source: ConfirmationSource::Webhook,
                    received_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let record = build_booking(
            "u1",
            &king,
            &range("2024-08-15", "2024-08-16"),
            PaymentMethod::Paystack,
            Some("T-booked".to_string()),
        )
        .unwrap();
        store.append_booking(&record, king.capacity()).await.unwrap();

        let orphans = store.unreconciled_payments().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].reference, "T-orphan");
        assert_eq!(
            store.booking_by_transaction_ref("T-booked").await.unwrap().map(|b| b.id),
            Some(record.id)
        );
    }

    #[tokio::test]
    async fn user_bookings_are_scoped() {
        let store = InMemoryStore::with_sample_rooms();
        let queen = room(&store, "standard-queen").await;
        for (user, from, to) in [("a", "2024-01-01", "2024-01-02"), ("b", "2024-01-03", "2024-01-05"), ("a", "2024-02-01", "2024-02-03")] {
            let record = build_booking(user, &queen, &range(from, to), PaymentMethod::PayAtProperty, None).unwrap();
            store.append_booking(&record, queen.capacity()).await.unwrap();
        }
        let mine = store.bookings_by_user("a").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|booking| booking.user_id == "a"));
    }
}
