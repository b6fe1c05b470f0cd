// =============================================================================
// DATABASE MODULE
// =============================================================================
// PostgreSQL implementation of BookingStore.
//
// Tables:
// - rooms                  catalog, seeded with sample rooms when empty
// - room_inventory         (room_id, day) -> booked count
// - bookings               booking records
// - payment_confirmations  gateway confirmations, keyed by reference
// =============================================================================

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Row};
use uuid::Uuid;

use crate::availability::{first_full_night, is_available, DateRange, InventoryMap};
use crate::models::{BookingRecord, PaymentConfirmation, Room};
use crate::store::{sample_rooms, BookingStore, StoreError, StoreResult};

/// Name Postgres gives the UNIQUE constraint on `bookings.transaction_ref`
const TRANSACTION_REF_CONSTRAINT: &str = "bookings_transaction_ref_key";

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

const BOOKING_COLUMNS: &str = "id, room_id, user_id, check_in, check_out, nights, total_cost, \
     payment_method, transaction_ref, status, room_number, created_at";

// -----------------------------------------------------------------------------
// DATABASE WRAPPER
// -----------------------------------------------------------------------------
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    // -------------------------------------------------------------------------
    // CONNECTION
    // -------------------------------------------------------------------------
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .idle_timeout(std::time::Duration::from_secs(300))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    // -------------------------------------------------------------------------
    // MIGRATIONS
    // -------------------------------------------------------------------------
    /// Create tables and indexes if missing, then seed the room catalog.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                id VARCHAR(64) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                nightly_rate DOUBLE PRECISION NOT NULL,
                capacity INTEGER NOT NULL,
                max_guests INTEGER NOT NULL DEFAULT 2,
                image_url TEXT,

                CONSTRAINT positive_rate CHECK (nightly_rate > 0),
                CONSTRAINT positive_capacity CHECK (capacity > 0)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create rooms table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS room_inventory (
                room_id VARCHAR(64) NOT NULL REFERENCES rooms(id),
                day DATE NOT NULL,
                booked INTEGER NOT NULL,

                PRIMARY KEY (room_id, day),
                CONSTRAINT non_negative_booked CHECK (booked >= 0)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create room_inventory table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bookings (
                id UUID PRIMARY KEY,
                room_id VARCHAR(64) NOT NULL REFERENCES rooms(id),
                user_id VARCHAR(128) NOT NULL,
                check_in DATE NOT NULL,
                check_out DATE NOT NULL,
                nights INTEGER NOT NULL,
                total_cost DOUBLE PRECISION NOT NULL,
                payment_method VARCHAR(32) NOT NULL,
                transaction_ref VARCHAR(128) UNIQUE,
                status VARCHAR(32) NOT NULL,
                room_number VARCHAR(32),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT valid_stay CHECK (check_out > check_in),
                CONSTRAINT positive_nights CHECK (nights > 0),
                CONSTRAINT non_negative_cost CHECK (total_cost >= 0)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create bookings table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings(user_id)")
            .execute(&self.pool)
            .await
            .context("Failed to create user index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payment_confirmations (
                reference VARCHAR(128) PRIMARY KEY,
                status VARCHAR(32) NOT NULL,
                amount BIGINT NOT NULL,
                email VARCHAR(255),
                source VARCHAR(16) NOT NULL,
                received_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create payment_confirmations table")?;

        self.seed_rooms().await?;

        Ok(())
    }

    async fn seed_rooms(&self) -> anyhow::Result<()> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
            .fetch_one(&self.pool)
            .await?;

        if count.0 > 0 {
            return Ok(());
        }

        for room in sample_rooms() {
            sqlx::query(
                r#"
                INSERT INTO rooms (id, name, description, nightly_rate, capacity, max_guests, image_url)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&room.id)
            .bind(&room.name)
            .bind(&room.description)
            .bind(room.nightly_rate)
            .bind(room.capacity)
            .bind(room.max_guests)
            .bind(&room.image_url)
            .execute(&self.pool)
            .await?;
        }

        tracing::info!("Seeded sample room catalog");
        Ok(())
    }

    async fn fetch_bookings(&self, filter: &str, bind: Option<&str>) -> StoreResult<Vec<BookingRecord>> {
        let sql = format!(
            "SELECT {} FROM bookings {} ORDER BY created_at DESC",
            BOOKING_COLUMNS, filter
        );
        let mut query = sqlx::query_as::<_, BookingRow>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(BookingRecord::try_from)
            .collect()
    }
}

// -----------------------------------------------------------------------------
// ROW MAPPING
// -----------------------------------------------------------------------------
// Enum columns are stored as text and parsed on the way out.
#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    room_id: String,
    user_id: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
    nights: i32,
    total_cost: f64,
    payment_method: String,
    transaction_ref: Option<String>,
    status: String,
    room_number: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for BookingRecord {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(BookingRecord {
            id: row.id,
            room_id: row.room_id,
            user_id: row.user_id,
            check_in: row.check_in,
            check_out: row.check_out,
            nights: u32::try_from(row.nights)
                .map_err(|_| StoreError::Corrupt(format!("booking {} has {} nights", row.id, row.nights)))?,
            total_cost: row.total_cost,
            payment_method: row.payment_method.parse().map_err(StoreError::Corrupt)?,
            transaction_ref: row.transaction_ref,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            room_number: row.room_number,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PaymentRow {
    reference: String,
    status: String,
    amount: i64,
    email: Option<String>,
    source: String,
    received_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentConfirmation {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(PaymentConfirmation {
            amount: u64::try_from(row.amount)
                .map_err(|_| StoreError::Corrupt(format!("payment {} has amount {}", row.reference, row.amount)))?,
            reference: row.reference,
            status: row.status,
            email: row.email,
            source: row.source.parse().map_err(StoreError::Corrupt)?,
            received_at: row.received_at,
        })
    }
}

/// A unique violation on the transaction reference means another booking
/// already spent that payment.
fn map_booking_insert_error(err: sqlx::Error, reference: Option<&str>) -> StoreError {
    if let (sqlx::Error::Database(db_err), Some(reference)) = (&err, reference) {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
            && db_err.constraint() == Some(TRANSACTION_REF_CONSTRAINT)
        {
            return StoreError::DuplicateReference(reference.to_string());
        }
    }
    StoreError::Database(err)
}

fn to_i32(value: u32, field: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", field, value)))
}

// -----------------------------------------------------------------------------
// STORE IMPLEMENTATION
// -----------------------------------------------------------------------------
#[async_trait]
impl BookingStore for Database {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let rooms = sqlx::query_as::<_, Room>(
            r#"
            SELECT id, name, description, nightly_rate, capacity, max_guests, image_url
            FROM rooms
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rooms)
    }

    async fn get_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        let room = sqlx::query_as::<_, Room>(
            r#"
            SELECT id, name, description, nightly_rate, capacity, max_guests, image_url
            FROM rooms
            WHERE id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(room)
    }

    async fn inventory(&self, room_id: &str, range: &DateRange) -> StoreResult<InventoryMap> {
        let rows = sqlx::query(
            r#"
            SELECT day, booked
            FROM room_inventory
            WHERE room_id = $1 AND day >= $2 AND day < $3
            "#,
        )
        .bind(room_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let booked: i32 = row.get("booked");
                (row.get::<NaiveDate, _>("day"), u32::try_from(booked).unwrap_or(0))
            })
            .collect())
    }

    /// Locks the room row for the duration of the transaction, so concurrent
    /// bookings of the same room serialize here.
    async fn append_booking(&self, record: &BookingRecord, capacity: u32) -> StoreResult<BookingRecord> {
        let range = record.range();
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM rooms WHERE id = $1 FOR UPDATE")
            .bind(&record.room_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::RoomNotFound(record.room_id.clone()))?;

        // bookings of other rooms hold other locks; the UNIQUE constraint
        // below covers those
        if let Some(reference) = &record.transaction_ref {
            let taken = sqlx::query("SELECT id FROM bookings WHERE transaction_ref = $1")
                .bind(reference)
                .fetch_optional(&mut *tx)
                .await?;
            if taken.is_some() {
                return Err(StoreError::DuplicateReference(reference.clone()));
            }
        }

        let rows = sqlx::query(
            r#"
            SELECT day, booked
            FROM room_inventory
            WHERE room_id = $1 AND day >= $2 AND day < $3
            "#,
        )
        .bind(&record.room_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&mut *tx)
        .await?;

        let inventory: InventoryMap = rows
            .iter()
            .map(|row| {
                let booked: i32 = row.get("booked");
                (row.get::<NaiveDate, _>("day"), u32::try_from(booked).unwrap_or(0))
            })
            .collect();

        if !is_available(&range, &inventory, capacity) {
            let day = first_full_night(&range, &inventory, capacity)
                .map(|day| day.to_string())
                .unwrap_or_else(|| range.from.to_string());
            // dropping tx rolls back
            return Err(StoreError::Unavailable {
                room_id: record.room_id.clone(),
                day,
            });
        }

        for day in range.occupied_nights() {
            sqlx::query(
                r#"
                INSERT INTO room_inventory (room_id, day, booked)
                VALUES ($1, $2, 1)
                ON CONFLICT (room_id, day) DO UPDATE SET booked = room_inventory.booked + 1
                "#,
            )
            .bind(&record.room_id)
            .bind(day)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (id, room_id, user_id, check_in, check_out, nights, total_cost,
                                  payment_method, transaction_ref, status, room_number, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(&record.room_id)
        .bind(&record.user_id)
        .bind(record.check_in)
        .bind(record.check_out)
        .bind(to_i32(record.nights, "nights")?)
        .bind(record.total_cost)
        .bind(record.payment_method.as_str())
        .bind(&record.transaction_ref)
        .bind(record.status.as_str())
        .bind(&record.room_number)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_booking_insert_error(e, record.transaction_ref.as_deref()))?;

        tx.commit().await?;

        Ok(record.clone())
    }

    async fn bookings_by_user(&self, user_id: &str) -> StoreResult<Vec<BookingRecord>> {
        self.fetch_bookings("WHERE user_id = $1", Some(user_id)).await
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<BookingRecord>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(BookingRecord::try_from)
            .transpose()
    }

    async fn booking_by_transaction_ref(&self, reference: &str) -> StoreResult<Option<BookingRecord>> {
        Ok(self
            .fetch_bookings("WHERE transaction_ref = $1", Some(reference))
            .await?
            .into_iter()
            .next())
    }

    async fn list_bookings(&self) -> StoreResult<Vec<BookingRecord>> {
        self.fetch_bookings("", None).await
    }

    async fn assign_room_number(&self, id: Uuid, room_number: &str) -> StoreResult<BookingRecord> {
        let sql = format!(
            "UPDATE bookings SET room_number = $1 WHERE id = $2 RETURNING {}",
            BOOKING_COLUMNS
        );
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(room_number)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::BookingNotFound(id))
            .and_then(BookingRecord::try_from)
    }

    async fn record_payment(&self, confirmation: &PaymentConfirmation) -> StoreResult<()> {
        let amount = i64::try_from(confirmation.amount)
            .map_err(|_| StoreError::Corrupt(format!("amount out of range: {}", confirmation.amount)))?;

        sqlx::query(
            r#"
            INSERT INTO payment_confirmations (reference, status, amount, email, source, received_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (reference) DO UPDATE
            SET status = EXCLUDED.status,
                amount = EXCLUDED.amount,
                email = COALESCE(EXCLUDED.email, payment_confirmations.email),
                source = EXCLUDED.source,
                received_at = EXCLUDED.received_at
            "#,
        )
        .bind(&confirmation.reference)
        .bind(&confirmation.status)
        .bind(amount)
        .bind(&confirmation.email)
        .bind(confirmation.source.as_str())
        .bind(confirmation.received_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unreconciled_payments(&self) -> StoreResult<Vec<PaymentConfirmation>> {
        sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT p.reference, p.status, p.amount, p.email, p.source, p.received_at
            FROM payment_confirmations p
            LEFT JOIN bookings b ON b.transaction_ref = p.reference
            WHERE p.status = 'success' AND b.id IS NULL
            ORDER BY p.received_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PaymentConfirmation::try_from)
        .collect()
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_constraint_errors_stay_database_errors() {
        assert!(matches!(
            map_booking_insert_error(sqlx::Error::RowNotFound, Some("T-ok")),
            StoreError::Database(sqlx::Error::RowNotFound)
        ));
        assert!(matches!(
            map_booking_insert_error(sqlx::Error::PoolTimedOut, None),
            StoreError::Database(_)
        ));
    }
}
