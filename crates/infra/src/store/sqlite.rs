//! SQLite-backed ledger store.
//!
//! Ledger and movement log share one database, so every movement is a single
//! SQLite transaction:
//!
//! 1. `INSERT .. ON CONFLICT DO NOTHING` opens the entry at zero (and takes the write lock)
//! 2. read the current quantity and run the domain guard
//! 3. `UPDATE` the entry, conditional on the quantity read in step 2
//! 4. `INSERT` the movement
//! 5. `COMMIT`
//!
//! Any early return drops the transaction, which rolls it back.
//!
//! ## Error Mapping
//!
//! | SQLite result | StoreError |
//! |---|---|
//! | `SQLITE_BUSY` / `SQLITE_LOCKED` (and extended codes), pool timeout | `Conflict` |
//! | guard failure in step 2 | `InsufficientStock` |
//! | stale quantity in step 3 | `Conflict` |
//! | anything else | `Backend` |
//!
//! Timestamps are stored as unix microseconds so that `ORDER BY occurred_at`
//! is chronological.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

use mekgoro_core::{ActorId, ItemKey, LedgerError, MovementId};
use mekgoro_inventory::{MovementKind, MovementRecord, MovementRequest, StockEntry};

use super::query::{MovementOrder, MovementQuery};
use super::{AppliedMovement, LedgerState, LedgerStore, SeedEntry, SeedOutcome, StoreError, IMPORT_REFERENCE};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const FILE_POOL_SIZE: u32 = 5;

/// SQLite ledger store.
///
/// `SqlitePool` is `Send + Sync`; clones share the pool.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
    #[cfg(test)]
    pub(crate) fault: std::sync::Arc<super::FaultSwitch>,
}

impl SqliteLedgerStore {
    /// Connect to `database_url` (e.g. `sqlite://mekgoro.db`) and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let in_memory = is_memory_url(database_url);

        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| map_sqlx_error("parse_url", e))?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(FILE_POOL_SIZE)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, migrated and ready.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    /// Wrap an existing pool and bring its schema up to date.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;

        tracing::debug!(schema_version = super::SCHEMA_VERSION, "ledger schema ready");

        Ok(Self {
            pool,
            #[cfg(test)]
            fault: Default::default(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    #[instrument(
        skip(self, request),
        fields(
            item_key = %request.item_key(),
            kind = %request.kind(),
            delta = request.delta()
        ),
        err
    )]
    async fn apply_movement(&self, request: &MovementRequest) -> Result<AppliedMovement, StoreError> {
        let key = request.item_key().as_str();
        let at = to_micros(request.occurred_at());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO stock_entries (item_key, quantity, last_updated)
            VALUES (?1, 0, ?2)
            ON CONFLICT (item_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("open_entry", e))?;

        let current = current_quantity(&mut tx, key).await?;

        let next = match request.resulting_quantity(current) {
            Ok(next) => next,
            Err(LedgerError::InsufficientStock { available, .. }) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::InsufficientStock { available });
            }
            Err(other) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::Invalid(other.to_string()));
            }
        };

        let updated = sqlx::query(
            r#"
            UPDATE stock_entries
            SET quantity = ?1,
                last_updated = ?2,
                unit_cost = COALESCE(?3, unit_cost)
            WHERE item_key = ?4 AND quantity = ?5
            "#,
        )
        .bind(next)
        .bind(at)
        .bind(unit_cost_param(request.unit_cost())?)
        .bind(key)
        .bind(current)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_entry", e))?;

        if updated.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!(
                "quantity of '{key}' changed during the transaction"
            )));
        }

        #[cfg(test)]
        self.fault.trip()?;

        let meta = request.meta();
        let row = sqlx::query(
            r#"
            INSERT INTO movements (
                kind,
                item_key,
                delta,
                unit_cost,
                reference,
                counterparty,
                actor,
                occurred_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING id
            "#,
        )
        .bind(request.kind().as_str())
        .bind(key)
        .bind(request.delta())
        .bind(unit_cost_param(request.unit_cost())?)
        .bind(&meta.reference)
        .bind(&meta.counterparty)
        .bind(meta.actor.as_str())
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("read_movement_id", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(AppliedMovement {
            record: request.clone().into_record(MovementId::new(id as u64)),
            quantity: next,
        })
    }

    #[instrument(skip(self, seed), fields(item_key = %seed.item_key, quantity = seed.quantity), err)]
    async fn seed_entry(&self, seed: &SeedEntry) -> Result<SeedOutcome, StoreError> {
        if seed.quantity < 0 {
            return Err(StoreError::Invalid("opening quantity cannot be negative".to_string()));
        }

        let key = seed.item_key.as_str();
        let at = to_micros(seed.occurred_at);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO stock_entries (item_key, quantity, last_updated)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (item_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(seed.quantity)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("seed_entry", e))?;

        if inserted.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(SeedOutcome::AlreadyPresent);
        }

        #[cfg(test)]
        self.fault.trip()?;

        if seed.quantity > 0 {
            sqlx::query(
                r#"
                INSERT INTO movements (kind, item_key, delta, reference, counterparty, actor, occurred_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(MovementKind::Adjustment.as_str())
            .bind(key)
            .bind(seed.quantity)
            .bind(IMPORT_REFERENCE)
            .bind(&seed.source)
            .bind(seed.actor.as_str())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("append_opening_movement", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(SeedOutcome::Created)
    }

    async fn get_entry(&self, item_key: &ItemKey) -> Result<Option<StockEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT item_key, quantity, unit_cost, last_updated
            FROM stock_entries
            WHERE item_key = ?1
            "#,
        )
        .bind(item_key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_entry", e))?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn list_stock(&self, filter: Option<&str>) -> Result<Vec<StockEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT item_key, quantity, unit_cost, last_updated
            FROM stock_entries
            ORDER BY item_key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_stock", e))?;

        // Filtering happens here: SQLite's lower() only folds ASCII.
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry = entry_from_row(row)?;
            if filter.is_none_or(|f| entry.item_key.matches_filter(f)) {
                out.push(entry);
            }
        }
        Ok(out)
    }

    async fn list_movements(&self, query: &MovementQuery) -> Result<Vec<MovementRecord>, StoreError> {
        let sql = match query.order {
            MovementOrder::Descending => {
                r#"
                SELECT id, kind, item_key, delta, unit_cost, reference, counterparty, actor, occurred_at
                FROM movements
                WHERE (?1 IS NULL OR item_key = ?1)
                ORDER BY occurred_at DESC, id ASC
                LIMIT ?2
                "#
            }
            MovementOrder::Ascending => {
                r#"
                SELECT id, kind, item_key, delta, unit_cost, reference, counterparty, actor, occurred_at
                FROM movements
                WHERE (?1 IS NULL OR item_key = ?1)
                ORDER BY occurred_at ASC, id ASC
                LIMIT ?2
                "#
            }
        };

        // A negative LIMIT means unbounded in SQLite.
        let limit = query.limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(sql)
            .bind(query.item_key.as_ref().map(|k| k.as_str()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    async fn load_state(&self) -> Result<LedgerState, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let entry_rows = sqlx::query(
            r#"
            SELECT item_key, quantity, unit_cost, last_updated
            FROM stock_entries
            ORDER BY item_key ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_entries", e))?;

        let movement_rows = sqlx::query(
            r#"
            SELECT id, kind, item_key, delta, unit_cost, reference, counterparty, actor, occurred_at
            FROM movements
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_movements", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(LedgerState {
            entries: entry_rows.iter().map(entry_from_row).collect::<Result<_, _>>()?,
            movements: movement_rows.iter().map(movement_from_row).collect::<Result<_, _>>()?,
        })
    }
}

async fn current_quantity(tx: &mut Transaction<'_, Sqlite>, item_key: &str) -> Result<i64, StoreError> {
    let row = sqlx::query("SELECT quantity FROM stock_entries WHERE item_key = ?1")
        .bind(item_key)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("read_quantity", e))?;

    row.try_get("quantity")
        .map_err(|e| map_sqlx_error("read_quantity", e))
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {micros}")))
}

fn unit_cost_param(cost: Option<u64>) -> Result<Option<i64>, StoreError> {
    cost.map(i64::try_from)
        .transpose()
        .map_err(|_| StoreError::Invalid("unit cost out of range".to_string()))
}

fn unit_cost_column(row: &SqliteRow) -> Result<Option<u64>, StoreError> {
    let raw: Option<i64> = row
        .try_get("unit_cost")
        .map_err(|e| map_sqlx_error("read_unit_cost", e))?;
    Ok(raw.map(|v| v.max(0) as u64))
}

fn entry_from_row(row: &SqliteRow) -> Result<StockEntry, StoreError> {
    let key: String = row
        .try_get("item_key")
        .map_err(|e| map_sqlx_error("read_entry", e))?;
    Ok(StockEntry {
        item_key: ItemKey::parse(&key).map_err(|e| StoreError::Backend(e.to_string()))?,
        quantity: row
            .try_get("quantity")
            .map_err(|e| map_sqlx_error("read_entry", e))?,
        unit_cost: unit_cost_column(row)?,
        last_updated: from_micros(
            row.try_get("last_updated")
                .map_err(|e| map_sqlx_error("read_entry", e))?,
        )?,
    })
}

fn movement_from_row(row: &SqliteRow) -> Result<MovementRecord, StoreError> {
    let get_text = |col: &str| -> Result<String, StoreError> {
        row.try_get::<String, _>(col)
            .map_err(|e| map_sqlx_error("read_movement", e))
    };
    let get_int = |col: &str| -> Result<i64, StoreError> {
        row.try_get::<i64, _>(col)
            .map_err(|e| map_sqlx_error("read_movement", e))
    };

    Ok(MovementRecord {
        id: MovementId::new(get_int("id")? as u64),
        kind: MovementKind::from_str(&get_text("kind")?).map_err(|e| StoreError::Backend(e.to_string()))?,
        item_key: ItemKey::parse(&get_text("item_key")?).map_err(|e| StoreError::Backend(e.to_string()))?,
        delta: get_int("delta")?,
        unit_cost: unit_cost_column(row)?,
        reference: get_text("reference")?,
        counterparty: get_text("counterparty")?,
        actor: ActorId::new(get_text("actor")?),
        occurred_at: from_micros(get_int("occurred_at")?)?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    // A failed begin or commit leaves nothing applied, so the whole transaction may run again.
    let at_boundary = matches!(operation, "begin_transaction" | "commit_transaction");
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref().and_then(|c| c.parse::<i32>().ok()) {
                // Primary result code lives in the low byte of extended codes.
                Some(code) if matches!(code & 0xff, 5 | 6) => StoreError::Conflict(msg),
                _ if at_boundary => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Conflict(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other if at_boundary => StoreError::Conflict(format!("sqlx error in {operation}: {other}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
