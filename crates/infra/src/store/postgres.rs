//! Postgres-backed warehouse store.
//!
//! ## Locking
//!
//! Allocation reads the candidate compartment rows with `SELECT ... FOR UPDATE`,
//! so two transactions competing for the same item serialize on those rows.
//! Every compartment write is additionally guarded by the status it expects to
//! overwrite; a guarded update that matches nothing is reported as a conflict.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transactions could not be serialized |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Two allocations locked rows in opposite order |
//! | Database (lock not available) | `55P03` | `Conflict` | `lock_timeout` expired while waiting for a row lock |
//! | Database (query canceled) | `57014` | `Timeout` | `statement_timeout` expired |
//! | Database (other) | Any other | `Backend` | Constraint violations, SQL errors |
//! | PoolTimedOut | N/A | `Timeout` | No connection available in time |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use asrs_core::{AuditEntryId, BoxId, CompartmentId, ItemId, Money, OrderId};
use asrs_warehouse::{
    AuditAction, AuditEntry, AuditFilter, Column, Compartment, CompartmentStatus, Customer, Item,
    Location, NewAuditEntry, NewItem, Order, OrderLine, OrderStatus, SubSlot, TopologySpec,
};

use super::r#trait::{CompartmentRow, LedgerTransaction, StoreError, WarehouseStore};

/// Schema applied by `PostgresWarehouseStore::migrate`.
///
/// `compartments.status` deliberately has no CHECK constraint: legacy rows with
/// other values must stay loadable so the integrity check can report them.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS boxes (
    id      BIGSERIAL PRIMARY KEY,
    col     TEXT    NOT NULL,
    row_no  INTEGER NOT NULL CHECK (row_no > 0),
    UNIQUE (col, row_no)
);

CREATE TABLE IF NOT EXISTS items (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT        NOT NULL,
    description TEXT        NOT NULL DEFAULT '',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS compartments (
    id       BIGSERIAL PRIMARY KEY,
    box_id   BIGINT NOT NULL REFERENCES boxes (id),
    sub_slot TEXT   NOT NULL,
    item_id  BIGINT REFERENCES items (id),
    status   TEXT   NOT NULL DEFAULT 'Empty',
    UNIQUE (box_id, sub_slot)
);

CREATE INDEX IF NOT EXISTS compartments_item_status_idx
    ON compartments (item_id, status);

CREATE TABLE IF NOT EXISTS orders (
    id                 UUID PRIMARY KEY,
    customer_name      TEXT        NOT NULL,
    customer_email     TEXT        NOT NULL,
    customer_phone     TEXT,
    customer_address   TEXT,
    total_amount_cents BIGINT      NOT NULL CHECK (total_amount_cents >= 0),
    status             TEXT        NOT NULL,
    created_at         TIMESTAMPTZ NOT NULL,
    updated_at         TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS order_lines (
    order_id         UUID    NOT NULL REFERENCES orders (id),
    line_no          INTEGER NOT NULL,
    item_id          BIGINT  NOT NULL REFERENCES items (id),
    quantity         INTEGER NOT NULL CHECK (quantity > 0),
    unit_price_cents BIGINT  NOT NULL CHECK (unit_price_cents > 0),
    PRIMARY KEY (order_id, line_no)
);

CREATE TABLE IF NOT EXISTS audit_entries (
    id             BIGSERIAL PRIMARY KEY,
    item_id        BIGINT REFERENCES items (id),
    compartment_id BIGINT REFERENCES compartments (id),
    action         TEXT        NOT NULL CHECK (action IN ('added', 'retrieved', 'ordered')),
    recorded_at    TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
);

CREATE INDEX IF NOT EXISTS audit_entries_recorded_at_idx
    ON audit_entries (recorded_at);
"#;

const COMPARTMENT_COLUMNS: &str = r#"
    c.id, c.box_id, b.col, b.row_no, c.sub_slot, c.status, c.item_id
    FROM compartments c
    JOIN boxes b ON b.id = c.box_id
"#;

/// Postgres-backed warehouse store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresWarehouseStore {
    pool: Arc<PgPool>,
    lock_timeout: Option<Duration>,
}

impl PostgresWarehouseStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            lock_timeout: None,
        }
    }

    #[instrument(skip(url), err)]
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Make row-lock waits inside ledger transactions fail with
    /// `StoreError::Conflict` after `timeout` instead of waiting indefinitely.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn load_lines(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderLine>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, line_no, item_id, quantity, unit_price_cents
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(order_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_lines", e))?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let record = OrderLineRecord::from_row(&row).map_err(|e| map_sqlx_error("load_lines", e))?;
            let line = record.into_line()?;
            lines.entry(*line.order_id.as_uuid()).or_default().push(line);
        }
        Ok(lines)
    }
}

struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerTransaction {
    async fn fetch_compartments(
        &mut self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Compartment>, StoreError> {
        let rows = query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(|row| {
                CompartmentRecord::from_row(row)
                    .map_err(|e| map_sqlx_error(operation, e))?
                    .into_row()?
                    .to_compartment()
            })
            .collect()
    }
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    #[instrument(skip(self), err)]
    async fn find_item(&mut self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query("SELECT id, name, description, created_at FROM items WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_item", e))?;

        row.map(|row| {
            ItemRecord::from_row(&row)
                .map(Item::from)
                .map_err(|e| map_sqlx_error("find_item", e))
        })
        .transpose()
    }

    #[instrument(skip(self), err)]
    async fn lock_occupied_by(&mut self, item_id: ItemId) -> Result<Vec<Compartment>, StoreError> {
        let sql = format!(
            "SELECT {COMPARTMENT_COLUMNS}
             WHERE c.item_id = $1 AND c.status = 'Occupied'
             ORDER BY b.col, b.row_no, c.sub_slot, c.id
             FOR UPDATE OF c"
        );
        let mut compartments = self
            .fetch_compartments("lock_occupied_by", sqlx::query(&sql).bind(item_id.get()))
            .await?;
        // Collation-independent release order.
        compartments.sort_by(|a, b| {
            a.location()
                .cmp(b.location())
                .then_with(|| a.id_typed().cmp(&b.id_typed()))
        });
        Ok(compartments)
    }

    #[instrument(skip(self), err)]
    async fn lock_compartment(
        &mut self,
        id: CompartmentId,
    ) -> Result<Option<Compartment>, StoreError> {
        let sql = format!("SELECT {COMPARTMENT_COLUMNS} WHERE c.id = $1 FOR UPDATE OF c");
        let mut found = self
            .fetch_compartments("lock_compartment", sqlx::query(&sql).bind(id.get()))
            .await?;
        Ok(found.pop())
    }

    #[instrument(skip(self), fields(location = %location), err)]
    async fn lock_compartment_at(
        &mut self,
        location: &Location,
    ) -> Result<Option<Compartment>, StoreError> {
        let sql = format!(
            "SELECT {COMPARTMENT_COLUMNS}
             WHERE b.col = $1 AND b.row_no = $2 AND c.sub_slot = $3
             FOR UPDATE OF c"
        );
        let query = sqlx::query(&sql)
            .bind(location.column().to_string())
            .bind(i32::from(location.row()))
            .bind(location.sub_slot().as_str().to_string());
        let mut found = self.fetch_compartments("lock_compartment_at", query).await?;
        Ok(found.pop())
    }

    #[instrument(skip(self, compartment), fields(compartment_id = %compartment.id_typed()), err)]
    async fn update_compartment(
        &mut self,
        compartment: &Compartment,
        expected: CompartmentStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE compartments
            SET status = $2, item_id = $3
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(compartment.id_typed().get())
        .bind(compartment.status().as_str())
        .bind(compartment.item_id().map(ItemId::get))
        .bind(expected.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_compartment", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "compartment {} is no longer '{expected}'",
                compartment.id_typed()
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id), err)]
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_name, customer_email, customer_phone, customer_address,
                total_amount_cents, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.customer.name)
        .bind(&order.customer.email)
        .bind(order.customer.phone.as_deref())
        .bind(order.customer.address.as_deref())
        .bind(cents_to_db(order.total_amount)?)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for line in &order.lines {
            let quantity = i32::try_from(line.quantity)
                .map_err(|_| StoreError::Backend(format!("quantity {} out of range", line.quantity)))?;
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, item_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line.line_no as i32)
            .bind(line.item_id.get())
            .bind(quantity)
            .bind(cents_to_db(line.unit_price)?)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_line", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, entry), fields(action = %entry.action), err)]
    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO audit_entries (item_id, compartment_id, action, recorded_at)
            VALUES ($1, $2, $3, clock_timestamp())
            RETURNING id, recorded_at
            "#,
        )
        .bind(entry.item_id.map(ItemId::get))
        .bind(entry.compartment_id.map(CompartmentId::get))
        .bind(entry.action.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_audit", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("append_audit", e))?;
        let recorded_at: DateTime<Utc> = row
            .try_get("recorded_at")
            .map_err(|e| map_sqlx_error("append_audit", e))?;
        Ok(entry.stamp(AuditEntryId::new(id), recorded_at))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl WarehouseStore for PostgresWarehouseStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if let Some(timeout) = self.lock_timeout {
            sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                .bind(format!("{}ms", timeout.as_millis()))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;
        }

        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    #[instrument(skip(self, topology), fields(compartments = topology.compartment_count()), err)]
    async fn provision(&self, topology: &TopologySpec) -> Result<usize, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let mut created = 0usize;

        for (column, row) in topology.box_positions() {
            let box_row = sqlx::query(
                r#"
                INSERT INTO boxes (col, row_no)
                VALUES ($1, $2)
                ON CONFLICT (col, row_no) DO UPDATE SET col = EXCLUDED.col
                RETURNING id
                "#,
            )
            .bind(column.to_string())
            .bind(i32::from(row))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("provision_box", e))?;
            let box_id: i64 = box_row
                .try_get("id")
                .map_err(|e| map_sqlx_error("provision_box", e))?;

            for sub_slot in topology.sub_slots() {
                let result = sqlx::query(
                    r#"
                    INSERT INTO compartments (box_id, sub_slot, status)
                    VALUES ($1, $2, 'Empty')
                    ON CONFLICT (box_id, sub_slot) DO NOTHING
                    "#,
                )
                .bind(box_id)
                .bind(sub_slot.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("provision_compartment", e))?;
                created += result.rows_affected() as usize;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(created)
    }

    #[instrument(skip(self, item), fields(name = %item.name), err)]
    async fn create_item(&self, item: NewItem) -> Result<Item, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO items (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(&item.name)
        .bind(&item.description)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_item", e))?;

        ItemRecord::from_row(&row)
            .map(Item::from)
            .map_err(|e| map_sqlx_error("create_item", e))
    }

    #[instrument(skip(self), err)]
    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query("SELECT id, name, description, created_at FROM items ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter()
            .map(|row| {
                ItemRecord::from_row(row)
                    .map(Item::from)
                    .map_err(|e| map_sqlx_error("list_items", e))
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn compartment(&self, id: CompartmentId) -> Result<Option<Compartment>, StoreError> {
        let sql = format!("SELECT {COMPARTMENT_COLUMNS} WHERE c.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("compartment", e))?;

        row.map(|row| {
            CompartmentRecord::from_row(&row)
                .map_err(|e| map_sqlx_error("compartment", e))?
                .into_row()?
                .to_compartment()
        })
        .transpose()
    }

    #[instrument(skip(self), fields(location = %location), err)]
    async fn compartment_by_location(
        &self,
        location: &Location,
    ) -> Result<Option<Compartment>, StoreError> {
        let sql = format!(
            "SELECT {COMPARTMENT_COLUMNS} WHERE b.col = $1 AND b.row_no = $2 AND c.sub_slot = $3"
        );
        let row = sqlx::query(&sql)
            .bind(location.column().to_string())
            .bind(i32::from(location.row()))
            .bind(location.sub_slot().as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("compartment_by_location", e))?;

        row.map(|row| {
            CompartmentRecord::from_row(&row)
                .map_err(|e| map_sqlx_error("compartment_by_location", e))?
                .into_row()?
                .to_compartment()
        })
        .transpose()
    }

    #[instrument(skip(self), err)]
    async fn occupied_count(&self, item_id: ItemId) -> Result<u32, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS occupied FROM compartments WHERE item_id = $1 AND status = 'Occupied'",
        )
        .bind(item_id.get())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("occupied_count", e))?;

        let count: i64 = row
            .try_get("occupied")
            .map_err(|e| map_sqlx_error("occupied_count", e))?;
        Ok(count as u32)
    }

    #[instrument(skip(self), err)]
    async fn occupied_counts(&self) -> Result<BTreeMap<ItemId, u32>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, COUNT(c.id) AS occupied
            FROM items i
            LEFT JOIN compartments c ON c.item_id = i.id AND c.status = 'Occupied'
            GROUP BY i.id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("occupied_counts", e))?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("occupied_counts", e))?;
            let count: i64 = row
                .try_get("occupied")
                .map_err(|e| map_sqlx_error("occupied_counts", e))?;
            counts.insert(ItemId::new(id), count as u32);
        }
        Ok(counts)
    }

    #[instrument(skip(self), err)]
    async fn list_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, compartment_id, action, recorded_at
            FROM audit_entries
            WHERE ($1::bigint IS NULL OR item_id = $1)
                AND ($2::bigint IS NULL OR compartment_id = $2)
                AND ($3::text IS NULL OR action = $3)
                AND ($4::timestamptz IS NULL OR recorded_at >= $4)
                AND ($5::timestamptz IS NULL OR recorded_at <= $5)
            ORDER BY id ASC
            LIMIT $6
            "#,
        )
        .bind(filter.item_id.map(ItemId::get))
        .bind(filter.compartment_id.map(CompartmentId::get))
        .bind(filter.action.map(|a| a.as_str()))
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_audit", e))?;

        rows.iter()
            .map(|row| {
                AuditRecord::from_row(row)
                    .map_err(|e| map_sqlx_error("list_audit", e))?
                    .into_entry()
            })
            .collect()
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_name, customer_email, customer_phone, customer_address,
                   total_amount_cents, status, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_order", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record = OrderRecord::from_row(&row).map_err(|e| map_sqlx_error("find_order", e))?;
        let mut lines = self.load_lines(&[record.id]).await?;
        let order_lines = lines.remove(&record.id).unwrap_or_default();
        record.into_order(order_lines).map(Some)
    }

    #[instrument(skip(self), err)]
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_name, customer_email, customer_phone, customer_address,
                   total_amount_cents, status, created_at, updated_at
            FROM orders
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let records = rows
            .iter()
            .map(|row| OrderRecord::from_row(row).map_err(|e| map_sqlx_error("list_orders", e)))
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let mut lines = self.load_lines(&ids).await?;

        records
            .into_iter()
            .map(|record| {
                let order_lines = lines.remove(&record.id).unwrap_or_default();
                record.into_order(order_lines)
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn compartment_rows(&self) -> Result<Vec<CompartmentRow>, StoreError> {
        let sql = format!("SELECT {COMPARTMENT_COLUMNS} ORDER BY c.id");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("compartment_rows", e))?;

        rows.iter()
            .map(|row| {
                CompartmentRecord::from_row(row)
                    .map_err(|e| map_sqlx_error("compartment_rows", e))?
                    .into_row()
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn reset_compartment(&self, id: CompartmentId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE compartments SET status = 'Empty', item_id = NULL WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("reset_compartment", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!("no compartment with id {id}")));
        }
        Ok(())
    }
}

fn cents_to_db(amount: Money) -> Result<i64, StoreError> {
    i64::try_from(amount.cents())
        .map_err(|_| StoreError::Backend(format!("amount {amount} exceeds storage range")))
}

fn cents_from_db(cents: i64) -> Result<Money, StoreError> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::Corrupt(format!("negative amount {cents} in storage")))
}

/// Map SQLx errors to `StoreError` (see the table in the module docs).
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("55P03") => StoreError::Conflict(msg),
                Some("57014") => StoreError::Timeout(msg),
                _ => {
                    tracing::error!(operation, error = %msg, "storage failure");
                    StoreError::Backend(msg)
                }
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {}", operation))
        }
        other => {
            tracing::error!(operation, error = %other, "storage failure");
            StoreError::Backend(format!("sqlx error in {}: {}", operation, other))
        }
    }
}

// SQLx row types

#[derive(Debug)]
struct CompartmentRecord {
    id: i64,
    box_id: i64,
    col: String,
    row_no: i32,
    sub_slot: String,
    status: String,
    item_id: Option<i64>,
}

impl<'r> FromRow<'r, PgRow> for CompartmentRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CompartmentRecord {
            id: row.try_get("id")?,
            box_id: row.try_get("box_id")?,
            col: row.try_get("col")?,
            row_no: row.try_get("row_no")?,
            sub_slot: row.try_get("sub_slot")?,
            status: row.try_get("status")?,
            item_id: row.try_get("item_id")?,
        })
    }
}

impl CompartmentRecord {
    fn into_row(self) -> Result<CompartmentRow, StoreError> {
        let corrupt = |what: &str| {
            StoreError::Corrupt(format!("compartment {}: invalid {what}", self.id))
        };
        let column: Column = self.col.parse().map_err(|_| corrupt("column"))?;
        let row = u16::try_from(self.row_no).map_err(|_| corrupt("row"))?;
        let sub_slot = SubSlot::new(&self.sub_slot).map_err(|_| corrupt("sub-slot"))?;
        let location = Location::new(column, row, sub_slot).map_err(|_| corrupt("location"))?;

        Ok(CompartmentRow {
            id: CompartmentId::new(self.id),
            box_id: BoxId::new(self.box_id),
            location,
            status: self.status,
            item_id: self.item_id.map(ItemId::new),
        })
    }
}

#[derive(Debug)]
struct ItemRecord {
    id: i64,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ItemRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<ItemRecord> for Item {
    fn from(record: ItemRecord) -> Self {
        Item {
            id: ItemId::new(record.id),
            name: record.name,
            description: record.description,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug)]
struct OrderRecord {
    id: Uuid,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    customer_address: Option<String>,
    total_amount_cents: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrderRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRecord {
            id: row.try_get("id")?,
            customer_name: row.try_get("customer_name")?,
            customer_email: row.try_get("customer_email")?,
            customer_phone: row.try_get("customer_phone")?,
            customer_address: row.try_get("customer_address")?,
            total_amount_cents: row.try_get("total_amount_cents")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl OrderRecord {
    fn into_order(self, lines: Vec<OrderLine>) -> Result<Order, StoreError> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("order {}: {e}", self.id)))?;

        Ok(Order {
            id: OrderId::from_uuid(self.id),
            customer: Customer {
                name: self.customer_name,
                email: self.customer_email,
                phone: self.customer_phone,
                address: self.customer_address,
            },
            total_amount: cents_from_db(self.total_amount_cents)?,
            status,
            lines,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug)]
struct OrderLineRecord {
    order_id: Uuid,
    line_no: i32,
    item_id: i64,
    quantity: i32,
    unit_price_cents: i64,
}

impl<'r> FromRow<'r, PgRow> for OrderLineRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderLineRecord {
            order_id: row.try_get("order_id")?,
            line_no: row.try_get("line_no")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            unit_price_cents: row.try_get("unit_price_cents")?,
        })
    }
}

impl OrderLineRecord {
    fn into_line(self) -> Result<OrderLine, StoreError> {
        let corrupt = |what: &str| {
            StoreError::Corrupt(format!("order {} line {}: invalid {what}", self.order_id, self.line_no))
        };
        Ok(OrderLine {
            order_id: OrderId::from_uuid(self.order_id),
            line_no: u32::try_from(self.line_no).map_err(|_| corrupt("line number"))?,
            item_id: ItemId::new(self.item_id),
            quantity: u32::try_from(self.quantity).map_err(|_| corrupt("quantity"))?,
            unit_price: cents_from_db(self.unit_price_cents)?,
        })
    }
}

#[derive(Debug)]
struct AuditRecord {
    id: i64,
    item_id: Option<i64>,
    compartment_id: Option<i64>,
    action: String,
    recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AuditRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AuditRecord {
            id: row.try_get("id")?,
            item_id: row.try_get("item_id")?,
            compartment_id: row.try_get("compartment_id")?,
            action: row.try_get("action")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl AuditRecord {
    fn into_entry(self) -> Result<AuditEntry, StoreError> {
        let action: AuditAction = self
            .action
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("audit entry {}: {e}", self.id)))?;
        Ok(AuditEntry {
            id: AuditEntryId::new(self.id),
            item_id: self.item_id.map(ItemId::new),
            compartment_id: self.compartment_id.map(CompartmentId::new),
            action,
            recorded_at: self.recorded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_leaves_compartment_status_unconstrained() {
        let compartments = SCHEMA
            .split("CREATE TABLE")
            .find(|t| t.contains("IF NOT EXISTS compartments"))
            .unwrap();
        assert!(!compartments.contains("CHECK"));
        assert!(SCHEMA.contains("CHECK (action IN ('added', 'retrieved', 'ordered'))"));
    }

    #[test]
    fn audit_time_is_assigned_by_the_database() {
        assert!(SCHEMA.contains("recorded_at    TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()"));
    }

    #[test]
    fn amounts_outside_storage_range_are_rejected() {
        assert_eq!(cents_to_db(Money::from_cents(2500)).unwrap(), 2500);
        assert!(cents_to_db(Money::from_cents(u64::MAX)).is_err());
        assert!(matches!(cents_from_db(-1), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn corrupt_location_columns_surface_as_corruption() {
        let record = CompartmentRecord {
            id: 4,
            box_id: 1,
            col: "??".to_string(),
            row_no: 1,
            sub_slot: "a".to_string(),
            status: "Empty".to_string(),
            item_id: None,
        };
        assert!(matches!(record.into_row(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn pool_timeouts_map_to_timeout() {
        assert!(matches!(
            map_sqlx_error("begin", sqlx::Error::PoolTimedOut),
            StoreError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_error("begin", sqlx::Error::PoolClosed),
            StoreError::Backend(_)
        ));
    }
}
