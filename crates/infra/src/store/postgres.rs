//! Postgres-backed store.
//!
//! The store traits are synchronous; all sqlx calls are bridged with
//! `tokio::runtime::Handle::block_on`, so every method must be called from
//! within a tokio runtime context.
//!
//! Concurrency: `product_for_update` issues `SELECT ... FOR UPDATE`, so the
//! check-then-write on stock is serialized per product row. Unique-constraint
//! violations (`23505` on sku / order_number) map to `StoreError::Conflict`.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use storefront_catalog::Product;
use storefront_core::{OrderId, Page, PageRequest, ProductId, SortDirection, UserId};
use storefront_orders::model::{Order, OrderLine, OrderNumber, OrderStatus, PaymentStatus};
use storefront_orders::store::{
    OrderFilter, OrderSort, OrderStore, StoreError, StoreTx, UserDirectory,
};

/// Postgres order + product store.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the schema if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS products (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                price NUMERIC NOT NULL CHECK (price > 0),
                stock INTEGER NOT NULL CHECK (stock >= 0),
                category TEXT,
                brand TEXT,
                image_url TEXT,
                sku TEXT NOT NULL UNIQUE,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );

            CREATE TABLE IF NOT EXISTS orders (
                id UUID PRIMARY KEY,
                order_number TEXT NOT NULL UNIQUE,
                user_id UUID NOT NULL,
                status TEXT NOT NULL,
                total_amount NUMERIC NOT NULL CHECK (total_amount >= 0),
                total_items INTEGER NOT NULL,
                shipping_address TEXT NOT NULL,
                billing_address TEXT,
                payment_method TEXT,
                payment_status TEXT,
                notes TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders (user_id);
            CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status);

            CREATE TABLE IF NOT EXISTS order_lines (
                order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                product_id UUID NOT NULL,
                product_name TEXT NOT NULL,
                unit_price NUMERIC NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                subtotal NUMERIC NOT NULL,
                PRIMARY KEY (order_id, position)
            );
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Sync wrapper around [`Self::ensure_schema`].
    pub fn ensure_schema_blocking(&self) -> Result<(), StoreError> {
        Self::runtime_handle()?.block_on(self.ensure_schema())
    }

    async fn find_order_async(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("{ORDER_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_order", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let lines = load_lines(&*self.pool, id).await?;
        Ok(Some(order_from_row(&row, lines)?))
    }

    async fn list_orders_async(
        &self,
        filter: OrderFilter,
        page: PageRequest,
        sort: OrderSort,
    ) -> Result<Page<Order>, StoreError> {
        // Filter binds as $1 when present; column and direction come from
        // fixed enums, never from input.
        let (where_clause, owner, status) = match filter {
            OrderFilter::All => ("", None, None),
            OrderFilter::Owner(user) => ("WHERE user_id = $1", Some(*user.as_uuid()), None),
            OrderFilter::Status(s) => ("WHERE status = $1", None, Some(s.as_str())),
        };
        let order_clause = format!(
            "ORDER BY {} {}",
            sort.field.as_str(),
            match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            }
        );
        let (limit_params, has_filter) = if where_clause.is_empty() {
            (("$1", "$2"), false)
        } else {
            (("$2", "$3"), true)
        };

        let count_sql = format!("SELECT COUNT(*) AS total FROM orders {where_clause}");
        let mut count_query = sqlx::query(&count_sql);
        if let Some(owner) = owner {
            count_query = count_query.bind(owner);
        } else if let Some(status) = status {
            count_query = count_query.bind(status);
        }
        let count_row = count_query
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_orders", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let list_sql = format!(
            "{ORDER_SELECT} {where_clause} {order_clause} LIMIT {} OFFSET {}",
            limit_params.0, limit_params.1
        );
        let mut list_query = sqlx::query(&list_sql);
        if has_filter {
            if let Some(owner) = owner {
                list_query = list_query.bind(owner);
            } else if let Some(status) = status {
                list_query = list_query.bind(status);
            }
        }
        let rows = list_query
            .bind(i64::from(page.size))
            .bind(page.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id: uuid::Uuid = row
                .try_get("id")
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let lines = load_lines(&*self.pool, OrderId::from_uuid(id)).await?;
            items.push(order_from_row(&row, lines)?);
        }
        Ok(Page::new(items, page, total as u64))
    }

    fn runtime_handle() -> Result<tokio::runtime::Handle, StoreError> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::backend(
                "PostgresOrderStore requires a tokio runtime context",
            )
        })
    }
}

impl OrderStore for PostgresOrderStore {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError> {
        let handle = Self::runtime_handle()?;
        let tx = handle
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresTx { handle, tx }))
    }

    fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Self::runtime_handle()?.block_on(self.find_order_async(id))
    }

    fn list_orders(
        &self,
        filter: OrderFilter,
        page: PageRequest,
        sort: OrderSort,
    ) -> Result<Page<Order>, StoreError> {
        Self::runtime_handle()?.block_on(self.list_orders_async(filter, page, sort))
    }
}

/// One open sqlx transaction, driven synchronously.
struct PostgresTx {
    handle: tokio::runtime::Handle,
    tx: Transaction<'static, Postgres>,
}

impl StoreTx for PostgresTx {
    fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let handle = self.handle.clone();
        handle.block_on(async {
            let row = sqlx::query(
                r#"
                SELECT id, name, description, price, stock, category, brand,
                       image_url, sku, is_active, created_at, updated_at
                FROM products
                WHERE id = $1
                FOR UPDATE
                "#,
            )
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("product_for_update", e))?;

            row.map(|r| product_from_row(&r)).transpose()
        })
    }

    fn set_product_stock(&mut self, id: ProductId, stock: u32) -> Result<(), StoreError> {
        let handle = self.handle.clone();
        handle.block_on(async {
            sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(stock as i32)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("set_product_stock", e))?;
            Ok(())
        })
    }

    fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let handle = self.handle.clone();
        handle.block_on(async {
            let row = sqlx::query(&format!("{ORDER_SELECT} WHERE id = $1 FOR UPDATE"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("get_order", e))?;

            let Some(row) = row else {
                return Ok(None);
            };
            let lines = load_lines(&mut *self.tx, id).await?;
            Ok(Some(order_from_row(&row, lines)?))
        })
    }

    fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let handle = self.handle.clone();
        handle.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO orders (
                    id, order_number, user_id, status, total_amount, total_items,
                    shipping_address, billing_address, payment_method,
                    payment_status, notes, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(order.order_number.as_str())
            .bind(order.user_id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.total_amount)
            .bind(order.total_items as i32)
            .bind(&order.shipping_address)
            .bind(order.billing_address.as_deref())
            .bind(order.payment_method.as_deref())
            .bind(order.payment_status.map(|p| p.as_str()))
            .bind(order.notes.as_deref())
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;

            insert_lines(&mut self.tx, order).await
        })
    }

    fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let handle = self.handle.clone();
        handle.block_on(async {
            sqlx::query(
                r#"
                UPDATE orders SET
                    status = $2,
                    total_amount = $3,
                    total_items = $4,
                    shipping_address = $5,
                    billing_address = $6,
                    payment_method = $7,
                    payment_status = $8,
                    notes = $9,
                    updated_at = $10
                WHERE id = $1
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.total_amount)
            .bind(order.total_items as i32)
            .bind(&order.shipping_address)
            .bind(order.billing_address.as_deref())
            .bind(order.payment_method.as_deref())
            .bind(order.payment_status.map(|p| p.as_str()))
            .bind(order.notes.as_deref())
            .bind(order.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_order", e))?;

            // Lines are replaced wholesale.
            sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
                .bind(order.id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("delete_order_lines", e))?;

            insert_lines(&mut self.tx, order).await
        })
    }

    fn delete_order(&mut self, id: OrderId) -> Result<(), StoreError> {
        let handle = self.handle.clone();
        handle.block_on(async {
            sqlx::query("DELETE FROM orders WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("delete_order", e))?;
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { handle, tx } = *self;
        handle
            .block_on(tx.commit())
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

/// Owner lookup against the users table.
#[derive(Debug, Clone)]
pub struct PostgresUserDirectory {
    pool: Arc<PgPool>,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

impl UserDirectory for PostgresUserDirectory {
    fn exists(&self, user: UserId) -> Result<bool, StoreError> {
        let handle = PostgresOrderStore::runtime_handle()?;
        handle.block_on(async {
            let row = sqlx::query("SELECT 1 AS one FROM users WHERE id = $1")
                .bind(user.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("user_exists", e))?;
            Ok(row.is_some())
        })
    }
}

const ORDER_SELECT: &str = r#"
    SELECT id, order_number, user_id, status, total_amount, total_items,
           shipping_address, billing_address, payment_method, payment_status,
           notes, created_at, updated_at
    FROM orders
"#;

async fn load_lines<'e, E>(executor: E, order_id: OrderId) -> Result<Vec<OrderLine>, StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT product_id, product_name, unit_price, quantity, subtotal
        FROM order_lines
        WHERE order_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(order_id.as_uuid())
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("load_lines", e))?;

    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        lines.push(line_from_row(&row)?);
    }
    Ok(lines)
}

async fn insert_lines(
    tx: &mut Transaction<'static, Postgres>,
    order: &Order,
) -> Result<(), StoreError> {
    for (position, line) in order.lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_lines (
                order_id, position, product_id, product_name,
                unit_price, quantity, subtotal
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(position as i32)
        .bind(line.product_id.as_uuid())
        .bind(&line.product_name)
        .bind(line.unit_price)
        .bind(line.quantity as i32)
        .bind(line.subtotal)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_line", e))?;
    }
    Ok(())
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Result<Product, StoreError> {
    let ser = |e: sqlx::Error| StoreError::Serialization(e.to_string());
    let stock: i32 = row.try_get("stock").map_err(ser)?;
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<uuid::Uuid, _>("id").map_err(ser)?),
        name: row.try_get("name").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        price: row.try_get::<Decimal, _>("price").map_err(ser)?,
        stock: stock.max(0) as u32,
        category: row.try_get("category").map_err(ser)?,
        brand: row.try_get("brand").map_err(ser)?,
        image_url: row.try_get("image_url").map_err(ser)?,
        sku: row.try_get("sku").map_err(ser)?,
        is_active: row.try_get("is_active").map_err(ser)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(ser)?,
    })
}

fn order_from_row(
    row: &sqlx::postgres::PgRow,
    lines: Vec<OrderLine>,
) -> Result<Order, StoreError> {
    let ser = |e: sqlx::Error| StoreError::Serialization(e.to_string());
    let status: String = row.try_get("status").map_err(ser)?;
    let payment_status: Option<String> = row.try_get("payment_status").map_err(ser)?;
    let total_items: i32 = row.try_get("total_items").map_err(ser)?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<uuid::Uuid, _>("id").map_err(ser)?),
        order_number: OrderNumber::from_string(row.try_get("order_number").map_err(ser)?),
        user_id: UserId::from_uuid(row.try_get::<uuid::Uuid, _>("user_id").map_err(ser)?),
        status: OrderStatus::from_str(&status)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        total_amount: row.try_get::<Decimal, _>("total_amount").map_err(ser)?,
        total_items: total_items.max(0) as u32,
        shipping_address: row.try_get("shipping_address").map_err(ser)?,
        billing_address: row.try_get("billing_address").map_err(ser)?,
        payment_method: row.try_get("payment_method").map_err(ser)?,
        payment_status: payment_status
            .as_deref()
            .map(PaymentStatus::from_str)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        notes: row.try_get("notes").map_err(ser)?,
        lines,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(ser)?,
    })
}

fn line_from_row(row: &sqlx::postgres::PgRow) -> Result<OrderLine, StoreError> {
    let ser = |e: sqlx::Error| StoreError::Serialization(e.to_string());
    let quantity: i32 = row.try_get("quantity").map_err(ser)?;
    Ok(OrderLine {
        product_id: ProductId::from_uuid(row.try_get::<uuid::Uuid, _>("product_id").map_err(ser)?),
        product_name: row.try_get("product_name").map_err(ser)?,
        unit_price: row.try_get::<Decimal, _>("unit_price").map_err(ser)?,
        quantity: quantity.max(0) as u32,
        subtotal: row.try_get::<Decimal, _>("subtotal").map_err(ser)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                StoreError::Conflict(msg)
            } else {
                StoreError::Backend(msg)
            }
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
