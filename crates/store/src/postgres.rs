use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, IdempotencyKey, ItemId, Money, OrderId, UserId};
use domain::{Address, InventoryItem, Order, OrderLineItem, OrderStatus, PayMethod};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{Catalog, OrderStore, StoreTransaction},
};

const IDEMPOTENCY_CONSTRAINT: &str = "orders_user_idempotency_key";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `database_url`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("migrations applied");
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts or replaces a catalog item.
    pub async fn upsert_item(&self, item: &InventoryItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (id, name, price_minor, stock, sales)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_minor = EXCLUDED.price_minor,
                stock = EXCLUDED.stock,
                sales = EXCLUDED.sales
            "#,
        )
        .bind(item.id.as_i64())
        .bind(&item.name)
        .bind(item.price.minor())
        .bind(i64::from(item.stock))
        .bind(i64::from(item.sales))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or replaces a shipping address.
    pub async fn upsert_address(&self, address: &Address) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO addresses (id, user_id, receiver, detail, phone)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                receiver = EXCLUDED.receiver,
                detail = EXCLUDED.detail,
                phone = EXCLUDED.phone
            "#,
        )
        .bind(address.id.as_i64())
        .bind(address.user_id.as_i64())
        .bind(&address.receiver)
        .bind(&address.detail)
        .bind(&address.phone)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn count_column(row: &PgRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value)
        .map_err(|_| StoreError::CorruptRow(format!("{column} out of range: {value}")))
}

fn row_to_item(row: PgRow) -> Result<InventoryItem> {
    Ok(InventoryItem {
        id: ItemId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        price: Money::from_minor(row.try_get("price_minor")?),
        stock: count_column(&row, "stock")?,
        sales: count_column(&row, "sales")?,
    })
}

fn row_to_address(row: PgRow) -> Result<Address> {
    Ok(Address {
        id: AddressId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        receiver: row.try_get("receiver")?,
        detail: row.try_get("detail")?,
        phone: row.try_get("phone")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let pay_code: i16 = row.try_get("pay_method")?;
    let pay_method = PayMethod::from_code(pay_code)
        .ok_or_else(|| StoreError::CorruptRow(format!("unknown pay method {pay_code}")))?;
    let status_name: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status_name)
        .ok_or_else(|| StoreError::CorruptRow(format!("unknown order status {status_name}")))?;
    let key: Option<String> = row.try_get("idempotency_key")?;

    Ok(Order {
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        address_id: AddressId::new(row.try_get("address_id")?),
        pay_method,
        total_count: count_column(&row, "total_count")?,
        total_price: Money::from_minor(row.try_get("total_price_minor")?),
        shipping_fee: Money::from_minor(row.try_get("shipping_fee_minor")?),
        status,
        gateway_trade_no: row.try_get("gateway_trade_no")?,
        idempotency_key: key.and_then(IdempotencyKey::new),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn row_to_line(row: PgRow) -> Result<OrderLineItem> {
    Ok(OrderLineItem {
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        item_id: ItemId::new(row.try_get("item_id")?),
        quantity: count_column(&row, "quantity")?,
        unit_price: Money::from_minor(row.try_get("unit_price_minor")?),
        comment: row.try_get("comment")?,
    })
}

const ORDER_COLUMNS: &str = "order_id, user_id, address_id, pay_method, total_count, \
     total_price_minor, shipping_fee_minor, status, gateway_trade_no, idempotency_key, created_at";

#[async_trait]
impl Catalog for PostgresStore {
    async fn get_item(&self, item_id: ItemId) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(
            "SELECT id, name, price_minor, stock, sales FROM inventory_items WHERE id = $1",
        )
        .bind(item_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_item).transpose()
    }

    async fn get_address(&self, address_id: AddressId) -> Result<Option<Address>> {
        let row = sqlx::query(
            "SELECT id, user_id, receiver, detail, phone FROM addresses WHERE id = $1",
        )
        .bind(address_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_address).transpose()
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_order).transpose()
    }

    async fn get_order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, item_id, quantity, unit_price_minor, comment
            FROM order_line_items
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_line).collect()
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY order_id DESC"
        ))
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn find_order_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<OrderId>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT order_id FROM orders WHERE user_id = $1 AND idempotency_key = $2",
        )
        .bind(user_id.as_i64())
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.map(OrderId::from_uuid))
    }
}

/// Transaction over a [`PostgresStore`].
///
/// Dropping it without commit rolls back, as `sqlx` does for any transaction.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn get_item(&mut self, item_id: ItemId) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(
            "SELECT id, name, price_minor, stock, sales FROM inventory_items WHERE id = $1",
        )
        .bind(item_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_item).transpose()
    }

    async fn compare_and_swap_stock(
        &mut self,
        observed: &InventoryItem,
        quantity: u32,
    ) -> Result<u64> {
        let Some(new_stock) = observed.stock.checked_sub(quantity) else {
            return Ok(0);
        };

        // The stock predicate makes this a compare-and-swap: a concurrent
        // writer that committed first leaves zero matching rows.
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET stock = $2, sales = sales + $3
            WHERE id = $1 AND stock = $4
            "#,
        )
        .bind(observed.id.as_i64())
        .bind(i64::from(new_stock))
        .bind(i64::from(quantity))
        .bind(i64::from(observed.stock))
        .execute(&mut *self.tx)
        .await?;

        let affected = result.rows_affected();
        if affected == 0 {
            debug!(item_id = %observed.id, observed = observed.stock, "stock changed since read");
        }
        Ok(affected)
    }

    async fn release_stock(&mut self, item_id: ItemId, quantity: u32) -> Result<()> {
        sqlx::query("UPDATE inventory_items SET stock = stock + $2 WHERE id = $1")
            .bind(item_id.as_i64())
            .bind(i64::from(quantity))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (order_id, user_id, address_id, pay_method, total_count,
                                total_price_minor, shipping_fee_minor, status,
                                gateway_trade_no, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.order_id.as_uuid())
        .bind(order.user_id.as_i64())
        .bind(order.address_id.as_i64())
        .bind(order.pay_method.code())
        .bind(i64::from(order.total_count))
        .bind(order.total_price.minor())
        .bind(order.shipping_fee.minor())
        .bind(order.status.as_str())
        .bind(order.gateway_trade_no.as_deref())
        .bind(order.idempotency_key.as_ref().map(IdempotencyKey::as_str))
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(IDEMPOTENCY_CONSTRAINT)
                && let Some(key) = order.idempotency_key.clone()
            {
                return StoreError::DuplicateIdempotencyKey(key);
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn insert_line(&mut self, line: &OrderLineItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_line_items (order_id, item_id, quantity, unit_price_minor, comment)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(line.order_id.as_uuid())
        .bind(line.item_id.as_i64())
        .bind(i64::from(line.quantity))
        .bind(line.unit_price.minor())
        .bind(line.comment.as_deref())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn transition_status(
        &mut self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, gateway_trade_no = COALESCE($4, gateway_trade_no)
            WHERE order_id = $1 AND status = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(trade_no)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_line_comment(
        &mut self,
        order_id: OrderId,
        item_id: ItemId,
        comment: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE order_line_items SET comment = $3 WHERE order_id = $1 AND item_id = $2",
        )
        .bind(order_id.as_uuid())
        .bind(item_id.as_i64())
        .bind(comment)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
