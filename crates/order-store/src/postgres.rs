use async_trait::async_trait;
use common::{Money, OrderId, OrderStatus, ProductId};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    NewOrder, NewOrderProduct, NewProduct, OrderFilter, OrderProductRow, OrderRow, OrderUpdate,
    ProductRow, Result, StoreError,
    store::{OrderRepository, ProductCatalog, checked_amount, line_total, reconcile_order_cost},
};

const ORDER_COLUMNS: &str = "uuid, comment, user_id, staff_id, order_cost, status::text AS status, creation_date, finish_date";

const PRODUCT_COLUMNS: &str = "uuid, name, product_code, customer_cost, created_at, updated_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<OrderRow> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(OrderRow {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("uuid")?),
            comment: row.try_get("comment")?,
            user_id: row.try_get("user_id")?,
            staff_id: row.try_get("staff_id")?,
            order_cost: Money::new(row.try_get::<Decimal, _>("order_cost")?),
            status,
            creation_date: row.try_get("creation_date")?,
            finish_date: row.try_get("finish_date")?,
        })
    }

    fn row_to_order_product(row: PgRow) -> Result<OrderProductRow> {
        let amount: i32 = row.try_get("amount")?;
        let amount = u32::try_from(amount)
            .map_err(|_| StoreError::Decode(format!("negative line item amount {amount}")))?;

        Ok(OrderProductRow {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_uuid")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_uuid")?),
            result_price: Money::new(row.try_get::<Decimal, _>("result_price")?),
            amount,
            product_name: row.try_get("name")?,
            product_code: row.try_get("product_code")?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<ProductRow> {
        Ok(ProductRow {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("uuid")?),
            name: row.try_get("name")?,
            product_code: row.try_get("product_code")?,
            customer_cost: Money::new(row.try_get::<Decimal, _>("customer_cost")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn insert_order(conn: &mut PgConnection, order: &NewOrder) -> Result<OrderRow> {
        let sql = format!(
            "INSERT INTO orders (uuid, comment, user_id, staff_id, order_cost) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(OrderId::new().as_uuid())
            .bind(&order.comment)
            .bind(&order.user_id)
            .bind(&order.staff_id)
            .bind(order.order_cost.amount())
            .fetch_one(conn)
            .await?;
        Self::row_to_order(row)
    }

    /// Looks up the catalog price of a product.
    async fn product_price(conn: &mut PgConnection, product_id: ProductId) -> Result<Money> {
        let price: Option<Decimal> =
            sqlx::query_scalar("SELECT customer_cost FROM products WHERE uuid = $1")
                .bind(product_id.as_uuid())
                .fetch_optional(conn)
                .await?;
        price
            .map(Money::new)
            .ok_or(StoreError::ProductNotFound(product_id))
    }

    async fn insert_line_item(
        conn: &mut PgConnection,
        order_id: OrderId,
        product_id: ProductId,
        price: Money,
        amount: u32,
    ) -> Result<()> {
        let stored_amount = checked_amount(amount)?;
        sqlx::query(
            r#"
            INSERT INTO order_products (order_uuid, product_uuid, result_price, amount)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(price.amount())
        .bind(stored_amount)
        .execute(conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_order_product")
            {
                return StoreError::DuplicateLineItem {
                    order_id,
                    product_id,
                };
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderStore {
    async fn create_naked_order(&self, order: NewOrder) -> Result<OrderRow> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_order(&mut conn, &order).await
    }

    async fn create_with_products(
        &self,
        order: NewOrder,
        products: Vec<NewOrderProduct>,
    ) -> Result<OrderRow> {
        if products.is_empty() {
            return Err(StoreError::EmptyOrder);
        }

        // Every early return drops the transaction, which rolls it back.
        let mut tx = self.pool.begin().await?;

        let mut created = Self::insert_order(&mut tx, &order).await?;

        let mut totals = Vec::with_capacity(products.len());
        for input in &products {
            let price = Self::product_price(&mut tx, input.product_id).await?;
            Self::insert_line_item(&mut tx, created.id, input.product_id, price, input.amount)
                .await?;
            totals.push(line_total(price, input.amount)?);
        }

        let computed = Money::checked_sum(totals)?;
        let order_cost = reconcile_order_cost(order.order_cost, computed)?;

        if order_cost != created.order_cost {
            sqlx::query("UPDATE orders SET order_cost = $2 WHERE uuid = $1")
                .bind(created.id.as_uuid())
                .bind(order_cost.amount())
                .execute(&mut *tx)
                .await?;
            created.order_cost = order_cost;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn add_order_product(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        amount: u32,
    ) -> Result<OrderProductRow> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM orders WHERE uuid = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::OrderNotFound(order_id));
        }

        let price = Self::product_price(&mut tx, product_id).await?;
        Self::insert_line_item(&mut tx, order_id, product_id, price, amount).await?;

        let row = sqlx::query(
            r#"
            SELECT op.order_uuid, op.product_uuid, op.result_price, op.amount, p.name, p.product_code
            FROM order_products op
            JOIN products p ON p.uuid = op.product_uuid
            WHERE op.order_uuid = $1 AND op.product_uuid = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::row_to_order_product(row)
    }

    async fn get(&self, id: OrderId) -> Result<OrderRow> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE uuid = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::OrderNotFound(id))?;
        Self::row_to_order(row)
    }

    async fn list(&self, filter: OrderFilter) -> Result<Vec<OrderRow>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::text IS NULL OR status::text = $1::text) \
             ORDER BY creation_date DESC, uuid \
             LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<OrderRow> {
        let mut tx = self.pool.begin().await?;

        // The row lock keeps the transition check and the write together.
        let current: Option<String> =
            sqlx::query_scalar("SELECT status::text FROM orders WHERE uuid = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let current = current
            .ok_or(StoreError::OrderNotFound(id))?
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if let Some(next) = update.status
            && !current.can_transition_to(next)
        {
            return Err(StoreError::InvalidStatusTransition {
                from: current,
                to: next,
            });
        }

        let sql = format!(
            "UPDATE orders SET \
                 comment = COALESCE($2::text, comment), \
                 order_cost = COALESCE($3::numeric, order_cost), \
                 status = COALESCE($4::text::order_status, status), \
                 finish_date = CASE \
                     WHEN $4::text IN ('completed', 'cancelled') THEN COALESCE(finish_date, NOW()) \
                     ELSE finish_date \
                 END \
             WHERE uuid = $1 \
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(update.comment)
            .bind(update.order_cost.map(|cost| cost.amount()))
            .bind(update.status.map(|s| s.as_str()))
            .fetch_one(&mut *tx)
            .await?;
        let order = Self::row_to_order(row)?;

        tx.commit().await?;
        Ok(order)
    }

    async fn delete(&self, id: OrderId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM order_products WHERE order_uuid = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM orders WHERE uuid = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order_products(&self, id: OrderId) -> Result<Vec<OrderProductRow>> {
        let rows = sqlx::query(
            r#"
            SELECT op.order_uuid, op.product_uuid, op.result_price, op.amount, p.name, p.product_code
            FROM order_products op
            JOIN products p ON p.uuid = op.product_uuid
            WHERE op.order_uuid = $1
            ORDER BY op.id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order_product).collect()
    }

    async fn calculate_order_total(&self, id: OrderId) -> Result<Money> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(result_price * amount), 0) FROM order_products WHERE order_uuid = $1",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::new(total))
    }
}

#[async_trait]
impl ProductCatalog for PostgresOrderStore {
    async fn create_product(&self, product: NewProduct) -> Result<ProductRow> {
        let sql = format!(
            "INSERT INTO products (uuid, name, product_code, customer_cost) \
             VALUES ($1, $2, $3, $4) RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(ProductId::new().as_uuid())
            .bind(&product.name)
            .bind(product.product_code)
            .bind(product.customer_cost.amount())
            .fetch_one(&self.pool)
            .await?;
        Self::row_to_product(row)
    }

    async fn get_product(&self, id: ProductId) -> Result<ProductRow> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE uuid = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::ProductNotFound(id))?;
        Self::row_to_product(row)
    }

    async fn list_products(&self) -> Result<Vec<ProductRow>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name ASC, uuid ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE uuid = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("order_products_product_fkey")
                {
                    return StoreError::ProductInUse(id);
                }
                StoreError::Database(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }
}
