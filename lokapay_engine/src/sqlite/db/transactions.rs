use chrono::{DateTime, Utc};
use log::{debug, trace};
use lokapay_common::{Rupiah, TxId};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewTransaction, Transaction, TransactionStatus},
    lpe_api::TransactionFilter,
    traits::PaymentEngineError,
};

/// Inserts the transaction into the database, returning `false` in the second parameter if a
/// transaction with the same `tx_id` already exists.
pub async fn idempotent_insert(
    transaction: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<(Transaction, bool), PaymentEngineError> {
    let inserted = match fetch_by_tx_id(&transaction.tx_id, conn).await? {
        Some(existing) => (existing, false),
        None => {
            let transaction = insert_transaction(transaction, conn).await?;
            debug!("🗃️ Transaction [{}] inserted with id {}", transaction.tx_id, transaction.id);
            (transaction, true)
        },
    };
    Ok(inserted)
}

async fn insert_transaction(
    transaction: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, PaymentEngineError> {
    let transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                tx_id,
                customer_id,
                amount,
                method,
                gateway,
                provider_ref,
                status,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
            RETURNING *;
        "#,
    )
    .bind(transaction.tx_id)
    .bind(transaction.customer_id)
    .bind(transaction.amount)
    .bind(transaction.method)
    .bind(transaction.gateway)
    .bind(transaction.provider_ref)
    .bind(transaction.expires_at)
    .fetch_one(conn)
    .await?;
    Ok(transaction)
}

pub async fn fetch_by_tx_id(tx_id: &TxId, conn: &mut SqliteConnection) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as("SELECT * FROM transactions WHERE tx_id = $1")
        .bind(tx_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(transaction)
}

/// Fetches transactions matching the filter, most recent first.
pub async fn search(filter: TransactionFilter, conn: &mut SqliteConnection) -> Result<Vec<Transaction>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM transactions");
    if !filter.is_empty() {
        builder.push(" WHERE ");
        let mut where_clause = builder.separated(" AND ");
        if let Some(customer_id) = filter.customer_id {
            where_clause.push("customer_id = ");
            where_clause.push_bind_unseparated(customer_id);
        }
        if let Some(gateway) = filter.gateway {
            where_clause.push("gateway = ");
            where_clause.push_bind_unseparated(gateway);
        }
        if let Some(status) = filter.status {
            where_clause.push("status = ");
            where_clause.push_bind_unseparated(status);
        }
        if let Some(after) = filter.after {
            where_clause.push("unixepoch(created_at) >= unixepoch(");
            where_clause.push_bind_unseparated(after);
            where_clause.push_unseparated(")");
        }
    }
    builder.push(" ORDER BY id DESC");
    builder.push(" LIMIT ");
    builder.push_bind(filter.limit.unwrap_or(50));
    trace!("🗃️ Executing query: {}", builder.sql());
    let transactions = builder
        .build()
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(|row: SqliteRow| Transaction::from_row(&row))
        .collect::<Result<Vec<Transaction>, sqlx::Error>>()?;
    Ok(transactions)
}

/// Applies the `pending → success` transition. The update only lands if the row is still
/// `pending`; `None` means some other writer got there first (or the transaction is unknown)
/// and nothing was changed.
///
/// The update is the first statement of the enclosing transaction, so concurrent settles queue
/// on the write lock instead of failing on a stale read snapshot. Unset paid details default in
/// SQL: the paid amount to the row's own `amount`, the paid time to now.
pub async fn settle(
    tx_id: &TxId,
    paid_amount: Option<Rupiah>,
    paid_at: Option<DateTime<Utc>>,
    provider_ref: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, PaymentEngineError> {
    let updated = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = 'success',
                paid_amount = COALESCE($1, amount),
                paid_at = COALESCE($2, CURRENT_TIMESTAMP),
                provider_ref = COALESCE($3, provider_ref),
                updated_at = CURRENT_TIMESTAMP
            WHERE tx_id = $4 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(paid_amount)
    .bind(paid_at)
    .bind(provider_ref)
    .bind(tx_id.as_str())
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Result of settle for [{tx_id}]: {updated:?}");
    Ok(updated)
}

/// Applies a `pending → failed | expired | cancelled` transition with the same conditional
/// guard as [`settle`]. No balance is touched.
pub async fn close(
    tx_id: &TxId,
    new_status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, PaymentEngineError> {
    let updated = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = $1,
                updated_at = CURRENT_TIMESTAMP
            WHERE tx_id = $2 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(new_status)
    .bind(tx_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// Records a provider reference discovered after the transaction was created. An existing
/// reference is never overwritten.
pub async fn set_provider_ref(
    tx_id: &TxId,
    provider_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentEngineError> {
    sqlx::query(
        "UPDATE transactions SET provider_ref = $1, updated_at = CURRENT_TIMESTAMP WHERE tx_id = $2 AND provider_ref \
         IS NULL",
    )
    .bind(provider_ref)
    .bind(tx_id.as_str())
    .execute(conn)
    .await?;
    Ok(())
}
