use log::debug;
use lokapay_common::Rupiah;
use sqlx::SqliteConnection;

use crate::{db_types::CustomerBalance, traits::PaymentEngineError};

/// Credits the customer's balance, creating the account row on first credit. The increment is a
/// single upsert, so concurrent credits for one customer serialize at the storage layer.
pub async fn credit_balance(
    customer_id: &str,
    amount: Rupiah,
    conn: &mut SqliteConnection,
) -> Result<CustomerBalance, PaymentEngineError> {
    if !amount.is_positive() {
        return Err(PaymentEngineError::BadAmount(format!("Refusing to credit a non-positive amount ({amount})")));
    }
    let account = sqlx::query_as(
        r#"
            INSERT INTO accounts (customer_id, balance) VALUES ($1, $2)
            ON CONFLICT (customer_id) DO UPDATE
                SET balance = balance + excluded.balance, updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(customer_id)
    .bind(amount)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Credited {amount} to customer {customer_id}");
    Ok(account)
}

pub async fn fetch_balance(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<CustomerBalance>, sqlx::Error> {
    let account = sqlx::query_as("SELECT * FROM accounts WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}
