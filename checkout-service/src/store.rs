use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, PgPool};
use tokio::sync::RwLock;

use crate::gateway::TransactionStatus;
use crate::status::PaymentStatus;

/// Latest verified payment state for one gateway transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatusRecord {
    pub order_id: String,
    pub payment_status: PaymentStatus,
    pub transaction_status: String,
    pub fraud_status: Option<String>,
    pub payment_type: Option<String>,
    pub gross_amount: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentStatusRecord {
    pub fn from_verified(verified: &TransactionStatus, payment_status: PaymentStatus) -> Self {
        Self {
            order_id: verified.order_id.clone(),
            payment_status,
            transaction_status: verified.transaction_status.clone(),
            fraud_status: verified.fraud_status.clone(),
            payment_type: verified.payment_type.clone(),
            gross_amount: verified.gross_amount.clone(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The stored status is terminal and the incoming one is `pending`; nothing was written.
    KeptTerminal,
}

#[async_trait::async_trait]
pub trait PaymentStatusStore: Send + Sync {
    async fn upsert(&self, record: PaymentStatusRecord) -> Result<UpsertOutcome>;
    async fn get(&self, order_id: &str) -> Result<Option<PaymentStatusRecord>>;
}

#[derive(Default)]
pub struct InMemoryPaymentStatusStore {
    records: RwLock<HashMap<String, PaymentStatusRecord>>,
}

impl InMemoryPaymentStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PaymentStatusStore for InMemoryPaymentStatusStore {
    async fn upsert(&self, record: PaymentStatusRecord) -> Result<UpsertOutcome> {
        let mut guard = self.records.write().await;
        match guard.get(&record.order_id) {
            Some(existing) if !record.payment_status.may_replace(existing.payment_status) => {
                Ok(UpsertOutcome::KeptTerminal)
            }
            Some(_) => {
                guard.insert(record.order_id.clone(), record);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                guard.insert(record.order_id.clone(), record);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, order_id: &str) -> Result<Option<PaymentStatusRecord>> {
        Ok(self.records.read().await.get(order_id).cloned())
    }
}

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS payment_statuses (
    order_id TEXT PRIMARY KEY,
    payment_status TEXT NOT NULL,
    transaction_status TEXT NOT NULL,
    fraud_status TEXT NULL,
    payment_type TEXT NULL,
    gross_amount TEXT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

#[derive(Debug, sqlx::FromRow)]
struct PaymentStatusRow {
    order_id: String,
    payment_status: String,
    transaction_status: String,
    fraud_status: Option<String>,
    payment_type: Option<String>,
    gross_amount: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentStatusRow> for PaymentStatusRecord {
    type Error = anyhow::Error;

    fn try_from(row: PaymentStatusRow) -> Result<Self> {
        let payment_status = PaymentStatus::parse(&row.payment_status)
            .ok_or_else(|| anyhow!("unknown payment_status '{}' for {}", row.payment_status, row.order_id))?;
        Ok(Self {
            order_id: row.order_id,
            payment_status,
            transaction_status: row.transaction_status,
            fraud_status: row.fraud_status,
            payment_type: row.payment_type,
            gross_amount: row.gross_amount,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed store. The upsert is a single statement, so concurrent
/// deliveries of the same notification cannot interleave.
pub struct PgPaymentStatusStore {
    pool: PgPool,
}

impl PgPaymentStatusStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        pool.execute(CREATE_TABLE).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl PaymentStatusStore for PgPaymentStatusStore {
    async fn upsert(&self, record: PaymentStatusRecord) -> Result<UpsertOutcome> {
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"INSERT INTO payment_statuses
                   (order_id, payment_status, transaction_status, fraud_status, payment_type, gross_amount, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (order_id) DO UPDATE SET
                   payment_status = EXCLUDED.payment_status,
                   transaction_status = EXCLUDED.transaction_status,
                   fraud_status = EXCLUDED.fraud_status,
                   payment_type = COALESCE(EXCLUDED.payment_type, payment_statuses.payment_type),
                   gross_amount = COALESCE(EXCLUDED.gross_amount, payment_statuses.gross_amount),
                   updated_at = EXCLUDED.updated_at
               WHERE NOT (payment_statuses.payment_status IN ('paid', 'failed')
                          AND EXCLUDED.payment_status = 'pending')
               RETURNING (xmax = 0) AS inserted"#,
        )
        .bind(&record.order_id)
        .bind(record.payment_status.as_str())
        .bind(&record.transaction_status)
        .bind(record.fraud_status.as_deref())
        .bind(record.payment_type.as_deref())
        .bind(record.gross_amount.as_deref())
        .bind(record.updated_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match inserted {
            Some(true) => UpsertOutcome::Inserted,
            Some(false) => UpsertOutcome::Updated,
            None => UpsertOutcome::KeptTerminal,
        })
    }

    async fn get(&self, order_id: &str) -> Result<Option<PaymentStatusRecord>> {
        let row = sqlx::query_as::<_, PaymentStatusRow>(
            r#"SELECT order_id, payment_status, transaction_status, fraud_status, payment_type, gross_amount, updated_at
               FROM payment_statuses WHERE order_id = $1"#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentStatusRecord::try_from).transpose()
    }
}
