//! Postgres storage backend.
//!
//! Hybrid layout: hot columns for the indexed access paths (id, platform,
//! occurred_at, status) plus the full record as JSONB payload.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::backend::BaseEventStorage;
use crate::domains::monitoring::models::{AlertStatus, CrisisAlert, MonitoringEvent};

pub struct PostgresEventStorage {
    pool: PgPool,
}

impl PostgresEventStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PayloadRow {
    payload: serde_json::Value,
}

fn decode_event(row: PayloadRow) -> Result<MonitoringEvent> {
    serde_json::from_value(row.payload).context("malformed event payload")
}

fn decode_alert(row: PayloadRow) -> Result<CrisisAlert> {
    serde_json::from_value(row.payload).context("malformed alert payload")
}

#[async_trait]
impl BaseEventStorage for PostgresEventStorage {
    async fn insert_events(&self, events: &[MonitoringEvent]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for event in events {
            let payload = serde_json::to_value(event).context("serialize event")?;
            let result = sqlx::query(
                r#"
                INSERT INTO monitoring_events (id, platform, occurred_at, payload)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&event.id)
            .bind(&event.platform)
            .bind(event.occurred_at)
            .bind(payload)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn contains_event(&self, id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM monitoring_events WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn events_by_platform_since(
        &self,
        platform: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MonitoringEvent>> {
        let rows = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload
            FROM monitoring_events
            WHERE platform = $1 AND occurred_at >= $2
            ORDER BY occurred_at DESC
            "#,
        )
        .bind(platform)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_event).collect()
    }

    async fn events_since(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<MonitoringEvent>> {
        let rows = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload
            FROM monitoring_events
            WHERE ($1::timestamptz IS NULL OR occurred_at >= $1)
            ORDER BY occurred_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_event).collect()
    }

    async fn count_events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM monitoring_events WHERE occurred_at >= $1 AND occurred_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM monitoring_events WHERE occurred_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_alert(&self, alert: &CrisisAlert) -> Result<()> {
        let payload = serde_json::to_value(alert).context("serialize alert")?;
        sqlx::query(
            r#"
            INSERT INTO crisis_alerts (id, status, severity, created_at, updated_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(alert.id)
        .bind(alert.status.to_string())
        .bind(alert.severity.to_string())
        .bind(alert.created_at)
        .bind(alert.updated_at)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn alert_by_id(&self, id: Uuid) -> Result<Option<CrisisAlert>> {
        let row = sqlx::query_as::<_, PayloadRow>(
            "SELECT payload FROM crisis_alerts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_alert).transpose()
    }

    async fn alerts_by_status(&self, status: AlertStatus) -> Result<Vec<CrisisAlert>> {
        let rows = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload
            FROM crisis_alerts
            WHERE status = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_alert).collect()
    }

    async fn update_alert(&self, alert: &CrisisAlert) -> Result<()> {
        let payload = serde_json::to_value(alert).context("serialize alert")?;
        let result = sqlx::query(
            r#"
            UPDATE crisis_alerts
            SET status = $2, severity = $3, updated_at = $4, payload = $5
            WHERE id = $1
            "#,
        )
        .bind(alert.id)
        .bind(alert.status.to_string())
        .bind(alert.severity.to_string())
        .bind(alert.updated_at)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("alert {} does not exist", alert.id);
        }
        Ok(())
    }
}
