//! # Performance Metric Model
//!
//! Immutable raw samples in the `performance_metrics` table. A NULL
//! `agent_id` marks a system-wide metric. Rows exist for audit and
//! recomputation; the control loop reads windowed statistics from the
//! in-process aggregator, never from here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A persisted metric row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PerformanceMetric {
    pub id: i64,
    pub agent_id: Option<String>,
    pub metric_name: String,
    pub metric_value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
    pub tags: serde_json::Value,
}

/// A metric sample as reported over the ingress interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    /// `None` for system-wide metrics.
    pub agent_id: Option<String>,
    pub metric_name: String,
    pub metric_value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: serde_json::Value,
}

impl MetricSample {
    pub fn new(
        agent_id: Option<String>,
        metric_name: impl Into<String>,
        metric_value: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id,
            metric_name: metric_name.into(),
            metric_value,
            unit: String::new(),
            recorded_at,
            tags: serde_json::Value::Null,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_tags(mut self, tags: serde_json::Value) -> Self {
        self.tags = tags;
        self
    }
}

impl PerformanceMetric {
    pub async fn append(pool: &PgPool, sample: &MetricSample) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO performance_metrics
                (agent_id, metric_name, metric_value, unit, recorded_at, tags)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&sample.agent_id)
        .bind(&sample.metric_name)
        .bind(sample.metric_value)
        .bind(&sample.unit)
        .bind(sample.recorded_at)
        .bind(&sample.tags)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Raw samples for a key since a cutoff, oldest first. Audit path for
    /// recomputing windowed statistics.
    pub async fn samples_since(
        pool: &PgPool,
        agent_id: Option<&str>,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PerformanceMetric>, sqlx::Error> {
        sqlx::query_as::<_, PerformanceMetric>(
            r#"
            SELECT id, agent_id, metric_name, metric_value, unit, recorded_at, tags
            FROM performance_metrics
            WHERE agent_id IS NOT DISTINCT FROM $1
              AND metric_name = $2
              AND recorded_at >= $3
            ORDER BY recorded_at
            "#,
        )
        .bind(agent_id)
        .bind(metric_name)
        .bind(since)
        .fetch_all(pool)
        .await
    }

    pub async fn purge_older_than(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM performance_metrics WHERE recorded_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
