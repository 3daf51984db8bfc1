//! # Performance Summary
//!
//! Row shape of the `performance_summary` view, parameterized by a trailing
//! display window. Display-only; the control loop computes its own windowed
//! statistics in process.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Aggregates for one `(agent scope, metric)` pair over the display window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PerformanceSummaryRow {
    /// NULL for system-wide metrics.
    pub agent_id: Option<String>,
    pub metric_name: String,
    pub sample_count: i64,
    pub mean_value: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub stddev_value: Option<f64>,
}

impl PerformanceSummaryRow {
    /// Summaries over the trailing `window_hours`. The view itself covers the
    /// default display window; this query recomputes from raw rows so any
    /// window can be requested.
    pub async fn fetch_window(
        pool: &PgPool,
        window_hours: i64,
    ) -> Result<Vec<PerformanceSummaryRow>, sqlx::Error> {
        sqlx::query_as::<_, PerformanceSummaryRow>(
            r#"
            SELECT agent_id, metric_name,
                   COUNT(*) AS sample_count,
                   AVG(metric_value) AS mean_value,
                   MIN(metric_value) AS min_value,
                   MAX(metric_value) AS max_value,
                   COALESCE(STDDEV_SAMP(metric_value), 0) AS stddev_value
            FROM performance_metrics
            WHERE recorded_at >= NOW() - make_interval(hours => $1::int)
            GROUP BY agent_id, metric_name
            ORDER BY agent_id NULLS FIRST, metric_name
            "#,
        )
        .bind(window_hours)
        .fetch_all(pool)
        .await
    }
}
