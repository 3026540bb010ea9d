//! SQLite implementation of the analytics store.
//!
//! Four relations whose column names and outcome strings are part of the
//! reporting interface: `routing_decisions` (append-only),
//! `routing_corrections` (foreign-keyed to decisions),
//! `misrouting_patterns` (upserted by pattern hash), and `daily_metrics`
//! (per-day rollups). The schema is created at connect time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::domain::analytics::{pattern_hash, MisroutingPattern, RoutingMetrics};
use crate::domain::foundation::Timestamp;
use crate::ports::analytics::{AnalyticsError, AnalyticsStore, MetricsFilter, NewRoutingRecord};

use super::memory::bin_confidences;

const MAX_STORED_QUERY_LEN: usize = 500;

/// Durable analytics store backed by SQLite.
#[derive(Clone)]
pub struct SqliteAnalyticsStore {
    pool: SqlitePool,
}

fn store_err(e: sqlx::Error) -> AnalyticsError {
    AnalyticsError::Unavailable(e.to_string())
}

impl SqliteAnalyticsStore {
    /// Opens (and creates if missing) the database at `url` and ensures the
    /// schema exists.
    pub async fn connect(url: &str) -> Result<Self, AnalyticsError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(store_err)?
            .create_if_missing(true);

        // SQLite is effectively single-writer; one connection also keeps
        // `sqlite::memory:` databases coherent.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// An in-memory database, for tests.
    pub async fn in_memory() -> Result<Self, AnalyticsError> {
        Self::connect("sqlite::memory:").await
    }

    async fn init_schema(&self) -> Result<(), AnalyticsError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS routing_decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                query TEXT NOT NULL,
                query_length INTEGER,
                detected_domain TEXT,
                routed_tool TEXT NOT NULL,
                confidence REAL,
                parser_used BOOLEAN,
                validator_used BOOLEAN,
                cross_domain BOOLEAN,
                outcome TEXT NOT NULL,
                execution_time_ms REAL,
                error_message TEXT,
                metadata TEXT,
                user_id INTEGER,
                session_id TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS routing_corrections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                routing_decision_id INTEGER,
                timestamp TEXT NOT NULL,
                original_tool TEXT NOT NULL,
                corrected_tool TEXT NOT NULL,
                correction_reason TEXT,
                validator_confidence REAL,
                FOREIGN KEY (routing_decision_id) REFERENCES routing_decisions(id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS misrouting_patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern_hash TEXT UNIQUE NOT NULL,
                query_pattern TEXT NOT NULL,
                wrong_tool TEXT NOT NULL,
                correct_tool TEXT NOT NULL,
                occurrences INTEGER DEFAULT 1,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                avg_confidence REAL,
                resolved BOOLEAN DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS daily_metrics (
                date TEXT PRIMARY KEY,
                total_routings INTEGER,
                successful_routings INTEGER,
                failed_routings INTEGER,
                corrected_routings INTEGER,
                avg_confidence REAL,
                avg_execution_time_ms REAL,
                parser_usage_rate REAL,
                validator_usage_rate REAL,
                cross_domain_rate REAL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_timestamp ON routing_decisions(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_outcome ON routing_decisions(outcome)",
            "CREATE INDEX IF NOT EXISTS idx_domain ON routing_decisions(detected_domain)",
            "CREATE INDEX IF NOT EXISTS idx_tool ON routing_decisions(routed_tool)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        }

        tracing::info!("analytics schema initialized");
        Ok(())
    }

    fn since(days: i64) -> DateTime<Utc> {
        Timestamp::now().minus_days(days).as_datetime()
    }
}

#[async_trait]
impl AnalyticsStore for SqliteAnalyticsStore {
    async fn record_routing(&self, record: NewRoutingRecord) -> Result<i64, AnalyticsError> {
        let stored_query: String = record.query.chars().take(MAX_STORED_QUERY_LEN).collect();
        let metadata = record
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m))
            .transpose()
            .map_err(|e| AnalyticsError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO routing_decisions (
                timestamp, query, query_length, detected_domain, routed_tool,
                confidence, parser_used, validator_used, cross_domain, outcome,
                execution_time_ms, error_message, metadata, user_id, session_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Timestamp::now().as_datetime())
        .bind(&stored_query)
        .bind(record.query.len() as i64)
        .bind(record.detected_domain.map(|d| d.as_str()))
        .bind(record.routed_tool.to_lowercase())
        .bind(record.confidence)
        .bind(record.parser_used)
        .bind(record.validator_used)
        .bind(record.cross_domain)
        .bind(record.outcome.as_str())
        .bind(record.execution_time_ms)
        .bind(&record.error_message)
        .bind(metadata)
        .bind(record.user_id)
        .bind(&record.session_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn record_correction(
        &self,
        decision_id: i64,
        original_tool: &str,
        corrected_tool: &str,
        reason: &str,
        validator_confidence: Option<f64>,
    ) -> Result<(), AnalyticsError> {
        sqlx::query(
            r#"
            INSERT INTO routing_corrections (
                routing_decision_id, timestamp, original_tool, corrected_tool,
                correction_reason, validator_confidence
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(decision_id)
        .bind(Timestamp::now().as_datetime())
        .bind(original_tool.to_lowercase())
        .bind(corrected_tool.to_lowercase())
        .bind(reason)
        .bind(validator_confidence)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        tracing::info!(
            from = %original_tool,
            to = %corrected_tool,
            "recorded routing correction"
        );
        Ok(())
    }

    async fn record_misrouting_pattern(
        &self,
        query_pattern: &str,
        wrong_tool: &str,
        correct_tool: &str,
        confidence: Option<f64>,
    ) -> Result<(), AnalyticsError> {
        let hash = pattern_hash(query_pattern, wrong_tool, correct_tool);
        let stored_pattern: String = query_pattern.chars().take(MAX_STORED_QUERY_LEN).collect();
        let now = Timestamp::now().as_datetime();

        sqlx::query(
            r#"
            INSERT INTO misrouting_patterns (
                pattern_hash, query_pattern, wrong_tool, correct_tool,
                occurrences, first_seen, last_seen, avg_confidence, resolved
            ) VALUES (?, ?, ?, ?, 1, ?, ?, ?, 0)
            ON CONFLICT(pattern_hash) DO UPDATE SET
                avg_confidence = CASE
                    WHEN excluded.avg_confidence IS NULL THEN avg_confidence
                    WHEN avg_confidence IS NULL THEN excluded.avg_confidence
                    ELSE (avg_confidence * occurrences + excluded.avg_confidence)
                         / (occurrences + 1)
                END,
                occurrences = occurrences + 1,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(&hash)
        .bind(&stored_pattern)
        .bind(wrong_tool)
        .bind(correct_tool)
        .bind(now)
        .bind(now)
        .bind(confidence)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        tracing::warn!(
            wrong = %wrong_tool,
            correct = %correct_tool,
            "recorded misrouting pattern"
        );
        Ok(())
    }

    async fn get_metrics(&self, filter: &MetricsFilter) -> Result<RoutingMetrics, AnalyticsError> {
        let mut builder = QueryBuilder::new(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN outcome = 'success' THEN 1 ELSE 0 END), 0) AS successful,
                COALESCE(SUM(CASE WHEN outcome = 'failure' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(CASE WHEN outcome = 'correction' THEN 1 ELSE 0 END), 0) AS corrected,
                AVG(confidence) AS avg_confidence,
                AVG(execution_time_ms) AS avg_execution_time_ms,
                COALESCE(SUM(parser_used), 0) AS parser_used_count,
                COALESCE(SUM(validator_used), 0) AS validator_used_count,
                COALESCE(SUM(cross_domain), 0) AS cross_domain_count
            FROM routing_decisions
            WHERE timestamp >= "#,
        );
        builder.push_bind(Self::since(filter.days));
        if let Some(domain) = filter.domain {
            builder.push(" AND detected_domain = ").push_bind(domain.as_str());
        }
        if let Some(tool) = &filter.tool {
            builder.push(" AND routed_tool = ").push_bind(tool.clone());
        }

        let row = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;

        let total: i64 = row.try_get("total").map_err(store_err)?;
        if total == 0 {
            return Ok(RoutingMetrics {
                period_days: filter.days,
                ..Default::default()
            });
        }

        let successful: i64 = row.try_get("successful").map_err(store_err)?;
        let failed: i64 = row.try_get("failed").map_err(store_err)?;
        let corrected: i64 = row.try_get("corrected").map_err(store_err)?;
        let avg_confidence: Option<f64> = row.try_get("avg_confidence").map_err(store_err)?;
        let avg_execution_time_ms: Option<f64> =
            row.try_get("avg_execution_time_ms").map_err(store_err)?;
        let parser_used_count: i64 = row.try_get("parser_used_count").map_err(store_err)?;
        let validator_used_count: i64 = row.try_get("validator_used_count").map_err(store_err)?;
        let cross_domain_count: i64 = row.try_get("cross_domain_count").map_err(store_err)?;

        let rate = |count: i64| count as f64 / total as f64;
        Ok(RoutingMetrics {
            period_days: filter.days,
            total_routings: total,
            successful_routings: successful,
            failed_routings: failed,
            corrected_routings: corrected,
            accuracy: successful as f64 / total as f64,
            avg_confidence: avg_confidence.unwrap_or(0.0),
            avg_execution_time_ms: avg_execution_time_ms.unwrap_or(0.0),
            parser_usage_rate: rate(parser_used_count),
            validator_usage_rate: rate(validator_used_count),
            cross_domain_rate: rate(cross_domain_count),
        })
    }

    async fn get_misrouting_patterns(
        &self,
        min_occurrences: i64,
        unresolved_only: bool,
    ) -> Result<Vec<MisroutingPattern>, AnalyticsError> {
        let mut builder = QueryBuilder::new(
            r#"
            SELECT query_pattern, wrong_tool, correct_tool, occurrences,
                   first_seen, last_seen, avg_confidence, resolved
            FROM misrouting_patterns
            WHERE occurrences >= "#,
        );
        builder.push_bind(min_occurrences);
        if unresolved_only {
            builder.push(" AND resolved = 0");
        }
        builder.push(" ORDER BY occurrences DESC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(MisroutingPattern {
                    query_pattern: row.try_get("query_pattern").map_err(store_err)?,
                    wrong_tool: row.try_get("wrong_tool").map_err(store_err)?,
                    correct_tool: row.try_get("correct_tool").map_err(store_err)?,
                    occurrences: row.try_get("occurrences").map_err(store_err)?,
                    first_seen: Timestamp::from_datetime(
                        row.try_get::<DateTime<Utc>, _>("first_seen").map_err(store_err)?,
                    ),
                    last_seen: Timestamp::from_datetime(
                        row.try_get::<DateTime<Utc>, _>("last_seen").map_err(store_err)?,
                    ),
                    avg_confidence: row.try_get("avg_confidence").map_err(store_err)?,
                    resolved: row.try_get("resolved").map_err(store_err)?,
                })
            })
            .collect()
    }

    async fn get_domain_accuracy(&self, days: i64) -> Result<BTreeMap<String, f64>, AnalyticsError> {
        let rows = sqlx::query(
            r#"
            SELECT detected_domain,
                   COUNT(*) AS total,
                   SUM(CASE WHEN outcome = 'success' THEN 1 ELSE 0 END) AS successful
            FROM routing_decisions
            WHERE timestamp >= ? AND detected_domain IS NOT NULL
            GROUP BY detected_domain
            "#,
        )
        .bind(Self::since(days))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut accuracy = BTreeMap::new();
        for row in rows {
            let domain: String = row.try_get("detected_domain").map_err(store_err)?;
            let total: i64 = row.try_get("total").map_err(store_err)?;
            let successful: i64 = row.try_get("successful").map_err(store_err)?;
            if total > 0 {
                accuracy.insert(domain, successful as f64 / total as f64);
            }
        }
        Ok(accuracy)
    }

    async fn get_tool_usage(&self, days: i64) -> Result<Vec<(String, i64)>, AnalyticsError> {
        let rows = sqlx::query(
            r#"
            SELECT routed_tool, COUNT(*) AS count
            FROM routing_decisions
            WHERE timestamp >= ?
            GROUP BY routed_tool
            ORDER BY count DESC
            "#,
        )
        .bind(Self::since(days))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("routed_tool").map_err(store_err)?,
                    row.try_get::<i64, _>("count").map_err(store_err)?,
                ))
            })
            .collect()
    }

    async fn get_confidence_distribution(
        &self,
        days: i64,
        bins: usize,
    ) -> Result<BTreeMap<String, i64>, AnalyticsError> {
        let rows = sqlx::query(
            "SELECT confidence FROM routing_decisions \
             WHERE timestamp >= ? AND confidence IS NOT NULL",
        )
        .bind(Self::since(days))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let confidences: Vec<f64> = rows
            .into_iter()
            .map(|row| row.try_get::<f64, _>("confidence").map_err(store_err))
            .collect::<Result<_, _>>()?;

        Ok(bin_confidences(&confidences, bins))
    }

    async fn aggregate_daily(&self, date: chrono::NaiveDate) -> Result<(), AnalyticsError> {
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| AnalyticsError::Serialization("invalid date".to_string()))?;
        let day_end = day_start + chrono::Duration::days(1);

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO daily_metrics (
                date, total_routings, successful_routings, failed_routings,
                corrected_routings, avg_confidence, avg_execution_time_ms,
                parser_usage_rate, validator_usage_rate, cross_domain_rate
            )
            SELECT
                ?,
                COUNT(*),
                COALESCE(SUM(CASE WHEN outcome = 'success' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN outcome = 'failure' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN outcome = 'correction' THEN 1 ELSE 0 END), 0),
                COALESCE(AVG(confidence), 0),
                COALESCE(AVG(execution_time_ms), 0),
                COALESCE(AVG(parser_used), 0),
                COALESCE(AVG(validator_used), 0),
                COALESCE(AVG(cross_domain), 0)
            FROM routing_decisions
            WHERE timestamp >= ? AND timestamp < ?
            "#,
        )
        .bind(date.to_string())
        .bind(day_start)
        .bind(day_end)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analytics::RoutingOutcome;
    use crate::domain::catalog::Domain;

    async fn store() -> SqliteAnalyticsStore {
        SqliteAnalyticsStore::in_memory().await.unwrap()
    }

    fn record(outcome: RoutingOutcome) -> NewRoutingRecord {
        NewRoutingRecord::new("what tasks do I have", "tasks", outcome)
            .with_domain(Domain::Task)
            .with_confidence(0.8)
            .with_execution_time_ms(20.0)
    }

    #[tokio::test]
    async fn records_and_aggregates_decisions() {
        let store = store().await;
        for _ in 0..3 {
            store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        }
        store.record_routing(record(RoutingOutcome::Failure)).await.unwrap();

        let metrics = store.get_metrics(&MetricsFilter::last_days(7)).await.unwrap();
        assert_eq!(metrics.total_routings, 4);
        assert_eq!(metrics.successful_routings, 3);
        assert_eq!(metrics.failed_routings, 1);
        assert!((metrics.accuracy - 0.75).abs() < 1e-9);
        assert!((metrics.avg_confidence - 0.8).abs() < 1e-9);
        assert!((metrics.avg_execution_time_ms - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn decision_ids_are_assigned_and_corrections_link() {
        let store = store().await;
        let id = store
            .record_routing(record(RoutingOutcome::Correction))
            .await
            .unwrap();
        assert!(id > 0);

        store
            .record_correction(id, "calendar", "tasks", "task query misrouted", Some(0.8))
            .await
            .unwrap();

        let row = sqlx::query("SELECT routing_decision_id, original_tool FROM routing_corrections")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(row.try_get::<i64, _>("routing_decision_id").unwrap(), id);
        assert_eq!(row.try_get::<String, _>("original_tool").unwrap(), "calendar");
    }

    #[tokio::test]
    async fn misrouting_pattern_upserts_into_a_single_row() {
        let store = store().await;
        for _ in 0..4 {
            store
                .record_misrouting_pattern("what tasks...", "calendar", "tasks", Some(0.5))
                .await
                .unwrap();
        }

        let patterns = store.get_misrouting_patterns(1, true).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].occurrences, 4);
        assert!(!patterns[0].first_seen.is_after(&patterns[0].last_seen));
        assert!((patterns[0].avg_confidence.unwrap() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn pattern_occurrence_floor_filters_rows() {
        let store = store().await;
        store
            .record_misrouting_pattern("once", "a", "b", None)
            .await
            .unwrap();
        assert!(store.get_misrouting_patterns(2, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn metrics_filters_apply_to_domain_and_tool() {
        let store = store().await;
        store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        store
            .record_routing(
                NewRoutingRecord::new("check my inbox", "email", RoutingOutcome::Success)
                    .with_domain(Domain::Email),
            )
            .await
            .unwrap();

        let filter = MetricsFilter {
            days: 7,
            domain: Some(Domain::Email),
            tool: None,
        };
        let metrics = store.get_metrics(&filter).await.unwrap();
        assert_eq!(metrics.total_routings, 1);

        let filter = MetricsFilter {
            days: 7,
            domain: None,
            tool: Some("tasks".to_string()),
        };
        let metrics = store.get_metrics(&filter).await.unwrap();
        assert_eq!(metrics.total_routings, 1);
    }

    #[tokio::test]
    async fn domain_accuracy_and_tool_usage_group_rows() {
        let store = store().await;
        store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        store.record_routing(record(RoutingOutcome::Failure)).await.unwrap();

        let accuracy = store.get_domain_accuracy(7).await.unwrap();
        assert!((accuracy["task"] - 0.5).abs() < 1e-9);

        let usage = store.get_tool_usage(7).await.unwrap();
        assert_eq!(usage[0], ("tasks".to_string(), 2));
    }

    #[tokio::test]
    async fn daily_rollup_upserts_one_row_per_date() {
        let store = store().await;
        store.record_routing(record(RoutingOutcome::Success)).await.unwrap();

        let today = Timestamp::now().as_datetime().date_naive();
        store.aggregate_daily(today).await.unwrap();
        store.aggregate_daily(today).await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n, MAX(total_routings) AS total FROM daily_metrics")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(row.try_get::<i64, _>("n").unwrap(), 1);
        assert_eq!(row.try_get::<i64, _>("total").unwrap(), 1);
    }

    #[tokio::test]
    async fn report_renders_over_sqlite_aggregates() {
        let store = store().await;
        store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        let report = store.generate_report(7).await.unwrap();
        assert!(report.contains("ROUTING ANALYTICS REPORT"));
        assert!(report.contains("tasks: 1"));
    }

    #[tokio::test]
    async fn export_writes_a_json_bundle() {
        let store = store().await;
        store.record_routing(record(RoutingOutcome::Success)).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        store.export_metrics(&path, 7).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["period_days"], 7);
        assert_eq!(parsed["overall_metrics"]["total_routings"], 1);
    }
}
