//! Performance store client.
//!
//! Deterministic, parameterized lookups over the `documents`, `strains` and
//! `metrics` tables. Missing filter fields widen the query; metric names
//! are matched with `LIKE '<metric> for %'` patterns.

use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::models::{BasePerformance, MetricKind, PerfCatalog, PerfQuery, PerfResult, PerfRow};
use crate::utils::CoreError;

const ALL_METRICS: &[MetricKind] = &[
    MetricKind::Weight,
    MetricKind::DailyGain,
    MetricKind::Fcr,
    MetricKind::Mortality,
    MetricKind::FeedIntake,
    MetricKind::WaterIntake,
];

#[derive(Debug, FromRow)]
struct MetricDbRow {
    strain_name: String,
    sex: String,
    age_min: i32,
    metric_name: String,
    value_numeric: f64,
}

#[derive(Debug, FromRow)]
struct BasePerformanceDbRow {
    weight: Option<f64>,
    fcr: Option<f64>,
    intake: Option<f64>,
}

pub struct PerfStore {
    pool: PgPool,
}

impl PerfStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run a typed performance lookup.
    ///
    /// Fails with [`CoreError::PerfStoreEmpty`] when no row matches and with
    /// [`CoreError::PerfStoreBackend`] on transport errors.
    pub async fn query(&self, query: &PerfQuery) -> Result<PerfResult, CoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT s.strain_name, d.sex, m.age_min, m.metric_name, m.value_numeric \
             FROM metrics m \
             JOIN documents d ON m.document_id = d.id \
             JOIN strains s ON d.strain_id = s.id \
             WHERE 1=1",
        );

        if let Some(species) = &query.species {
            builder.push(" AND s.species = ").push_bind(species.clone());
        }

        if let Some(line) = &query.line {
            // `_` in normalized line ids doubles as the single-character
            // LIKE wildcard, so `ross_308` matches `Ross 308`.
            builder.push(" AND s.strain_name ILIKE ").push_bind(format!("%{line}%"));
        }

        if let Some(sex) = query.sex {
            builder.push(" AND d.sex = ").push_bind(sex.as_str());
        }

        if let Some(age) = query.age_days {
            builder.push(" AND m.age_min = ").push_bind(age as i32);
        } else if let Some(range) = query.age_range {
            builder
                .push(" AND m.age_min BETWEEN ")
                .push_bind(range.min_days as i32)
                .push(" AND ")
                .push_bind(range.max_days as i32);
        }

        let metrics = if query.metrics.is_empty() { ALL_METRICS } else { &query.metrics[..] };
        builder.push(" AND (");
        for (i, metric) in metrics.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder
                .push("m.metric_name LIKE ")
                .push_bind(format!("{} for %", metric.sql_pattern_prefix()));
        }
        builder.push(")");

        builder.push(" ORDER BY s.strain_name, d.sex, m.age_min, m.metric_name");

        let db_rows: Vec<MetricDbRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        if db_rows.is_empty() {
            return Err(CoreError::PerfStoreEmpty);
        }

        let rows: Vec<PerfRow> = db_rows
            .into_iter()
            .filter_map(|row| {
                let metric = metric_from_name(&row.metric_name)?;
                Some(PerfRow {
                    line: row.strain_name,
                    sex: row.sex,
                    age_days: row.age_min.max(0) as u32,
                    metric,
                    value: row.value_numeric,
                    unit: metric.unit().to_string(),
                })
            })
            .collect();

        if rows.is_empty() {
            return Err(CoreError::PerfStoreEmpty);
        }

        let confidence = PerfResult::confidence_for_rows(rows.len());
        Ok(PerfResult { rows, confidence })
    }

    /// Per-bird reference values for one strain/sex/age, used by the
    /// multi-step orchestrator.
    pub async fn base_performance(
        &self,
        breed: &str,
        sex: &str,
        age_days: u32,
    ) -> Result<BasePerformance, CoreError> {
        let row: Option<BasePerformanceDbRow> = sqlx::query_as(
            r#"
            SELECT
                m.value_numeric AS weight,
                m2.value_numeric AS fcr,
                m3.value_numeric AS intake
            FROM metrics m
            JOIN documents d ON m.document_id = d.id
            JOIN strains s ON d.strain_id = s.id
            LEFT JOIN metrics m2 ON m2.document_id = m.document_id
                AND m2.age_min = m.age_min
                AND m2.metric_name LIKE 'feed_conversion_ratio for %'
            LEFT JOIN metrics m3 ON m3.document_id = m.document_id
                AND m3.age_min = m.age_min
                AND m3.metric_name LIKE 'feed_intake for %'
            WHERE s.strain_name ILIKE $1
              AND d.sex = $2
              AND m.metric_name LIKE 'body_weight for %'
              AND m.age_min = $3
            "#,
        )
        .bind(format!("%{breed}%"))
        .bind(sex)
        .bind(age_days as i32)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) if row.weight.is_some() => Ok(BasePerformance {
                weight_g: row.weight.unwrap_or(0.0),
                fcr: row.fcr.unwrap_or(0.0),
                intake_g: row.intake.unwrap_or(0.0),
            }),
            _ => Err(CoreError::PerfStoreEmpty),
        }
    }

    /// Species and lines the store can answer about, surfaced by the
    /// clarification route.
    pub async fn available_catalog(&self) -> Result<PerfCatalog, CoreError> {
        let species: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT species FROM strains ORDER BY species")
                .fetch_all(&self.pool)
                .await?;
        let lines: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT strain_name FROM strains ORDER BY strain_name")
                .fetch_all(&self.pool)
                .await?;

        Ok(PerfCatalog {
            species: species.into_iter().map(|(s,)| s).collect(),
            lines: lines.into_iter().map(|(l,)| l).collect(),
        })
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Map a stored `metric_name` back to its metric family.
fn metric_from_name(metric_name: &str) -> Option<MetricKind> {
    ALL_METRICS
        .iter()
        .copied()
        .find(|m| metric_name.starts_with(m.sql_pattern_prefix()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_name_round_trip() {
        assert_eq!(metric_from_name("body_weight for Ross 308"), Some(MetricKind::Weight));
        assert_eq!(
            metric_from_name("feed_conversion_ratio for Cobb 500"),
            Some(MetricKind::Fcr)
        );
        assert_eq!(metric_from_name("unknown_metric for X"), None);
    }
}
