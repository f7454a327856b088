//! Rejection audit log.
//!
//! Domain-gate rejections are persisted with full context so off-domain
//! traffic can be reviewed later. Audit writes are best-effort: a failed
//! insert is logged and never fails the request.

use sqlx::PgPool;

use crate::localization::Language;

pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record_gate_rejection(
        &self,
        question: &str,
        language: Language,
        reason_code: &str,
        confidence: f64,
        rejected_keywords: &[String],
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO gate_rejections
                (question, language, reason_code, confidence, rejected_keywords, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(question)
        .bind(language.as_str())
        .bind(reason_code)
        .bind(confidence)
        .bind(rejected_keywords.join(","))
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to persist gate rejection: {}", e);
        }
    }
}
