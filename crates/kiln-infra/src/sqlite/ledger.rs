//! SQLite Step Ledger.
//!
//! One row per `(run_id, step_name)`. Writes are insert-only: a conflicting
//! insert is ignored and reported, so the first writer wins.

use kiln_core::repository::ledger::StepLedger;
use kiln_types::error::{FailureKind, RepositoryError};
use kiln_types::workflow::{RunId, StepName, StepOutcome, StepRecord};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `StepLedger`.
#[derive(Clone)]
pub struct SqliteStepLedger {
    pool: DatabasePool,
}

impl SqliteStepLedger {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct StepRecordRow {
    run_id: String,
    step_name: String,
    outcome: String,
    output: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
    completed_at: String,
}

impl StepRecordRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            run_id: row.try_get("run_id")?,
            step_name: row.try_get("step_name")?,
            outcome: row.try_get("outcome")?,
            output: row.try_get("output")?,
            error_kind: row.try_get("error_kind")?,
            error_message: row.try_get("error_message")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_record(self) -> Result<StepRecord, RepositoryError> {
        let step_name = self
            .step_name
            .parse::<StepName>()
            .map_err(RepositoryError::Query)?;

        let outcome = match self.outcome.as_str() {
            "completed" => {
                let raw = self.output.ok_or_else(|| {
                    RepositoryError::Query("completed step missing output".into())
                })?;
                let output = serde_json::from_str(&raw)
                    .map_err(|e| RepositoryError::Query(format!("invalid step output JSON: {e}")))?;
                StepOutcome::Completed { output }
            }
            "failed" => {
                let kind = self
                    .error_kind
                    .as_deref()
                    .ok_or_else(|| RepositoryError::Query("failed step missing error_kind".into()))?
                    .parse::<FailureKind>()
                    .map_err(RepositoryError::Query)?;
                StepOutcome::Failed {
                    kind,
                    message: self.error_message.unwrap_or_default(),
                }
            }
            other => {
                return Err(RepositoryError::Query(format!("unknown outcome: {other}")));
            }
        };

        Ok(StepRecord {
            run_id: RunId::new(self.run_id),
            step_name,
            outcome,
            completed_at: parse_datetime(&self.completed_at)?,
        })
    }
}

impl StepLedger for SqliteStepLedger {
    async fn get(
        &self,
        run_id: &RunId,
        step: StepName,
    ) -> Result<Option<StepRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM step_records WHERE run_id = ? AND step_name = ?")
            .bind(run_id.as_str())
            .bind(step.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = StepRecordRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, record: &StepRecord) -> Result<bool, RepositoryError> {
        let (output, error_kind, error_message) = match &record.outcome {
            StepOutcome::Completed { output } => {
                let json = serde_json::to_string(output)
                    .map_err(|e| RepositoryError::Query(format!("serialize output: {e}")))?;
                (Some(json), None, None)
            }
            StepOutcome::Failed { kind, message } => {
                (None, Some(kind.to_string()), Some(message.clone()))
            }
        };

        let result = sqlx::query(
            r#"INSERT INTO step_records
               (run_id, step_name, outcome, output, error_kind, error_message, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (run_id, step_name) DO NOTHING"#,
        )
        .bind(record.run_id.as_str())
        .bind(record.step_name.as_str())
        .bind(record.outcome.label())
        .bind(&output)
        .bind(&error_kind)
        .bind(&error_message)
        .bind(format_datetime(&record.completed_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, run_id: &RunId) -> Result<Vec<StepRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM step_records WHERE run_id = ? ORDER BY completed_at ASC, rowid ASC",
        )
        .bind(run_id.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepRecordRow::from_row(row).map_err(query_error)?;
            records.push(r.into_record()?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;
    use kiln_types::workflow::StepError;

    #[tokio::test]
    async fn test_put_then_get_completed() {
        let ledger = SqliteStepLedger::new(test_pool().await);
        let run_id = RunId::new("run-1");
        let record = StepRecord::completed(
            run_id.clone(),
            StepName::ProvisionSandbox,
            serde_json::json!("sbx-1"),
        );

        assert!(ledger.put(&record).await.unwrap());
        let loaded = ledger
            .get(&run_id, StepName::ProvisionSandbox)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.outcome, record.outcome);
        assert!(ledger.get(&run_id, StepName::InvokeAgent).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_is_write_once() {
        let ledger = SqliteStepLedger::new(test_pool().await);
        let run_id = RunId::new("run-1");
        let first = StepRecord::completed(run_id.clone(), StepName::InvokeAgent, serde_json::json!(1));
        let second = StepRecord::completed(run_id.clone(), StepName::InvokeAgent, serde_json::json!(2));

        assert!(ledger.put(&first).await.unwrap());
        assert!(!ledger.put(&second).await.unwrap());

        let loaded = ledger.get(&run_id, StepName::InvokeAgent).await.unwrap().unwrap();
        assert_eq!(
            loaded.outcome,
            StepOutcome::Completed {
                output: serde_json::json!(1)
            }
        );
    }

    #[tokio::test]
    async fn test_failed_record_and_list_order() {
        let ledger = SqliteStepLedger::new(test_pool().await);
        let run_id = RunId::new("run-2");
        ledger
            .put(&StepRecord::completed(
                run_id.clone(),
                StepName::ProvisionSandbox,
                serde_json::json!("sbx"),
            ))
            .await
            .unwrap();
        let err = StepError::new(FailureKind::MalformedAgentOutput, "bad path");
        ledger
            .put(&StepRecord::failed(run_id.clone(), StepName::InvokeAgent, &err))
            .await
            .unwrap();

        let records = ledger.list(&run_id).await.unwrap();
        let steps: Vec<StepName> = records.iter().map(|r| r.step_name).collect();
        assert_eq!(steps, vec![StepName::ProvisionSandbox, StepName::InvokeAgent]);
        assert_eq!(
            records[1].outcome,
            StepOutcome::Failed {
                kind: FailureKind::MalformedAgentOutput,
                message: "bad path".into()
            }
        );
        assert!(ledger.list(&RunId::new("other")).await.unwrap().is_empty());
    }
}
