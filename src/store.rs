use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::collaborators::OutcomeStore;
use crate::error::EngineResult;
use crate::model::{Direction, FeatureVector, Outcome, Prediction, TrainingBatch};

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub path: PathBuf,
    /// Most recent rows returned per training batch.
    pub lookback: usize,
    /// Fewer stored outcomes than this yields an empty batch.
    pub min_samples: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/outcomes.sqlite"),
            lookback: 500,
            min_samples: 20,
        }
    }
}

/// One persisted prediction/outcome pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredOutcome {
    pub id: String,
    pub model_id: String,
    pub instrument: String,
    pub predicted: Direction,
    pub realized: Direction,
    pub pnl: f64,
    pub features: FeatureVector,
    pub predicted_at_ms: u64,
    pub resolved_at_ms: u64,
}

/// Outcome store on a single SQLite file.
pub struct SqliteOutcomeStore {
    settings: StoreSettings,
    conn: Mutex<Connection>,
}

impl SqliteOutcomeStore {
    pub fn open(settings: StoreSettings) -> Result<Self> {
        if let Some(parent) = settings.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(&settings.path)
            .with_context(|| format!("failed to open {}", settings.path.display()))?;
        Self::with_connection(settings, conn)
    }

    pub fn in_memory(settings: StoreSettings) -> Result<Self> {
        Self::with_connection(settings, Connection::open_in_memory()?)
    }

    fn with_connection(settings: StoreSettings, conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS prediction_outcomes (
                id TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                instrument TEXT NOT NULL,
                predicted_direction INTEGER NOT NULL,
                strength REAL NOT NULL,
                confidence REAL NOT NULL,
                features_json TEXT NOT NULL,
                realized_direction INTEGER NOT NULL,
                pnl REAL NOT NULL,
                predicted_at_ms INTEGER NOT NULL,
                resolved_at_ms INTEGER NOT NULL,
                recorded_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_prediction_outcomes_model
                ON prediction_outcomes (model_id, resolved_at_ms);
            "#,
        )
        .context("failed to create outcome schema")?;
        Ok(Self {
            settings,
            conn: Mutex::new(conn),
        })
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, prediction: &Prediction, outcome: &Outcome) -> EngineResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let features = prediction.metadata.features.clone().unwrap_or_default();
        let features_json = serde_json::to_string(&features)?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.conn().execute(
            r#"
            INSERT INTO prediction_outcomes (
                id, model_id, instrument, predicted_direction, strength, confidence,
                features_json, realized_direction, pnl, predicted_at_ms, resolved_at_ms,
                recorded_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                id,
                prediction.source_id,
                prediction.instrument,
                prediction.direction.as_i8(),
                prediction.strength,
                prediction.confidence,
                features_json,
                outcome.direction.as_i8(),
                outcome.pnl,
                prediction.timestamp_ms as i64,
                outcome.timestamp_ms as i64,
                now_ms,
            ],
        )?;
        Ok(id)
    }

    pub fn count(&self, model_id: &str) -> EngineResult<usize> {
        let n = self.conn().query_row(
            "SELECT COUNT(*) FROM prediction_outcomes WHERE model_id = ?1",
            [model_id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(n.max(0) as usize)
    }

    /// Most recent `limit` rows for `model_id`, oldest first.
    pub fn recent(&self, model_id: &str, limit: usize) -> EngineResult<Vec<StoredOutcome>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, model_id, instrument, predicted_direction, realized_direction, pnl,
                   features_json, predicted_at_ms, resolved_at_ms
            FROM prediction_outcomes
            WHERE model_id = ?1
            ORDER BY resolved_at_ms DESC, recorded_at_ms DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![model_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, model_id, instrument, predicted, realized, pnl, features_json, at, resolved) =
                row?;
            let features: FeatureVector = serde_json::from_str(&features_json)?;
            out.push(StoredOutcome {
                id,
                model_id,
                instrument,
                predicted: Direction::from_i64(predicted),
                realized: Direction::from_i64(realized),
                pnl,
                features,
                predicted_at_ms: at.max(0) as u64,
                resolved_at_ms: resolved.max(0) as u64,
            });
        }
        out.reverse();
        Ok(out)
    }

    /// Rows become a batch of `(features, realized direction, resolution time)`.
    pub fn training_batch(&self, model_id: &str) -> EngineResult<TrainingBatch> {
        if self.count(model_id)? < self.settings.min_samples {
            return Ok(TrainingBatch::default());
        }
        let mut batch = TrainingBatch::default();
        for row in self.recent(model_id, self.settings.lookback)? {
            batch.push(row.features, row.realized.as_f64(), row.resolved_at_ms);
        }
        Ok(batch)
    }
}

#[async_trait]
impl OutcomeStore for SqliteOutcomeStore {
    async fn record_outcome(&self, prediction: &Prediction, outcome: &Outcome) -> Result<()> {
        let id = self
            .insert(prediction, outcome)
            .with_context(|| format!("failed to store outcome for {}", prediction.source_id))?;
        tracing::debug!(model_id = %prediction.source_id, outcome_id = %id, "Outcome stored");
        Ok(())
    }

    async fn prepare_training_data(&self, model_id: &str) -> Result<TrainingBatch> {
        self.training_batch(model_id)
            .with_context(|| format!("failed to prepare training data for {}", model_id))
    }
}
