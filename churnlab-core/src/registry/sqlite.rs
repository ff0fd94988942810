use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

use super::{LoadedModel, ModelRegistry, ModelVersionInfo, NewModel, RegistryError};
use crate::domain::{DatasetHash, ModelStage, ModelVersion, RunId};
use crate::model::ChurnClassifier;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS model_versions (
    name TEXT NOT NULL,
    version INTEGER NOT NULL,
    stage TEXT NOT NULL,
    run_id TEXT,
    dataset_hash TEXT,
    metrics TEXT NOT NULL,
    artifact BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (name, version)
)";

const INFO_COLUMNS: &str =
    "name, version, stage, run_id, dataset_hash, metrics, created_at, updated_at";

/// SQLite-backed registry. Artifacts are stored inline as JSON blobs.
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RegistryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, RegistryError> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of versions of `name` in `stage`.
    pub fn count_in_stage(&self, name: &str, stage: ModelStage) -> Result<usize, RegistryError> {
        let conn = self.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM model_versions WHERE name = ?1 AND stage = ?2",
            params![name, stage.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn info_from_row(row: &Row<'_>) -> rusqlite::Result<ModelVersionInfo> {
    let stage: String = row.get(2)?;
    let metrics: String = row.get(5)?;
    Ok(ModelVersionInfo {
        name: row.get(0)?,
        version: ModelVersion(row.get(1)?),
        stage: stage
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?,
        run_id: row.get::<_, Option<String>>(3)?.map(RunId),
        dataset_hash: row.get::<_, Option<String>>(4)?.map(DatasetHash),
        metrics: serde_json::from_str(&metrics)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        created_at: parse_ts(row, 6)?,
        updated_at: parse_ts(row, 7)?,
    })
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn latest_in_stage(
    conn: &Connection,
    name: &str,
    stage: ModelStage,
) -> rusqlite::Result<Option<ModelVersionInfo>> {
    conn.query_row(
        &format!(
            "SELECT {INFO_COLUMNS} FROM model_versions \
             WHERE name = ?1 AND stage = ?2 ORDER BY version DESC LIMIT 1"
        ),
        params![name, stage.as_str()],
        info_from_row,
    )
    .optional()
}

fn version_info(
    conn: &Connection,
    name: &str,
    version: ModelVersion,
) -> rusqlite::Result<Option<ModelVersionInfo>> {
    conn.query_row(
        &format!("SELECT {INFO_COLUMNS} FROM model_versions WHERE name = ?1 AND version = ?2"),
        params![name, version.0],
        info_from_row,
    )
    .optional()
}

impl ModelRegistry for SqliteRegistry {
    fn get_latest(
        &self,
        name: &str,
        stage: ModelStage,
    ) -> Result<Option<ModelVersionInfo>, RegistryError> {
        let conn = self.lock();
        Ok(latest_in_stage(&conn, name, stage)?)
    }

    fn load(&self, name: &str, stage: ModelStage) -> Result<LoadedModel, RegistryError> {
        let conn = self.lock();
        let info = latest_in_stage(&conn, name, stage)?.ok_or_else(|| {
            RegistryError::NoModelInStage {
                name: name.to_string(),
                stage,
            }
        })?;
        let bytes: Vec<u8> = conn.query_row(
            "SELECT artifact FROM model_versions WHERE name = ?1 AND version = ?2",
            params![name, info.version.0],
            |row| row.get(0),
        )?;
        let classifier = ChurnClassifier::from_bytes(&bytes)?;
        Ok(LoadedModel { info, classifier })
    }

    fn register(&self, model: NewModel) -> Result<ModelVersionInfo, RegistryError> {
        let artifact = model.classifier.to_bytes()?;
        let metrics = serde_json::to_string(&model.metrics)?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let next: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM model_versions WHERE name = ?1",
            params![model.name],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO model_versions \
             (name, version, stage, run_id, dataset_hash, metrics, artifact, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                model.name,
                next,
                ModelStage::None.as_str(),
                model.run_id.as_ref().map(|r| r.0.as_str()),
                model.dataset_hash.as_ref().map(|h| h.0.as_str()),
                metrics,
                artifact,
                now,
            ],
        )?;
        let info = version_info(&tx, &model.name, ModelVersion(next))?.ok_or_else(|| {
            RegistryError::VersionNotFound {
                name: model.name.clone(),
                version: ModelVersion(next),
            }
        })?;
        tx.commit()?;

        info!(name = %model.name, version = %info.version, "registered model version");
        Ok(info)
    }

    fn transition(
        &self,
        name: &str,
        version: ModelVersion,
        stage: ModelStage,
        archive_existing: bool,
    ) -> Result<ModelVersionInfo, RegistryError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = version_info(&tx, name, version)?.ok_or_else(|| RegistryError::VersionNotFound {
            name: name.to_string(),
            version,
        })?;

        let exclusive = matches!(stage, ModelStage::Staging | ModelStage::Production);
        let mut archived = 0;
        if exclusive {
            if archive_existing {
                archived = tx.execute(
                    "UPDATE model_versions SET stage = ?1, updated_at = ?2 \
                     WHERE name = ?3 AND stage = ?4 AND version != ?5",
                    params![
                        ModelStage::Archived.as_str(),
                        now,
                        name,
                        stage.as_str(),
                        version.0
                    ],
                )?;
            } else if stage == ModelStage::Production {
                if let Some(holder) = latest_in_stage(&tx, name, stage)? {
                    if holder.version != version {
                        return Err(RegistryError::StageOccupied {
                            name: name.to_string(),
                            stage,
                            holder: holder.version,
                        });
                    }
                }
            }
        }

        tx.execute(
            "UPDATE model_versions SET stage = ?1, updated_at = ?2 WHERE name = ?3 AND version = ?4",
            params![stage.as_str(), now, name, version.0],
        )?;
        let info = version_info(&tx, name, version)?.ok_or_else(|| RegistryError::VersionNotFound {
            name: name.to_string(),
            version,
        })?;
        tx.commit()?;

        info!(
            name,
            version = %version,
            from = %current.stage,
            to = %stage,
            archived,
            "stage transition"
        );
        Ok(info)
    }

    fn list_versions(&self, name: &str) -> Result<Vec<ModelVersionInfo>, RegistryError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {INFO_COLUMNS} FROM model_versions WHERE name = ?1 ORDER BY version"
        ))?;
        let rows = stmt
            .query_map(params![name], info_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
