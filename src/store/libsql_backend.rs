//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. All datetimes are stored as
//! RFC 3339 text; enums as their snake_case strings; position/certification
//! lists and job specs as JSON columns.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Database as LibSqlDatabase};
use tracing::{debug, info};
use uuid::Uuid;

use crate::approvals::{Approval, ApprovalStatus};
use crate::campaigns::{Campaign, JobSpec};
use crate::candidates::{AgentAction, Candidate, PipelineStatus};
use crate::error::DatabaseError;
use crate::pipeline::{PipelineDefinition, Stage, StageProgress, StageState};
use crate::scoring::ScoringResult;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<String>` to a libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

// ── Row mappers ─────────────────────────────────────────────────────

const CANDIDATE_COLUMNS: &str = "id, campaign_id, external_id, name, location, current_company, \
     current_title, positions, certifications, pipeline_status, total_score, bucket, \
     hard_filter_passed, disqualify_reason, created_at, updated_at";

fn row_to_candidate(row: &libsql::Row) -> Result<Candidate, libsql::Error> {
    let id: String = row.get(0)?;
    let campaign_id: String = row.get(1)?;
    let positions_json: String = row.get(7)?;
    let certs_json: String = row.get(8)?;
    let status_str: String = row.get(9)?;
    let bucket_str: Option<String> = row.get(11).ok();
    let hard_filter: Option<i64> = row.get(12).ok();
    let created_str: String = row.get(14)?;
    let updated_str: String = row.get(15)?;

    Ok(Candidate {
        id: parse_uuid(&id),
        campaign_id: parse_uuid(&campaign_id),
        external_id: row.get(2)?,
        name: row.get(3)?,
        location: row.get(4).ok(),
        current_company: row.get(5).ok(),
        current_title: row.get(6).ok(),
        positions: serde_json::from_str(&positions_json).unwrap_or_default(),
        certifications: serde_json::from_str(&certs_json).unwrap_or_default(),
        pipeline_status: status_str
            .parse()
            .unwrap_or(PipelineStatus::Identified),
        total_score: row.get(10).ok(),
        bucket: bucket_str.and_then(|b| b.parse().ok()),
        hard_filter_passed: hard_filter.map(|v| v != 0),
        disqualify_reason: row.get(13).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const CAMPAIGN_COLUMNS: &str = "id, name, active, search_query, pipeline_id, job_spec, created_at";

fn row_to_campaign(row: &libsql::Row) -> Result<Campaign, libsql::Error> {
    let id: String = row.get(0)?;
    let active: i64 = row.get(2)?;
    let pipeline_id: Option<String> = row.get(4).ok();
    let job_spec_json: String = row.get(5)?;
    let created_str: String = row.get(6)?;

    Ok(Campaign {
        id: parse_uuid(&id),
        name: row.get(1)?,
        active: active != 0,
        search_query: row.get(3).ok(),
        pipeline_id: pipeline_id.map(|p| parse_uuid(&p)),
        job_spec: serde_json::from_str::<JobSpec>(&job_spec_json).unwrap_or_default(),
        created_at: parse_datetime(&created_str),
    })
}

const STAGE_COLUMNS: &str =
    "id, pipeline_id, stage_order, action_type, delay_days, requires_approval, template";

fn row_to_stage(row: &libsql::Row) -> Result<Stage, libsql::Error> {
    let id: String = row.get(0)?;
    let pipeline_id: String = row.get(1)?;
    let order: i64 = row.get(2)?;
    let action_str: String = row.get(3)?;
    let delay: i64 = row.get(4)?;
    let requires: i64 = row.get(5)?;

    Ok(Stage {
        id: parse_uuid(&id),
        pipeline_id: parse_uuid(&pipeline_id),
        stage_order: order as u32,
        action: action_str
            .parse()
            .unwrap_or(crate::pipeline::StageAction::Wait),
        delay_days: delay as u32,
        requires_approval: requires != 0,
        template: row.get(6).ok(),
    })
}

const PROGRESS_COLUMNS: &str =
    "id, candidate_id, pipeline_stage_id, status, started_at, completed_at";

fn row_to_progress(row: &libsql::Row) -> Result<StageProgress, libsql::Error> {
    let id: String = row.get(0)?;
    let candidate_id: String = row.get(1)?;
    let stage_id: String = row.get(2)?;
    let state_str: String = row.get(3)?;
    let started: Option<String> = row.get(4).ok();
    let completed: Option<String> = row.get(5).ok();

    Ok(StageProgress {
        id: parse_uuid(&id),
        candidate_id: parse_uuid(&candidate_id),
        stage_id: parse_uuid(&stage_id),
        state: state_str.parse().unwrap_or(StageState::Pending),
        started_at: parse_optional_datetime(&started),
        completed_at: parse_optional_datetime(&completed),
    })
}

const APPROVAL_COLUMNS: &str = "id, candidate_id, campaign_id, approval_type, proposed_text, \
     approved_text, status, responded_at, sent_at, failed_reason, pipeline_stage_id, \
     created_at, updated_at";

fn row_to_approval(row: &libsql::Row) -> Result<Approval, libsql::Error> {
    let id: String = row.get(0)?;
    let candidate_id: String = row.get(1)?;
    let campaign_id: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let status_str: String = row.get(6)?;
    let responded: Option<String> = row.get(7).ok();
    let sent: Option<String> = row.get(8).ok();
    let stage_id: Option<String> = row.get(10).ok();
    let created_str: String = row.get(11)?;
    let updated_str: String = row.get(12)?;

    Ok(Approval {
        id: parse_uuid(&id),
        candidate_id: parse_uuid(&candidate_id),
        campaign_id: parse_uuid(&campaign_id),
        approval_type: kind_str
            .parse()
            .unwrap_or(crate::clients::OutreachKind::Message),
        proposed_text: row.get(4)?,
        approved_text: row.get(5).ok(),
        status: status_str.parse().unwrap_or(ApprovalStatus::Pending),
        responded_at: parse_optional_datetime(&responded),
        sent_at: parse_optional_datetime(&sent),
        failed_reason: row.get(9).ok(),
        pipeline_stage_id: stage_id.map(|s| parse_uuid(&s)),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const ACTION_COLUMNS: &str = "id, candidate_id, action_type, success, metadata, created_at";

fn row_to_action(row: &libsql::Row) -> Result<AgentAction, libsql::Error> {
    let id: String = row.get(0)?;
    let candidate_id: String = row.get(1)?;
    let success: i64 = row.get(3)?;
    let metadata_json: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    Ok(AgentAction {
        id: parse_uuid(&id),
        candidate_id: parse_uuid(&candidate_id),
        action_type: row.get(2)?,
        success: success != 0,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::init_schema(self.conn()).await
    }

    // ── Candidates ──────────────────────────────────────────────────

    async fn insert_candidate(&self, candidate: &Candidate) -> Result<(), DatabaseError> {
        let positions = serde_json::to_string(&candidate.positions)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let certifications = serde_json::to_string(&candidate.certifications)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO candidates (id, campaign_id, external_id, name, location, \
                 current_company, current_title, positions, certifications, pipeline_status, \
                 total_score, bucket, hard_filter_passed, disqualify_reason, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    candidate.id.to_string(),
                    candidate.campaign_id.to_string(),
                    candidate.external_id.clone(),
                    candidate.name.clone(),
                    opt_text_owned(candidate.location.clone()),
                    opt_text_owned(candidate.current_company.clone()),
                    opt_text_owned(candidate.current_title.clone()),
                    positions,
                    certifications,
                    candidate.pipeline_status.as_str(),
                    opt_real(candidate.total_score),
                    opt_text_owned(candidate.bucket.map(|b| b.as_str().to_string())),
                    match candidate.hard_filter_passed {
                        Some(v) => libsql::Value::Integer(i64::from(v)),
                        None => libsql::Value::Null,
                    },
                    opt_text_owned(candidate.disqualify_reason.clone()),
                    candidate.created_at.to_rfc3339(),
                    candidate.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_candidate: {e}")))?;

        debug!(candidate_id = %candidate.id, "Candidate inserted");
        Ok(())
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_candidate: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_candidate(&row).map_err(|e| {
                DatabaseError::Query(format!("get_candidate row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_candidate: {e}"))),
        }
    }

    async fn get_candidate_by_external_id(
        &self,
        campaign_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Candidate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CANDIDATE_COLUMNS} FROM candidates \
                     WHERE campaign_id = ?1 AND external_id = ?2"
                ),
                params![campaign_id.to_string(), external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_candidate_by_external_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_candidate(&row).map_err(|e| {
                DatabaseError::Query(format!("get_candidate_by_external_id row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "get_candidate_by_external_id: {e}"
            ))),
        }
    }

    async fn update_candidate_status(
        &self,
        id: Uuid,
        expected: PipelineStatus,
        new: PipelineStatus,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE candidates SET pipeline_status = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND pipeline_status = ?4",
                params![new.as_str(), now, id.to_string(), expected.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_candidate_status: {e}")))?;

        debug!(
            candidate_id = %id,
            from = expected.as_str(),
            to = new.as_str(),
            applied = affected > 0,
            "Candidate status update"
        );
        Ok(affected > 0)
    }

    async fn update_candidate_score(
        &self,
        id: Uuid,
        result: &ScoringResult,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let disqualify = result
            .flags
            .iter()
            .find_map(|f| f.strip_prefix("disqualified:").map(str::to_string));

        self.conn()
            .execute(
                "UPDATE candidates SET total_score = ?1, bucket = ?2, hard_filter_passed = ?3, \
                 disqualify_reason = ?4, updated_at = ?5 WHERE id = ?6",
                params![
                    result.total_score,
                    result.bucket.as_str(),
                    i64::from(result.hard_filter_passed),
                    opt_text_owned(disqualify),
                    now,
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_candidate_score: {e}")))?;
        Ok(())
    }

    async fn list_candidates_by_status(
        &self,
        campaign_id: Option<Uuid>,
        status: PipelineStatus,
    ) -> Result<Vec<Candidate>, DatabaseError> {
        let mut rows = match campaign_id {
            Some(cid) => self
                .conn()
                .query(
                    &format!(
                        "SELECT {CANDIDATE_COLUMNS} FROM candidates \
                         WHERE campaign_id = ?1 AND pipeline_status = ?2 ORDER BY updated_at ASC"
                    ),
                    params![cid.to_string(), status.as_str()],
                )
                .await,
            None => self
                .conn()
                .query(
                    &format!(
                        "SELECT {CANDIDATE_COLUMNS} FROM candidates \
                         WHERE pipeline_status = ?1 ORDER BY updated_at ASC"
                    ),
                    params![status.as_str()],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("list_candidates_by_status: {e}")))?;

        let mut candidates = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_candidate(&row) {
                Ok(c) => candidates.push(c),
                Err(e) => tracing::warn!("Skipping candidate row: {e}"),
            }
        }
        Ok(candidates)
    }

    async fn list_unscored_candidates(
        &self,
        campaign_id: Uuid,
    ) -> Result<Vec<Candidate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CANDIDATE_COLUMNS} FROM candidates \
                     WHERE campaign_id = ?1 AND hard_filter_passed IS NULL \
                     ORDER BY created_at ASC"
                ),
                params![campaign_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_unscored_candidates: {e}")))?;

        let mut candidates = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_candidate(&row) {
                Ok(c) => candidates.push(c),
                Err(e) => tracing::warn!("Skipping candidate row: {e}"),
            }
        }
        Ok(candidates)
    }

    // ── Campaigns ───────────────────────────────────────────────────

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), DatabaseError> {
        let job_spec = serde_json::to_string(&campaign.job_spec)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO campaigns (id, name, active, search_query, pipeline_id, job_spec, \
                 created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    campaign.id.to_string(),
                    campaign.name.clone(),
                    i64::from(campaign.active),
                    opt_text_owned(campaign.search_query.clone()),
                    opt_text_owned(campaign.pipeline_id.map(|p| p.to_string())),
                    job_spec,
                    campaign.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_campaign: {e}")))?;
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_campaign: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_campaign(&row).map_err(|e| {
                DatabaseError::Query(format!("get_campaign row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_campaign: {e}"))),
        }
    }

    async fn list_active_campaigns(&self) -> Result<Vec<Campaign>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE active = 1 \
                     ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_campaigns: {e}")))?;

        let mut campaigns = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_campaign(&row) {
                Ok(c) => campaigns.push(c),
                Err(e) => tracing::warn!("Skipping campaign row: {e}"),
            }
        }
        Ok(campaigns)
    }

    // ── Pipelines & stage progress ──────────────────────────────────

    async fn insert_pipeline(&self, pipeline: &PipelineDefinition) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO pipelines (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![
                    pipeline.id.to_string(),
                    pipeline.name.clone(),
                    pipeline.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_pipeline: {e}")))?;

        for stage in &pipeline.stages {
            self.conn()
                .execute(
                    "INSERT INTO pipeline_stages (id, pipeline_id, stage_order, action_type, \
                     delay_days, requires_approval, template) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        stage.id.to_string(),
                        stage.pipeline_id.to_string(),
                        i64::from(stage.stage_order),
                        stage.action.as_str(),
                        i64::from(stage.delay_days),
                        i64::from(stage.requires_approval),
                        opt_text_owned(stage.template.clone()),
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("insert_pipeline stage: {e}")))?;
        }
        Ok(())
    }

    async fn get_pipeline(&self, id: Uuid) -> Result<Option<PipelineDefinition>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, created_at FROM pipelines WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_pipeline: {e}")))?;

        let (name, created_at) = match rows.next().await {
            Ok(Some(row)) => {
                let name: String = row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("get_pipeline row: {e}")))?;
                let created: String = row
                    .get(2)
                    .map_err(|e| DatabaseError::Query(format!("get_pipeline row: {e}")))?;
                (name, parse_datetime(&created))
            }
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("get_pipeline: {e}"))),
        };

        let mut stage_rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {STAGE_COLUMNS} FROM pipeline_stages \
                     WHERE pipeline_id = ?1 ORDER BY stage_order ASC"
                ),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_pipeline stages: {e}")))?;

        let mut stages = Vec::new();
        while let Ok(Some(row)) = stage_rows.next().await {
            match row_to_stage(&row) {
                Ok(s) => stages.push(s),
                Err(e) => tracing::warn!("Skipping stage row: {e}"),
            }
        }

        Ok(Some(PipelineDefinition {
            id,
            name,
            stages,
            created_at,
        }))
    }

    async fn get_stage(&self, id: Uuid) -> Result<Option<Stage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {STAGE_COLUMNS} FROM pipeline_stages WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_stage: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stage(&row).map_err(|e| {
                DatabaseError::Query(format!("get_stage row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_stage: {e}"))),
        }
    }

    async fn insert_stage_progress(&self, progress: &StageProgress) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO candidate_pipeline_progress (id, candidate_id, pipeline_stage_id, \
                 status, started_at, completed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    progress.id.to_string(),
                    progress.candidate_id.to_string(),
                    progress.stage_id.to_string(),
                    progress.state.as_str(),
                    opt_text_owned(progress.started_at.map(|t| t.to_rfc3339())),
                    opt_text_owned(progress.completed_at.map(|t| t.to_rfc3339())),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_stage_progress: {e}")))?;
        Ok(())
    }

    async fn latest_stage_progress(
        &self,
        candidate_id: Uuid,
    ) -> Result<Option<StageProgress>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROGRESS_COLUMNS} FROM candidate_pipeline_progress \
                     WHERE candidate_id = ?1 ORDER BY started_at DESC LIMIT 1"
                ),
                params![candidate_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_stage_progress: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_progress(&row).map_err(|e| {
                DatabaseError::Query(format!("latest_stage_progress row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("latest_stage_progress: {e}"))),
        }
    }

    async fn list_in_progress_stages(
        &self,
        campaign_id: Uuid,
    ) -> Result<Vec<StageProgress>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT p.id, p.candidate_id, p.pipeline_stage_id, p.status, p.started_at, \
                 p.completed_at \
                 FROM candidate_pipeline_progress p \
                 JOIN candidates c ON c.id = p.candidate_id \
                 WHERE c.campaign_id = ?1 AND p.status = 'in_progress' \
                 ORDER BY p.started_at ASC",
                params![campaign_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_in_progress_stages: {e}")))?;

        let mut progress = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_progress(&row) {
                Ok(p) => progress.push(p),
                Err(e) => tracing::warn!("Skipping progress row: {e}"),
            }
        }
        Ok(progress)
    }

    async fn update_stage_progress(
        &self,
        id: Uuid,
        state: StageState,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE candidate_pipeline_progress SET status = ?1, completed_at = ?2 \
                 WHERE id = ?3",
                params![
                    state.as_str(),
                    opt_text_owned(completed_at.map(|t| t.to_rfc3339())),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_stage_progress: {e}")))?;
        Ok(())
    }

    // ── Approvals ───────────────────────────────────────────────────

    async fn insert_approval(&self, approval: &Approval) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO approval_queue (id, candidate_id, campaign_id, approval_type, \
                 proposed_text, approved_text, status, responded_at, sent_at, failed_reason, \
                 pipeline_stage_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    approval.id.to_string(),
                    approval.candidate_id.to_string(),
                    approval.campaign_id.to_string(),
                    approval.approval_type.as_str(),
                    approval.proposed_text.clone(),
                    opt_text_owned(approval.approved_text.clone()),
                    approval.status.as_str(),
                    opt_text_owned(approval.responded_at.map(|t| t.to_rfc3339())),
                    opt_text_owned(approval.sent_at.map(|t| t.to_rfc3339())),
                    opt_text_owned(approval.failed_reason.clone()),
                    opt_text_owned(approval.pipeline_stage_id.map(|s| s.to_string())),
                    approval.created_at.to_rfc3339(),
                    approval.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_approval: {e}")))?;

        debug!(approval_id = %approval.id, "Approval inserted");
        Ok(())
    }

    async fn get_approval(&self, id: Uuid) -> Result<Option<Approval>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {APPROVAL_COLUMNS} FROM approval_queue WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_approval: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_approval(&row).map_err(|e| {
                DatabaseError::Query(format!("get_approval row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_approval: {e}"))),
        }
    }

    async fn list_approvals_by_status(
        &self,
        status: ApprovalStatus,
    ) -> Result<Vec<Approval>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {APPROVAL_COLUMNS} FROM approval_queue WHERE status = ?1 \
                     ORDER BY COALESCE(responded_at, created_at) ASC"
                ),
                params![status.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_approvals_by_status: {e}")))?;

        let mut approvals = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_approval(&row) {
                Ok(a) => approvals.push(a),
                Err(e) => tracing::warn!("Skipping approval row: {e}"),
            }
        }
        Ok(approvals)
    }

    async fn resolve_approval(
        &self,
        id: Uuid,
        expected: ApprovalStatus,
        new: ApprovalStatus,
        approved_text: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE approval_queue SET status = ?1, \
                 approved_text = COALESCE(?2, approved_text), \
                 responded_at = ?3, updated_at = ?3 \
                 WHERE id = ?4 AND status = ?5",
                params![
                    new.as_str(),
                    opt_text_owned(approved_text.map(str::to_string)),
                    now,
                    id.to_string(),
                    expected.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("resolve_approval: {e}")))?;
        Ok(affected > 0)
    }

    async fn mark_approval_sent(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE approval_queue SET status = 'sent', sent_at = ?1, updated_at = ?1 \
                 WHERE id = ?2 AND status = 'approved'",
                params![now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_approval_sent: {e}")))?;
        Ok(affected > 0)
    }

    async fn mark_approval_failed(&self, id: Uuid, reason: &str) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE approval_queue SET status = 'failed', failed_reason = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND status = 'approved'",
                params![reason, now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_approval_failed: {e}")))?;
        Ok(affected > 0)
    }

    async fn has_open_approval(&self, candidate_id: Uuid) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM approval_queue \
                 WHERE candidate_id = ?1 AND status IN ('pending', 'approved')",
                params![candidate_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_open_approval: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("has_open_approval: {e}"))),
        }
    }

    // ── Agent action log ────────────────────────────────────────────

    async fn insert_action(&self, action: &AgentAction) -> Result<(), DatabaseError> {
        let metadata = serde_json::to_string(&action.metadata)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO agent_actions (id, candidate_id, action_type, success, metadata, \
                 created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    action.id.to_string(),
                    action.candidate_id.to_string(),
                    action.action_type.clone(),
                    i64::from(action.success),
                    metadata,
                    action.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_action: {e}")))?;
        Ok(())
    }

    async fn latest_entry_into_status(
        &self,
        candidate_id: Uuid,
        status: PipelineStatus,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT created_at FROM agent_actions \
                 WHERE candidate_id = ?1 \
                   AND action_type IN ('pipeline_transition', 'pipeline_transition_forced') \
                   AND json_extract(metadata, '$.to') = ?2 \
                 ORDER BY created_at DESC LIMIT 1",
                params![candidate_id.to_string(), status.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_entry_into_status: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let created: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("latest_entry_into_status: {e}")))?;
                Ok(Some(parse_datetime(&created)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("latest_entry_into_status: {e}"))),
        }
    }

    async fn list_actions_for_candidate(
        &self,
        candidate_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AgentAction>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ACTION_COLUMNS} FROM agent_actions WHERE candidate_id = ?1 \
                     ORDER BY created_at DESC LIMIT ?2"
                ),
                params![candidate_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_actions_for_candidate: {e}")))?;

        let mut actions = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_action(&row) {
                Ok(a) => actions.push(a),
                Err(e) => tracing::warn!("Skipping action row: {e}"),
            }
        }
        Ok(actions)
    }

    // ── Daily action counters ───────────────────────────────────────

    async fn action_count(&self, day: &str, action_type: &str) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT count FROM daily_action_counts WHERE day = ?1 AND action_type = ?2",
                params![day, action_type],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("action_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("action_count: {e}"))),
        }
    }

    async fn increment_action_count(
        &self,
        day: &str,
        action_type: &str,
    ) -> Result<(), DatabaseError> {
        // Atomic upsert so independent processes never lose increments.
        self.conn()
            .execute(
                "INSERT INTO daily_action_counts (day, action_type, count) VALUES (?1, ?2, 1) \
                 ON CONFLICT(day, action_type) DO UPDATE SET count = count + 1",
                params![day, action_type],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_action_count: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::OutreachKind;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn candidate(campaign_id: Uuid) -> Candidate {
        Candidate::new(campaign_id, "ext-1", "Jane Doe")
    }

    #[tokio::test]
    async fn candidate_roundtrip() {
        let db = backend().await;
        let mut c = candidate(Uuid::new_v4());
        c.location = Some("Austin".into());
        c.positions = vec![crate::candidates::Position {
            title: "Dev".into(),
            company: "A".into(),
            months: 18,
        }];
        db.insert_candidate(&c).await.unwrap();

        let loaded = db.get_candidate(c.id).await.unwrap().unwrap();
        assert_eq!(loaded.external_id, "ext-1");
        assert_eq!(loaded.pipeline_status, PipelineStatus::Identified);
        assert_eq!(loaded.positions.len(), 1);
        assert_eq!(loaded.location.as_deref(), Some("Austin"));
    }

    #[tokio::test]
    async fn local_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outreach.db");

        let c = candidate(Uuid::new_v4());
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_candidate(&c).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let loaded = db.get_candidate(c.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Jane Doe");
    }

    #[tokio::test]
    async fn duplicate_external_id_rejected() {
        let db = backend().await;
        let campaign_id = Uuid::new_v4();
        db.insert_candidate(&candidate(campaign_id)).await.unwrap();
        assert!(db.insert_candidate(&candidate(campaign_id)).await.is_err());
    }

    #[tokio::test]
    async fn conditional_status_update() {
        let db = backend().await;
        let c = candidate(Uuid::new_v4());
        db.insert_candidate(&c).await.unwrap();

        // Expected status matches: applies
        let applied = db
            .update_candidate_status(
                c.id,
                PipelineStatus::Identified,
                PipelineStatus::ConnectionSent,
            )
            .await
            .unwrap();
        assert!(applied);

        // Stale expectation: rejected
        let applied = db
            .update_candidate_status(
                c.id,
                PipelineStatus::Identified,
                PipelineStatus::Archived,
            )
            .await
            .unwrap();
        assert!(!applied);

        let loaded = db.get_candidate(c.id).await.unwrap().unwrap();
        assert_eq!(loaded.pipeline_status, PipelineStatus::ConnectionSent);
    }

    #[tokio::test]
    async fn approval_resolution_is_conditional() {
        let db = backend().await;
        let approval = Approval::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            OutreachKind::Message,
            "Hi J...",
            None,
        );
        db.insert_approval(&approval).await.unwrap();

        // pending -> approved with an edit
        let ok = db
            .resolve_approval(
                approval.id,
                ApprovalStatus::Pending,
                ApprovalStatus::Approved,
                Some("Hi Jane..."),
            )
            .await
            .unwrap();
        assert!(ok);

        // Second resolution attempt no longer matches pending
        let ok = db
            .resolve_approval(
                approval.id,
                ApprovalStatus::Pending,
                ApprovalStatus::Rejected,
                None,
            )
            .await
            .unwrap();
        assert!(!ok);

        let loaded = db.get_approval(approval.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ApprovalStatus::Approved);
        assert_eq!(loaded.approved_text.as_deref(), Some("Hi Jane..."));
        assert!(loaded.responded_at.is_some());
    }

    #[tokio::test]
    async fn sent_requires_approved() {
        let db = backend().await;
        let approval = Approval::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            OutreachKind::Message,
            "text",
            None,
        );
        db.insert_approval(&approval).await.unwrap();

        // Straight from pending: refused
        assert!(!db.mark_approval_sent(approval.id).await.unwrap());

        db.resolve_approval(
            approval.id,
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            None,
        )
        .await
        .unwrap();
        assert!(db.mark_approval_sent(approval.id).await.unwrap());

        let loaded = db.get_approval(approval.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ApprovalStatus::Sent);
        assert!(loaded.sent_at.is_some());
    }

    #[tokio::test]
    async fn timing_oracle_reads_transition_metadata() {
        let db = backend().await;
        let candidate_id = Uuid::new_v4();

        let mut older = AgentAction::new(
            candidate_id,
            "pipeline_transition",
            true,
            serde_json::json!({"from": "identified", "to": "connection_sent"}),
        );
        older.created_at = Utc::now() - chrono::Duration::days(3);
        db.insert_action(&older).await.unwrap();

        let newer = AgentAction::new(
            candidate_id,
            "pipeline_transition",
            true,
            serde_json::json!({"from": "connection_sent", "to": "connected_no_message"}),
        );
        db.insert_action(&newer).await.unwrap();

        let entered = db
            .latest_entry_into_status(candidate_id, PipelineStatus::ConnectedNoMessage)
            .await
            .unwrap()
            .unwrap();
        assert!((entered - newer.created_at).num_seconds().abs() < 2);

        // No entry into statuses the candidate never reached
        let none = db
            .latest_entry_into_status(candidate_id, PipelineStatus::Placed)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn daily_counter_increments() {
        let db = backend().await;
        assert_eq!(db.action_count("2026-08-30", "message").await.unwrap(), 0);
        db.increment_action_count("2026-08-30", "message").await.unwrap();
        db.increment_action_count("2026-08-30", "message").await.unwrap();
        assert_eq!(db.action_count("2026-08-30", "message").await.unwrap(), 2);
        // Other action types unaffected
        assert_eq!(db.action_count("2026-08-30", "inmail").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pipeline_roundtrip_orders_stages() {
        let db = backend().await;
        let mut def = PipelineDefinition::new("default");
        def.add_stage(crate::pipeline::StageAction::ConnectionRequest, 0, true);
        def.add_stage(crate::pipeline::StageAction::Wait, 2, false);
        db.insert_pipeline(&def).await.unwrap();

        let loaded = db.get_pipeline(def.id).await.unwrap().unwrap();
        assert_eq!(loaded.stages.len(), 2);
        assert_eq!(
            loaded.stages[0].action,
            crate::pipeline::StageAction::ConnectionRequest
        );
        assert_eq!(loaded.stages[1].delay_days, 2);
    }
}
