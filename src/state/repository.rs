/// Repository layer: typed database queries for anchorable records.
///
/// All queries use sqlx runtime-checked queries (not compile-time checked)
/// to avoid requiring a live database during development builds.
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::*;
use crate::error::{AnchorError, Result};

pub(crate) fn db_err(e: sqlx::Error) -> AnchorError {
    AnchorError::Database(e.to_string())
}

const LEDGER_CONFIG_TAG: &str = "ledger";

const PROJECT_COLUMNS: &str = "id, name, title, basic_info, files, status, profession_hash_id, \
     creator, creator_uid, auditor, audit_uid, participator, participator_uid, created_at, \
     COALESCE(anchored, FALSE) AS anchored, content_hash, batch_key, ledger_tx_ref, revision";

const RESUME_COLUMNS: &str = "id, user_uid, name, basic_info, project_ids, created_at, \
     COALESCE(anchored, FALSE) AS anchored, content_hash, batch_key, ledger_tx_ref, revision";

const INTERVIEW_COLUMNS: &str = "id, title, info, interviewee, interviewee_uid, creator, \
     creator_uid, status, status_comment, created_at, \
     COALESCE(anchored, FALSE) AS anchored, content_hash, batch_key, ledger_tx_ref, revision";

/// SET clause shared by every content mutation.
const INVALIDATE: &str = "anchored = FALSE, content_hash = NULL, batch_key = NULL, \
     ledger_tx_ref = NULL, revision = revision + 1";

fn columns(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Project => PROJECT_COLUMNS,
        EntityKind::Resume => RESUME_COLUMNS,
        EntityKind::Interview => INTERVIEW_COLUMNS,
    }
}

fn not_found(kind: EntityKind, id: i64) -> AnchorError {
    AnchorError::NotFound(format!("{kind} {id}"))
}

// ── Projects ──

pub async fn create_project(pool: &PgPool, new: &NewProject) -> Result<Project> {
    let sql = format!(
        r#"
        INSERT INTO projects
        (name, title, basic_info, files, status, profession_hash_id, creator, creator_uid, auditor, audit_uid, created_at, anchored, revision)
        VALUES ($1, $2, $3, '{{}}', $4, $5, $6, $7, $8, $9, $10, FALSE, 0)
        RETURNING {PROJECT_COLUMNS}
        "#
    );

    sqlx::query_as::<_, Project>(&sql)
        .bind(&new.name)
        .bind(&new.title)
        .bind(&new.basic_info)
        .bind(ProjectStatus::Audit)
        .bind(&new.profession_hash_id)
        .bind(&new.creator)
        .bind(&new.creator_uid)
        .bind(&new.auditor)
        .bind(&new.audit_uid)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .map_err(db_err)
}

pub async fn set_project_status(pool: &PgPool, id: i64, status: ProjectStatus) -> Result<Project> {
    let sql = format!(
        "UPDATE projects SET status = $2, {INVALIDATE} WHERE id = $1 RETURNING {PROJECT_COLUMNS}"
    );

    sqlx::query_as::<_, Project>(&sql)
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| not_found(EntityKind::Project, id))
}

/// Assigning a student also moves the project into `proceeding`.
pub async fn assign_participator(pool: &PgPool, id: i64, name: &str, uid: &str) -> Result<Project> {
    let sql = format!(
        r#"
        UPDATE projects
        SET participator = $2, participator_uid = $3, status = $4, {INVALIDATE}
        WHERE id = $1
        RETURNING {PROJECT_COLUMNS}
        "#
    );

    sqlx::query_as::<_, Project>(&sql)
        .bind(id)
        .bind(name)
        .bind(uid)
        .bind(ProjectStatus::Proceeding)
        .fetch_optional(pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| not_found(EntityKind::Project, id))
}

pub async fn attach_project_file(pool: &PgPool, id: i64, file_id: i64) -> Result<Project> {
    let sql = format!(
        "UPDATE projects SET files = array_append(files, $2), {INVALIDATE} WHERE id = $1 RETURNING {PROJECT_COLUMNS}"
    );

    sqlx::query_as::<_, Project>(&sql)
        .bind(id)
        .bind(file_id)
        .fetch_optional(pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| not_found(EntityKind::Project, id))
}

// ── Resumes ──

pub async fn create_resume(pool: &PgPool, new: &NewResume) -> Result<Resume> {
    let sql = format!(
        r#"
        INSERT INTO resumes (user_uid, name, basic_info, project_ids, created_at, anchored, revision)
        VALUES ($1, $2, $3, $4, $5, FALSE, 0)
        RETURNING {RESUME_COLUMNS}
        "#
    );

    sqlx::query_as::<_, Resume>(&sql)
        .bind(&new.user_uid)
        .bind(&new.name)
        .bind(&new.basic_info)
        .bind(new.project_ids.as_slice())
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .map_err(db_err)
}

pub async fn update_resume(pool: &PgPool, id: i64, content: &ResumeContent) -> Result<Resume> {
    let sql = format!(
        r#"
        UPDATE resumes
        SET name = $2, basic_info = $3, project_ids = $4, {INVALIDATE}
        WHERE id = $1
        RETURNING {RESUME_COLUMNS}
        "#
    );

    sqlx::query_as::<_, Resume>(&sql)
        .bind(id)
        .bind(&content.name)
        .bind(&content.basic_info)
        .bind(content.project_ids.as_slice())
        .fetch_optional(pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| not_found(EntityKind::Resume, id))
}

// ── Interviews ──

pub async fn create_interview(pool: &PgPool, new: &NewInterview) -> Result<InterviewRecord> {
    let sql = format!(
        r#"
        INSERT INTO interviews
        (title, info, interviewee, interviewee_uid, creator, creator_uid, status, created_at, anchored, revision)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, 0)
        RETURNING {INTERVIEW_COLUMNS}
        "#
    );

    sqlx::query_as::<_, InterviewRecord>(&sql)
        .bind(&new.title)
        .bind(&new.info)
        .bind(&new.interviewee)
        .bind(&new.interviewee_uid)
        .bind(&new.creator)
        .bind(&new.creator_uid)
        .bind(InterviewStatus::Posted)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .map_err(db_err)
}

pub async fn set_interview_status(
    pool: &PgPool,
    id: i64,
    status: InterviewStatus,
    comment: Option<&str>,
) -> Result<InterviewRecord> {
    let sql = format!(
        r#"
        UPDATE interviews
        SET status = $2, status_comment = $3, {INVALIDATE}
        WHERE id = $1
        RETURNING {INTERVIEW_COLUMNS}
        "#
    );

    sqlx::query_as::<_, InterviewRecord>(&sql)
        .bind(id)
        .bind(status)
        .bind(comment)
        .fetch_optional(pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| not_found(EntityKind::Interview, id))
}

// ── Anchoring ──

pub async fn scan_unanchored(pool: &PgPool, kind: EntityKind) -> Result<Vec<AnchorRecord>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE anchored IS NOT TRUE ORDER BY id",
        columns(kind),
        kind.table()
    );

    let records = match kind {
        EntityKind::Project => sqlx::query_as::<_, Project>(&sql)
            .fetch_all(pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(AnchorRecord::from)
            .collect(),
        EntityKind::Resume => sqlx::query_as::<_, Resume>(&sql)
            .fetch_all(pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(AnchorRecord::from)
            .collect(),
        EntityKind::Interview => sqlx::query_as::<_, InterviewRecord>(&sql)
            .fetch_all(pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(AnchorRecord::from)
            .collect(),
    };

    Ok(records)
}

/// Settle one batch in a single transaction.
///
/// Each row update is keyed by id and guarded by the revision seen at scan
/// time; re-applying the same batch rewrites identical values. The audit
/// insert is keyed by the transaction reference, so a replay finds the
/// existing entry instead of appending a second one.
pub async fn settle_batch(pool: &PgPool, batch: &BatchSettlement) -> Result<SettlementOutcome> {
    let update = format!(
        r#"
        UPDATE {}
        SET anchored = TRUE, content_hash = $3, batch_key = $4, ledger_tx_ref = $5
        WHERE id = $1 AND revision = $2
        "#,
        batch.kind.table()
    );

    let mut tx = pool.begin().await.map_err(db_err)?;
    let mut settled = 0;
    let mut superseded = Vec::new();

    for row in &batch.rows {
        let result = sqlx::query(&update)
            .bind(row.id)
            .bind(row.revision)
            .bind(&row.content_hash)
            .bind(&batch.batch_key)
            .bind(&batch.ledger_tx_ref)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            superseded.push(row.id);
        } else {
            settled += 1;
        }
    }

    let inserted = sqlx::query_as::<_, AnchorAuditEntry>(
        r#"
        INSERT INTO anchor_audit_log (id, ledger_tx_ref, entity_label, batch_key, anchored_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (ledger_tx_ref) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(&batch.ledger_tx_ref)
    .bind(batch.kind.label())
    .bind(&batch.batch_key)
    .bind(batch.anchored_at)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_err)?;

    let audit = match inserted {
        Some(entry) => entry,
        None => sqlx::query_as::<_, AnchorAuditEntry>(
            "SELECT * FROM anchor_audit_log WHERE ledger_tx_ref = $1",
        )
        .bind(&batch.ledger_tx_ref)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?,
    };

    tx.commit().await.map_err(db_err)?;

    Ok(SettlementOutcome {
        settled,
        superseded,
        audit,
    })
}

pub async fn anchor_status(
    pool: &PgPool,
    kind: EntityKind,
    id: i64,
) -> Result<Option<AnchorMetadata>> {
    let sql = format!(
        "SELECT COALESCE(anchored, FALSE) AS anchored, content_hash, batch_key, ledger_tx_ref FROM {} WHERE id = $1",
        kind.table()
    );

    sqlx::query_as::<_, AnchorMetadata>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_err)
}

/// Only rows whose flag is currently true are trusted; stale hashes on
/// invalidated rows are cleared anyway, but the flag is the authority.
pub async fn find_batch_key(pool: &PgPool, content_hash: &str) -> Result<Option<(EntityKind, String)>> {
    for kind in EntityKind::ALL {
        let sql = format!(
            "SELECT batch_key FROM {} WHERE anchored IS TRUE AND content_hash = $1 ORDER BY id LIMIT 1",
            kind.table()
        );

        let found: Option<Option<String>> = sqlx::query_scalar(&sql)
            .bind(content_hash)
            .fetch_optional(pool)
            .await
            .map_err(db_err)?;

        if let Some(Some(batch_key)) = found {
            return Ok(Some((kind, batch_key)));
        }
    }

    Ok(None)
}

// ── Audit Trail ──

pub async fn list_audit_entries(
    pool: &PgPool,
    filter: &AuditFilter,
) -> Result<(i64, Vec<AnchorAuditEntry>)> {
    let filter = filter.clone().normalized();
    let entity = filter.entity.map(EntityKind::label);

    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM anchor_audit_log
        WHERE ($1::text IS NULL OR entity_label = $1)
          AND ($2::text IS NULL OR ledger_tx_ref = $2)
        "#,
    )
    .bind(entity)
    .bind(filter.ledger_tx_ref.as_deref())
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    let entries = sqlx::query_as::<_, AnchorAuditEntry>(
        r#"
        SELECT * FROM anchor_audit_log
        WHERE ($1::text IS NULL OR entity_label = $1)
          AND ($2::text IS NULL OR ledger_tx_ref = $2)
        ORDER BY anchored_at DESC, id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(entity)
    .bind(filter.ledger_tx_ref.as_deref())
    .bind(filter.size)
    .bind(filter.offset())
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    Ok((count, entries))
}

pub async fn get_audit_entry(pool: &PgPool, ledger_tx_ref: &str) -> Result<Option<AnchorAuditEntry>> {
    sqlx::query_as::<_, AnchorAuditEntry>("SELECT * FROM anchor_audit_log WHERE ledger_tx_ref = $1")
        .bind(ledger_tx_ref)
        .fetch_optional(pool)
        .await
        .map_err(db_err)
}

// ── Configuration ──

pub async fn upsert_ledger_config(pool: &PgPool, snapshot: &LedgerConfigSnapshot) -> Result<()> {
    let content = serde_json::to_value(snapshot)
        .map_err(|e| AnchorError::Serialization(format!("Ledger config: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO configurations (tag, content, updated_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (tag)
        DO UPDATE SET content = $2, updated_at = $3
        "#,
    )
    .bind(LEDGER_CONFIG_TAG)
    .bind(content)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(db_err)?;

    Ok(())
}

pub async fn get_ledger_config(pool: &PgPool) -> Result<Option<LedgerConfigSnapshot>> {
    let content: Option<serde_json::Value> =
        sqlx::query_scalar("SELECT content FROM configurations WHERE tag = $1")
            .bind(LEDGER_CONFIG_TAG)
            .fetch_optional(pool)
            .await
            .map_err(db_err)?;

    content
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|e| AnchorError::Serialization(format!("Ledger config: {e}")))
        })
        .transpose()
}
