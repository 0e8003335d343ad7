/// Database state layer.
///
/// Manages PostgreSQL connections and provides typed access to:
/// - Anchorable records (projects, resumes, interviews)
/// - The append-only anchoring audit trail
/// - The persisted ledger configuration snapshot
///
/// Two traits split the surface: [`RecordStore`] is what request handlers
/// use to create and mutate rows, [`AnchorStore`] is what the reconciler and
/// the read-side use. [`Database`] implements both over sqlx;
/// [`memory::MemoryStore`] implements both in process.
pub mod memory;
pub mod models;
pub mod repository;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{AnchorError, Result};
use models::*;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(repository::db_err)?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AnchorError::Database(format!("Migration failed: {e}")))
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Create and mutate anchorable rows.
///
/// Every mutation that changes a row's content resets its anchoring
/// metadata and bumps its revision, so the next pass re-anchors it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_project(&self, new: NewProject) -> Result<Project>;
    async fn set_project_status(&self, id: i64, status: ProjectStatus) -> Result<Project>;
    async fn assign_participator(&self, id: i64, name: &str, uid: &str) -> Result<Project>;
    async fn attach_project_file(&self, id: i64, file_id: i64) -> Result<Project>;

    async fn create_resume(&self, new: NewResume) -> Result<Resume>;
    async fn update_resume(&self, id: i64, content: ResumeContent) -> Result<Resume>;

    async fn create_interview(&self, new: NewInterview) -> Result<InterviewRecord>;
    async fn set_interview_status(
        &self,
        id: i64,
        status: InterviewStatus,
        comment: Option<String>,
    ) -> Result<InterviewRecord>;
}

/// Scan, settle and audit operations used by the reconciler and read-side.
#[async_trait]
pub trait AnchorStore: Send + Sync {
    /// All rows of `kind` whose `anchored` flag is not true (NULL included),
    /// ordered by id.
    async fn scan_unanchored(&self, kind: EntityKind) -> Result<Vec<AnchorRecord>>;

    /// Apply a batch's metadata to its rows and append its audit entry,
    /// atomically. Safe to re-apply.
    async fn settle_batch(&self, batch: &BatchSettlement) -> Result<SettlementOutcome>;

    async fn anchor_status(&self, kind: EntityKind, id: i64) -> Result<Option<AnchorMetadata>>;

    /// Batch key of an anchored row carrying `content_hash`, if any.
    async fn find_batch_key(&self, content_hash: &str) -> Result<Option<(EntityKind, String)>>;

    /// Total count and one page of audit entries, newest first.
    async fn list_audit_entries(&self, filter: &AuditFilter) -> Result<(i64, Vec<AnchorAuditEntry>)>;

    async fn audit_entry(&self, ledger_tx_ref: &str) -> Result<Option<AnchorAuditEntry>>;

    async fn record_ledger_config(&self, snapshot: &LedgerConfigSnapshot) -> Result<()>;

    async fn ledger_config(&self) -> Result<Option<LedgerConfigSnapshot>>;
}

/// Everything the HTTP layer needs.
pub trait Store: RecordStore + AnchorStore {}

impl<T: RecordStore + AnchorStore + ?Sized> Store for T {}

#[async_trait]
impl RecordStore for Database {
    async fn create_project(&self, new: NewProject) -> Result<Project> {
        repository::create_project(&self.pool, &new).await
    }

    async fn set_project_status(&self, id: i64, status: ProjectStatus) -> Result<Project> {
        repository::set_project_status(&self.pool, id, status).await
    }

    async fn assign_participator(&self, id: i64, name: &str, uid: &str) -> Result<Project> {
        repository::assign_participator(&self.pool, id, name, uid).await
    }

    async fn attach_project_file(&self, id: i64, file_id: i64) -> Result<Project> {
        repository::attach_project_file(&self.pool, id, file_id).await
    }

    async fn create_resume(&self, new: NewResume) -> Result<Resume> {
        repository::create_resume(&self.pool, &new).await
    }

    async fn update_resume(&self, id: i64, content: ResumeContent) -> Result<Resume> {
        repository::update_resume(&self.pool, id, &content).await
    }

    async fn create_interview(&self, new: NewInterview) -> Result<InterviewRecord> {
        repository::create_interview(&self.pool, &new).await
    }

    async fn set_interview_status(
        &self,
        id: i64,
        status: InterviewStatus,
        comment: Option<String>,
    ) -> Result<InterviewRecord> {
        repository::set_interview_status(&self.pool, id, status, comment.as_deref()).await
    }
}

#[async_trait]
impl AnchorStore for Database {
    async fn scan_unanchored(&self, kind: EntityKind) -> Result<Vec<AnchorRecord>> {
        repository::scan_unanchored(&self.pool, kind).await
    }

    async fn settle_batch(&self, batch: &BatchSettlement) -> Result<SettlementOutcome> {
        repository::settle_batch(&self.pool, batch).await
    }

    async fn anchor_status(&self, kind: EntityKind, id: i64) -> Result<Option<AnchorMetadata>> {
        repository::anchor_status(&self.pool, kind, id).await
    }

    async fn find_batch_key(&self, content_hash: &str) -> Result<Option<(EntityKind, String)>> {
        repository::find_batch_key(&self.pool, content_hash).await
    }

    async fn list_audit_entries(&self, filter: &AuditFilter) -> Result<(i64, Vec<AnchorAuditEntry>)> {
        repository::list_audit_entries(&self.pool, filter).await
    }

    async fn audit_entry(&self, ledger_tx_ref: &str) -> Result<Option<AnchorAuditEntry>> {
        repository::get_audit_entry(&self.pool, ledger_tx_ref).await
    }

    async fn record_ledger_config(&self, snapshot: &LedgerConfigSnapshot) -> Result<()> {
        repository::upsert_ledger_config(&self.pool, snapshot).await
    }

    async fn ledger_config(&self) -> Result<Option<LedgerConfigSnapshot>> {
        repository::get_ledger_config(&self.pool).await
    }
}
