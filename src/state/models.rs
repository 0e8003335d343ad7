/// Database models for anchorable records and the anchoring audit trail.
///
/// These structs map directly to PostgreSQL tables and are used
/// for both reading and writing via sqlx. The in-memory store holds the
/// same structs.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ── Entity kinds ──

/// The record types that get notarized on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Resume,
    Interview,
}

impl EntityKind {
    /// Fixed pass order within one reconciler tick.
    pub const ALL: [EntityKind; 3] = [EntityKind::Project, EntityKind::Resume, EntityKind::Interview];

    /// Label written to the audit trail.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Resume => "resume",
            EntityKind::Interview => "interview",
        }
    }

    /// Type tag passed to the contract's `save`.
    pub fn type_tag(self) -> u64 {
        match self {
            EntityKind::Project => 1,
            EntityKind::Resume => 2,
            EntityKind::Interview => 3,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Resume => "resumes",
            EntityKind::Interview => "interviews",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" | "projects" => Ok(EntityKind::Project),
            "resume" | "resumes" => Ok(EntityKind::Resume),
            "interview" | "interviews" => Ok(EntityKind::Interview),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

// ── Anchoring metadata ──

/// Anchoring columns embedded in every anchorable row.
///
/// `anchored == true` implies the three optional fields are set and
/// `content_hash` matches the row's canonical hash at settlement time.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AnchorMetadata {
    pub anchored: bool,
    pub content_hash: Option<String>,
    pub batch_key: Option<String>,
    pub ledger_tx_ref: Option<String>,
}

impl AnchorMetadata {
    /// Reset to the "never anchored" state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn settled(content_hash: &str, batch_key: &str, ledger_tx_ref: &str) -> Self {
        Self {
            anchored: true,
            content_hash: Some(content_hash.to_string()),
            batch_key: Some(batch_key.to_string()),
            ledger_tx_ref: Some(ledger_tx_ref.to_string()),
        }
    }
}

// ── Projects ──

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Audit,
    Closed,
    Proceeding,
    Finished,
    Passed,
}

/// A project posted by a mentor and taken on by a student.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub title: String,
    /// Difficulty, background, requirement and plan (free-form JSON).
    pub basic_info: serde_json::Value,
    /// Ids of attached files.
    pub files: Vec<i64>,
    pub status: ProjectStatus,
    pub profession_hash_id: String,
    pub creator: String,
    pub creator_uid: String,
    pub auditor: String,
    pub audit_uid: String,
    pub participator: Option<String>,
    pub participator_uid: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub anchor: AnchorMetadata,
    /// Bumped by every content mutation; guards settlement.
    #[serde(skip)]
    pub revision: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub basic_info: serde_json::Value,
    pub profession_hash_id: String,
    pub creator: String,
    pub creator_uid: String,
    pub auditor: String,
    pub audit_uid: String,
}

// ── Resumes ──

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Resume {
    pub id: i64,
    pub user_uid: String,
    pub name: String,
    pub basic_info: serde_json::Value,
    /// Projects the student binds to this resume.
    pub project_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub anchor: AnchorMetadata,
    #[serde(skip)]
    pub revision: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewResume {
    pub user_uid: String,
    pub name: String,
    #[serde(default)]
    pub basic_info: serde_json::Value,
    #[serde(default)]
    pub project_ids: Vec<i64>,
}

/// Replacement content for an existing resume.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeContent {
    pub name: String,
    #[serde(default)]
    pub basic_info: serde_json::Value,
    #[serde(default)]
    pub project_ids: Vec<i64>,
}

// ── Interviews ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "interview_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    Posted,
    Accepted,
    Rejected,
    Finished,
}

/// An interview arranged between a firm contact and a student.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct InterviewRecord {
    pub id: i64,
    pub title: String,
    /// Content, date, location and position (free-form JSON).
    pub info: serde_json::Value,
    pub interviewee: String,
    pub interviewee_uid: String,
    pub creator: String,
    pub creator_uid: String,
    pub status: InterviewStatus,
    pub status_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub anchor: AnchorMetadata,
    #[serde(skip)]
    pub revision: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInterview {
    pub title: String,
    #[serde(default)]
    pub info: serde_json::Value,
    pub interviewee: String,
    pub interviewee_uid: String,
    pub creator: String,
    pub creator_uid: String,
}

// ── Any anchorable row ──

/// A row of any anchorable type, as returned by an unanchored scan.
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorRecord {
    Project(Project),
    Resume(Resume),
    Interview(InterviewRecord),
}

impl AnchorRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            AnchorRecord::Project(_) => EntityKind::Project,
            AnchorRecord::Resume(_) => EntityKind::Resume,
            AnchorRecord::Interview(_) => EntityKind::Interview,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            AnchorRecord::Project(p) => p.id,
            AnchorRecord::Resume(r) => r.id,
            AnchorRecord::Interview(i) => i.id,
        }
    }

    pub fn revision(&self) -> i64 {
        match self {
            AnchorRecord::Project(p) => p.revision,
            AnchorRecord::Resume(r) => r.revision,
            AnchorRecord::Interview(i) => i.revision,
        }
    }

    pub fn anchor(&self) -> &AnchorMetadata {
        match self {
            AnchorRecord::Project(p) => &p.anchor,
            AnchorRecord::Resume(r) => &r.anchor,
            AnchorRecord::Interview(i) => &i.anchor,
        }
    }

    pub fn anchor_mut(&mut self) -> &mut AnchorMetadata {
        match self {
            AnchorRecord::Project(p) => &mut p.anchor,
            AnchorRecord::Resume(r) => &mut r.anchor,
            AnchorRecord::Interview(i) => &mut i.anchor,
        }
    }
}

impl From<Project> for AnchorRecord {
    fn from(p: Project) -> Self {
        AnchorRecord::Project(p)
    }
}

impl From<Resume> for AnchorRecord {
    fn from(r: Resume) -> Self {
        AnchorRecord::Resume(r)
    }
}

impl From<InterviewRecord> for AnchorRecord {
    fn from(i: InterviewRecord) -> Self {
        AnchorRecord::Interview(i)
    }
}

// ── Settlement ──

/// Write-back for one row of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSettlement {
    pub id: i64,
    /// Revision observed when the row was scanned.
    pub revision: i64,
    pub content_hash: String,
}

/// Everything needed to settle one successful ledger write.
#[derive(Debug, Clone)]
pub struct BatchSettlement {
    pub kind: EntityKind,
    pub batch_key: String,
    pub ledger_tx_ref: String,
    pub anchored_at: DateTime<Utc>,
    pub rows: Vec<RowSettlement>,
}

/// What a settlement actually changed.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    /// Rows now carrying this batch's metadata.
    pub settled: usize,
    /// Rows mutated between scan and settle; left unanchored.
    pub superseded: Vec<i64>,
    pub audit: AnchorAuditEntry,
}

// ── Audit trail ──

/// One row per successful ledger write. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AnchorAuditEntry {
    pub id: Uuid,
    pub ledger_tx_ref: String,
    pub entity_label: String,
    pub batch_key: String,
    pub anchored_at: DateTime<Utc>,
}

/// Paging and filters for audit listings.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity: Option<EntityKind>,
    pub ledger_tx_ref: Option<String>,
    pub page: i64,
    pub size: i64,
}

impl AuditFilter {
    pub const DEFAULT_SIZE: i64 = 10;
    pub const MAX_SIZE: i64 = 100;

    /// Clamp page to >= 1 and size to 1..=100 (defaulting to 10).
    pub fn normalized(mut self) -> Self {
        if self.page <= 0 {
            self.page = 1;
        }
        if self.size <= 0 || self.size > Self::MAX_SIZE {
            self.size = Self::DEFAULT_SIZE;
        }
        self
    }

    /// Rows to skip. Saturates for absurd pages, which then come back empty.
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }
}

// ── Ledger configuration snapshot ──

/// Redacted ledger settings recorded after a successful initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfigSnapshot {
    pub endpoint: String,
    pub contract_address: String,
    pub gas_fee_cap: u64,
    pub gas_limit: u64,
    pub chain_id: u64,
    pub recorded_at: DateTime<Utc>,
}
