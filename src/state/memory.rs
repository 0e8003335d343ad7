/// In-process store with the same semantics as the PostgreSQL repository.
///
/// Backs the `--memory-store` development mode and the test suites. All
/// operations take one lock, so a batch settlement is atomic here just as
/// it is inside a database transaction.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::*;
use super::{AnchorStore, RecordStore};
use crate::error::{AnchorError, Result};

#[derive(Default)]
struct Tables {
    projects: BTreeMap<i64, Project>,
    resumes: BTreeMap<i64, Resume>,
    interviews: BTreeMap<i64, InterviewRecord>,
    audit: Vec<AnchorAuditEntry>,
    ledger_config: Option<LedgerConfigSnapshot>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_settlement: AtomicBool,
}

fn invalidate(anchor: &mut AnchorMetadata, revision: &mut i64) {
    anchor.clear();
    *revision += 1;
}

fn not_found(kind: EntityKind, id: i64) -> AnchorError {
    AnchorError::NotFound(format!("{kind} {id}"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent settlement fail with a database error.
    pub fn set_fail_settlement(&self, fail: bool) {
        self.fail_settlement.store(fail, Ordering::SeqCst);
    }

    pub async fn project(&self, id: i64) -> Option<Project> {
        self.tables.lock().await.projects.get(&id).cloned()
    }

    pub async fn resume(&self, id: i64) -> Option<Resume> {
        self.tables.lock().await.resumes.get(&id).cloned()
    }

    pub async fn interview(&self, id: i64) -> Option<InterviewRecord> {
        self.tables.lock().await.interviews.get(&id).cloned()
    }

    /// All audit entries in insertion order.
    pub async fn audit_entries(&self) -> Vec<AnchorAuditEntry> {
        self.tables.lock().await.audit.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_project(&self, new: NewProject) -> Result<Project> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let project = Project {
            id,
            name: new.name,
            title: new.title,
            basic_info: new.basic_info,
            files: Vec::new(),
            status: ProjectStatus::Audit,
            profession_hash_id: new.profession_hash_id,
            creator: new.creator,
            creator_uid: new.creator_uid,
            auditor: new.auditor,
            audit_uid: new.audit_uid,
            participator: None,
            participator_uid: None,
            created_at: Utc::now(),
            anchor: AnchorMetadata::default(),
            revision: 0,
        };
        tables.projects.insert(id, project.clone());
        Ok(project)
    }

    async fn set_project_status(&self, id: i64, status: ProjectStatus) -> Result<Project> {
        let mut tables = self.tables.lock().await;
        let project = tables
            .projects
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Project, id))?;
        project.status = status;
        invalidate(&mut project.anchor, &mut project.revision);
        Ok(project.clone())
    }

    async fn assign_participator(&self, id: i64, name: &str, uid: &str) -> Result<Project> {
        let mut tables = self.tables.lock().await;
        let project = tables
            .projects
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Project, id))?;
        project.participator = Some(name.to_string());
        project.participator_uid = Some(uid.to_string());
        project.status = ProjectStatus::Proceeding;
        invalidate(&mut project.anchor, &mut project.revision);
        Ok(project.clone())
    }

    async fn attach_project_file(&self, id: i64, file_id: i64) -> Result<Project> {
        let mut tables = self.tables.lock().await;
        let project = tables
            .projects
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Project, id))?;
        project.files.push(file_id);
        invalidate(&mut project.anchor, &mut project.revision);
        Ok(project.clone())
    }

    async fn create_resume(&self, new: NewResume) -> Result<Resume> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let resume = Resume {
            id,
            user_uid: new.user_uid,
            name: new.name,
            basic_info: new.basic_info,
            project_ids: new.project_ids,
            created_at: Utc::now(),
            anchor: AnchorMetadata::default(),
            revision: 0,
        };
        tables.resumes.insert(id, resume.clone());
        Ok(resume)
    }

    async fn update_resume(&self, id: i64, content: ResumeContent) -> Result<Resume> {
        let mut tables = self.tables.lock().await;
        let resume = tables
            .resumes
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Resume, id))?;
        resume.name = content.name;
        resume.basic_info = content.basic_info;
        resume.project_ids = content.project_ids;
        invalidate(&mut resume.anchor, &mut resume.revision);
        Ok(resume.clone())
    }

    async fn create_interview(&self, new: NewInterview) -> Result<InterviewRecord> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let interview = InterviewRecord {
            id,
            title: new.title,
            info: new.info,
            interviewee: new.interviewee,
            interviewee_uid: new.interviewee_uid,
            creator: new.creator,
            creator_uid: new.creator_uid,
            status: InterviewStatus::Posted,
            status_comment: None,
            created_at: Utc::now(),
            anchor: AnchorMetadata::default(),
            revision: 0,
        };
        tables.interviews.insert(id, interview.clone());
        Ok(interview)
    }

    async fn set_interview_status(
        &self,
        id: i64,
        status: InterviewStatus,
        comment: Option<String>,
    ) -> Result<InterviewRecord> {
        let mut tables = self.tables.lock().await;
        let interview = tables
            .interviews
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Interview, id))?;
        interview.status = status;
        interview.status_comment = comment;
        invalidate(&mut interview.anchor, &mut interview.revision);
        Ok(interview.clone())
    }
}

#[async_trait]
impl AnchorStore for MemoryStore {
    async fn scan_unanchored(&self, kind: EntityKind) -> Result<Vec<AnchorRecord>> {
        let tables = self.tables.lock().await;
        let records = match kind {
            EntityKind::Project => tables
                .projects
                .values()
                .filter(|p| !p.anchor.anchored)
                .cloned()
                .map(AnchorRecord::from)
                .collect(),
            EntityKind::Resume => tables
                .resumes
                .values()
                .filter(|r| !r.anchor.anchored)
                .cloned()
                .map(AnchorRecord::from)
                .collect(),
            EntityKind::Interview => tables
                .interviews
                .values()
                .filter(|i| !i.anchor.anchored)
                .cloned()
                .map(AnchorRecord::from)
                .collect(),
        };
        Ok(records)
    }

    async fn settle_batch(&self, batch: &BatchSettlement) -> Result<SettlementOutcome> {
        if self.fail_settlement.load(Ordering::SeqCst) {
            return Err(AnchorError::Database("settlement rejected".into()));
        }

        let mut tables = self.tables.lock().await;
        let mut settled = 0;
        let mut superseded = Vec::new();

        for row in &batch.rows {
            let slot = match batch.kind {
                EntityKind::Project => tables
                    .projects
                    .get_mut(&row.id)
                    .map(|p| (&mut p.anchor, p.revision)),
                EntityKind::Resume => tables
                    .resumes
                    .get_mut(&row.id)
                    .map(|r| (&mut r.anchor, r.revision)),
                EntityKind::Interview => tables
                    .interviews
                    .get_mut(&row.id)
                    .map(|i| (&mut i.anchor, i.revision)),
            };

            match slot {
                Some((anchor, revision)) if revision == row.revision => {
                    *anchor = AnchorMetadata::settled(
                        &row.content_hash,
                        &batch.batch_key,
                        &batch.ledger_tx_ref,
                    );
                    settled += 1;
                }
                _ => superseded.push(row.id),
            }
        }

        let existing = tables
            .audit
            .iter()
            .find(|e| e.ledger_tx_ref == batch.ledger_tx_ref)
            .cloned();

        let audit = match existing {
            Some(entry) => entry,
            None => {
                let entry = AnchorAuditEntry {
                    id: Uuid::now_v7(),
                    ledger_tx_ref: batch.ledger_tx_ref.clone(),
                    entity_label: batch.kind.label().to_string(),
                    batch_key: batch.batch_key.clone(),
                    anchored_at: batch.anchored_at,
                };
                tables.audit.push(entry.clone());
                entry
            }
        };

        Ok(SettlementOutcome {
            settled,
            superseded,
            audit,
        })
    }

    async fn anchor_status(&self, kind: EntityKind, id: i64) -> Result<Option<AnchorMetadata>> {
        let tables = self.tables.lock().await;
        let meta = match kind {
            EntityKind::Project => tables.projects.get(&id).map(|p| p.anchor.clone()),
            EntityKind::Resume => tables.resumes.get(&id).map(|r| r.anchor.clone()),
            EntityKind::Interview => tables.interviews.get(&id).map(|i| i.anchor.clone()),
        };
        Ok(meta)
    }

    async fn find_batch_key(&self, content_hash: &str) -> Result<Option<(EntityKind, String)>> {
        let tables = self.tables.lock().await;
        let matches = |meta: &AnchorMetadata| {
            meta.anchored && meta.content_hash.as_deref() == Some(content_hash)
        };

        let found = tables
            .projects
            .values()
            .find(|p| matches(&p.anchor))
            .map(|p| (EntityKind::Project, p.anchor.batch_key.clone()))
            .or_else(|| {
                tables
                    .resumes
                    .values()
                    .find(|r| matches(&r.anchor))
                    .map(|r| (EntityKind::Resume, r.anchor.batch_key.clone()))
            })
            .or_else(|| {
                tables
                    .interviews
                    .values()
                    .find(|i| matches(&i.anchor))
                    .map(|i| (EntityKind::Interview, i.anchor.batch_key.clone()))
            });

        Ok(found.and_then(|(kind, key)| key.map(|k| (kind, k))))
    }

    async fn list_audit_entries(&self, filter: &AuditFilter) -> Result<(i64, Vec<AnchorAuditEntry>)> {
        let filter = filter.clone().normalized();
        let tables = self.tables.lock().await;

        let mut matching: Vec<AnchorAuditEntry> = tables
            .audit
            .iter()
            .filter(|e| filter.entity.is_none_or(|k| e.entity_label == k.label()))
            .filter(|e| {
                filter
                    .ledger_tx_ref
                    .as_deref()
                    .is_none_or(|tx| e.ledger_tx_ref == tx)
            })
            .cloned()
            .collect();

        // Newest first; v7 ids break ties in insertion order.
        matching.sort_by(|a, b| b.anchored_at.cmp(&a.anchored_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.size).unwrap_or(0))
            .collect();

        Ok((total, page))
    }

    async fn audit_entry(&self, ledger_tx_ref: &str) -> Result<Option<AnchorAuditEntry>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .audit
            .iter()
            .find(|e| e.ledger_tx_ref == ledger_tx_ref)
            .cloned())
    }

    async fn record_ledger_config(&self, snapshot: &LedgerConfigSnapshot) -> Result<()> {
        self.tables.lock().await.ledger_config = Some(snapshot.clone());
        Ok(())
    }

    async fn ledger_config(&self) -> Result<Option<LedgerConfigSnapshot>> {
        Ok(self.tables.lock().await.ledger_config.clone())
    }
}
