#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use ledger_anchor::error::{AnchorError, Result};
use ledger_anchor::ledger::{Ledger, LedgerReceipt, LedgerValue};
use ledger_anchor::state::memory::MemoryStore;
use ledger_anchor::state::models::{NewInterview, NewProject, NewResume, ProjectStatus};
use ledger_anchor::state::RecordStore;

/// One recorded `save` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveCall {
    pub key: String,
    pub values: Vec<String>,
    pub type_tag: u64,
}

/// What the next `save` should do.
pub enum Step {
    Ok(&'static str),
    Fail,
    Hang,
    /// Bump the project's status before answering, as a concurrent writer would.
    MutateProject(i64, &'static str),
}

/// Ledger double that replays scripted answers and records every call.
///
/// With an empty script each save succeeds with a generated tx ref.
#[derive(Default)]
pub struct ScriptedLedger {
    script: Mutex<VecDeque<Step>>,
    saves: Mutex<Vec<SaveCall>>,
    stored: Mutex<HashMap<String, Vec<String>>>,
    store: Option<Arc<MemoryStore>>,
}

pub fn block_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

impl ScriptedLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            ..Default::default()
        })
    }

    pub fn with_store(steps: Vec<Step>, store: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            store: Some(store),
            ..Default::default()
        })
    }

    pub fn saves(&self) -> Vec<SaveCall> {
        self.saves.lock().unwrap().clone()
    }

    fn record(&self, key: &str, values: &[String], type_tag: u64) -> usize {
        let mut saves = self.saves.lock().unwrap();
        saves.push(SaveCall {
            key: key.to_string(),
            values: values.to_vec(),
            type_tag,
        });
        self.stored
            .lock()
            .unwrap()
            .insert(key.to_string(), values.to_vec());
        saves.len()
    }

    fn receipt(tx_ref: String, n: usize) -> LedgerReceipt {
        LedgerReceipt {
            tx_ref,
            block_number: n as u64,
            block_timestamp: block_time(),
        }
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn get(&self, key: &str) -> Result<LedgerValue> {
        Ok(LedgerValue {
            values: self.stored.lock().unwrap().get(key).cloned().unwrap_or_default(),
            block_number: U256::from(42u64),
        })
    }

    async fn save(&self, key: &str, values: &[String], type_tag: u64) -> Result<LedgerReceipt> {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail) => Err(AnchorError::LedgerWrite("node rejected transaction".into())),
            Some(Step::Hang) => std::future::pending::<Result<LedgerReceipt>>().await,
            Some(Step::Ok(tx)) => {
                let n = self.record(key, values, type_tag);
                Ok(Self::receipt(tx.to_string(), n))
            }
            Some(Step::MutateProject(id, tx)) => {
                if let Some(store) = &self.store {
                    store
                        .set_project_status(id, ProjectStatus::Proceeding)
                        .await?;
                }
                let n = self.record(key, values, type_tag);
                Ok(Self::receipt(tx.to_string(), n))
            }
            None => {
                let n = self.record(key, values, type_tag);
                Ok(Self::receipt(format!("0x{n:064x}"), n))
            }
        }
    }
}

pub const DEADLINE: Duration = Duration::from_secs(30);

pub fn new_project(name: &str) -> NewProject {
    NewProject {
        name: name.into(),
        title: format!("{name} title"),
        basic_info: serde_json::json!({ "summary": name }),
        profession_hash_id: "prof-7".into(),
        creator: "alice".into(),
        creator_uid: "u-alice".into(),
        auditor: "bob".into(),
        audit_uid: "u-bob".into(),
    }
}

pub fn new_resume(user: &str) -> NewResume {
    NewResume {
        user_uid: format!("u-{user}"),
        name: user.into(),
        basic_info: serde_json::json!({ "school": "north campus" }),
        project_ids: vec![],
    }
}

pub fn new_interview(title: &str) -> NewInterview {
    NewInterview {
        title: title.into(),
        info: serde_json::json!({ "round": 1 }),
        interviewee: "carol".into(),
        interviewee_uid: "u-carol".into(),
        creator: "alice".into(),
        creator_uid: "u-alice".into(),
    }
}
