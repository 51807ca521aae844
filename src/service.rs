//! Single-writer async handle over a [`LedgerRegistry`].
//!
//! Every call takes the registry lock and runs on tokio's blocking pool, so
//! proof-of-work sealing never stalls the async runtime and concurrent callers
//! are serialized instead of racing on the load/modify/save cycle.

use crate::blockchain::{AnchorMode, Block, ValidationReport};
use crate::entity::{Entity, EntityKind};
use crate::error::Result;
use crate::payload::{AttendanceRecord, AttendanceStatus};
use crate::registry::LedgerRegistry;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone)]
pub struct LedgerHandle {
    inner: Arc<Mutex<LedgerRegistry>>,
}

impl LedgerHandle {
    pub fn new(registry: LedgerRegistry) -> Self {
        Self { inner: Arc::new(Mutex::new(registry)) }
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&LedgerRegistry) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let registry = inner.lock();
            op(&registry)
        })
        .await?
    }

    pub async fn create_department(&self, name: String) -> Result<Entity> {
        self.run(move |r| r.create_department(&name)).await
    }

    pub async fn create_class(&self, name: String, dept_id: String) -> Result<Entity> {
        self.run(move |r| r.create_class(&name, &dept_id)).await
    }

    pub async fn create_student(&self, name: String, roll_no: String, class_id: String) -> Result<Entity> {
        self.run(move |r| r.create_student(&name, &roll_no, &class_id)).await
    }

    pub async fn rename(&self, kind: EntityKind, id: String, new_name: String) -> Result<Entity> {
        self.run(move |r| r.rename(kind, &id, &new_name)).await
    }

    pub async fn delete(&self, kind: EntityKind, id: String) -> Result<Entity> {
        self.run(move |r| r.delete(kind, &id)).await
    }

    pub async fn mark_attendance(&self, student_id: String, status: AttendanceStatus, date: String) -> Result<Block> {
        self.run(move |r| r.mark_attendance(&student_id, status, &date)).await
    }

    pub async fn attendance_history(&self, student_id: String) -> Result<Vec<AttendanceRecord>> {
        self.run(move |r| r.attendance_history(&student_id)).await
    }

    pub async fn validate_all(&self, mode: Option<AnchorMode>) -> Result<ValidationReport> {
        self.run(move |r| r.validate_all_with(mode.unwrap_or(r.anchor_mode()))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerSettings;
    use crate::persistence::InMemoryPersistence;

    fn handle() -> LedgerHandle {
        let store = Box::new(InMemoryPersistence::new());
        LedgerHandle::new(LedgerRegistry::with_difficulty(store, &LedgerSettings::default(), 1))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_marks_are_serialized() {
        let ledger = handle();
        let dept = ledger.create_department("Physics".into()).await.unwrap();
        let class = ledger.create_class("A".into(), dept.id.clone()).await.unwrap();
        let student = ledger.create_student("Ada".into(), "01".into(), class.id.clone()).await.unwrap();

        let mut tasks = Vec::new();
        for day in 1..=8 {
            let ledger = ledger.clone();
            let id = student.id.clone();
            tasks.push(tokio::spawn(async move {
                ledger.mark_attendance(id, AttendanceStatus::Present, format!("2026-10-{:02}", day)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // No lost updates: every mark landed on the one chain.
        let history = ledger.attendance_history(student.id.clone()).await.unwrap();
        assert_eq!(history.len(), 8);
        let report = ledger.validate_all(None).await.unwrap();
        assert!(report.overall);
    }
}
