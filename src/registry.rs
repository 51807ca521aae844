//! Ledger registry
//!
//! Creates the chain of every department, class and student, and routes every
//! later mutation onto the mutated entity's own chain. The only place chains
//! touch each other is creation: a child's genesis `prev_hash` is the parent
//! chain's tip hash at that instant, and that snapshot is recorded on the
//! child so it can be re-checked after the parent keeps growing.
//!
//! Each operation loads the collection it mutates, changes exactly one entity
//! and saves the collection back. Callers must serialize writers; see
//! [`crate::service::LedgerHandle`].

use crate::blockchain::{validate_all_at, AnchorMode, Block, Chain, ValidationReport, DIFFICULTY, ROOT_SENTINEL};
use crate::config::LedgerSettings;
use crate::entity::{AnchorSnapshot, Entity, EntityKind, Forest};
use crate::error::{LedgerError, Result};
use crate::payload::{AttendanceRecord, AttendanceStatus, Payload, TYPE_ATTENDANCE};
use crate::persistence::Persistence;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

/// Chain for an entity with no parent, anchored to the root sentinel.
pub fn create_root_chain(label: &str) -> Chain {
    Chain::genesis(label, ROOT_SENTINEL, DIFFICULTY)
}

/// Chain anchored to `parent`'s current tip.
pub fn create_child_chain(label: &str, parent: &Chain) -> Chain {
    Chain::genesis(label, &parent.tip().hash, DIFFICULTY)
}

pub fn append_block(chain: &mut Chain, payload: impl Into<Value>) -> &Block {
    chain.append(payload)
}

pub struct LedgerRegistry {
    store: Box<dyn Persistence>,
    difficulty: usize,
    anchor_mode: AnchorMode,
}

impl LedgerRegistry {
    /// Registry that seals and validates at [`DIFFICULTY`].
    pub fn new(store: Box<dyn Persistence>, settings: &LedgerSettings) -> Self {
        Self::with_difficulty(store, settings, DIFFICULTY)
    }

    /// Registry with a lowered work target, for tests and benchmarks that
    /// cannot afford production mining. Not reachable from configuration.
    pub fn with_difficulty(store: Box<dyn Persistence>, settings: &LedgerSettings, difficulty: usize) -> Self {
        LedgerRegistry { store, difficulty, anchor_mode: settings.anchor_mode }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn anchor_mode(&self) -> AnchorMode {
        self.anchor_mode
    }

    pub fn create_department(&self, name: &str) -> Result<Entity> {
        let name = required("name", name)?;
        let mut departments = self.store.load(EntityKind::Department)?;
        let entity = Entity {
            id: new_id(EntityKind::Department),
            kind: EntityKind::Department,
            name: name.to_string(),
            roll_no: None,
            parent_id: None,
            deleted: false,
            anchor: None,
            chain: Chain::genesis(name, ROOT_SENTINEL, self.difficulty),
        };
        departments.push(entity.clone());
        self.store.save(EntityKind::Department, &departments)?;
        info!(id = %entity.id, name = %entity.name, "created department");
        Ok(entity)
    }

    pub fn create_class(&self, name: &str, dept_id: &str) -> Result<Entity> {
        let name = required("name", name)?;
        let dept_id = required("department id", dept_id)?;
        let department = self.live(EntityKind::Department, dept_id)?;
        self.create_child(EntityKind::Class, name, None, &department)
    }

    pub fn create_student(&self, name: &str, roll_no: &str, class_id: &str) -> Result<Entity> {
        let name = required("name", name)?;
        let roll_no = required("roll number", roll_no)?;
        let class_id = required("class id", class_id)?;
        let class = self.live(EntityKind::Class, class_id)?;
        let students = self.store.load(EntityKind::Student)?;
        ensure_roll_no_free(&students, class_id, roll_no, None)?;
        self.create_child(EntityKind::Student, name, Some(roll_no.to_string()), &class)
    }

    fn create_child(&self, kind: EntityKind, name: &str, roll_no: Option<String>, parent: &Entity) -> Result<Entity> {
        let mut siblings = self.store.load(kind)?;
        let tip = parent.chain.tip();
        let anchor = AnchorSnapshot {
            parent_id: parent.id.clone(),
            parent_index: tip.index,
            parent_hash: tip.hash.clone(),
        };
        let entity = Entity {
            id: new_id(kind),
            kind,
            name: name.to_string(),
            roll_no,
            parent_id: Some(parent.id.clone()),
            deleted: false,
            chain: Chain::genesis(name, &anchor.parent_hash, self.difficulty),
            anchor: Some(anchor),
        };
        siblings.push(entity.clone());
        self.store.save(kind, &siblings)?;
        info!(kind = %kind, id = %entity.id, parent = %parent.id, "created {} anchored to parent tip", kind);
        Ok(entity)
    }

    pub fn rename(&self, kind: EntityKind, id: &str, new_name: &str) -> Result<Entity> {
        let new_name = required("new name", new_name)?.to_string();
        self.mutate(kind, id, |entity| {
            let payload = Payload::rename(entity.name.clone(), new_name.clone());
            entity.chain.append_at(payload, self.difficulty);
            entity.name = new_name;
            Ok(())
        })
    }

    /// Change a student's name and/or roll number, recorded as one block.
    pub fn update_student(&self, id: &str, name: Option<&str>, roll_no: Option<&str>) -> Result<Entity> {
        let name = name.map(|n| required("name", n)).transpose()?.map(str::to_string);
        let roll_no = roll_no.map(|r| required("roll number", r)).transpose()?.map(str::to_string);
        if name.is_none() && roll_no.is_none() {
            return Err(LedgerError::invalid("update needs a new name or a new roll number"));
        }

        if let Some(roll_no) = &roll_no {
            let current = self.get(EntityKind::Student, id)?;
            let students = self.store.load(EntityKind::Student)?;
            let class_id = current.parent_id.as_deref().unwrap_or_default();
            ensure_roll_no_free(&students, class_id, roll_no, Some(id))?;
        }

        self.mutate(EntityKind::Student, id, |entity| {
            let payload = Payload::Update {
                action: "update".to_string(),
                old_name: name.as_ref().map(|_| entity.name.clone()),
                new_name: name.clone(),
                old_roll_no: roll_no.as_ref().and(entity.roll_no.clone()),
                new_roll_no: roll_no.clone(),
            };
            entity.chain.append_at(payload, self.difficulty);
            if let Some(name) = name {
                entity.name = name;
            }
            if let Some(roll_no) = roll_no {
                entity.roll_no = Some(roll_no);
            }
            Ok(())
        })
    }

    /// Logical delete: append a tombstone and set the flag. The chain stays.
    pub fn delete(&self, kind: EntityKind, id: &str) -> Result<Entity> {
        self.mutate(kind, id, |entity| {
            entity.chain.append_at(Payload::tombstone(entity.name.clone()), self.difficulty);
            entity.deleted = true;
            Ok(())
        })
    }

    /// Append one attendance block to the student's chain.
    pub fn mark_attendance(&self, student_id: &str, status: AttendanceStatus, date: &str) -> Result<Block> {
        let date = parse_date(date)?;
        let student = self.live(EntityKind::Student, student_id)?;
        let class_id = student.parent_id.clone().unwrap_or_default();
        let class = self.get(EntityKind::Class, &class_id)?;
        let record = AttendanceRecord {
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            roll_no: student.roll_no.clone().unwrap_or_default(),
            dept_id: class.parent_id.clone().unwrap_or_default(),
            class_id,
            status,
            date: date.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let entity = self.mutate(EntityKind::Student, student_id, |entity| {
            if attendance_of(&entity.chain).any(|r| r.date == date) {
                return Err(LedgerError::invalid(format!(
                    "attendance for student {} on {} is already recorded",
                    entity.id, date
                )));
            }
            entity.chain.append_at(Payload::Attendance(record), self.difficulty);
            Ok(())
        })?;
        Ok(entity.chain.tip().clone())
    }

    /// Attendance records of a student, in append order.
    pub fn attendance_history(&self, student_id: &str) -> Result<Vec<AttendanceRecord>> {
        let student = self.get(EntityKind::Student, student_id)?;
        Ok(attendance_of(&student.chain).collect())
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Entity> {
        self.store
            .load(kind)?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| LedgerError::not_found(kind.as_str(), id))
    }

    pub fn list(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        self.store.load(kind)
    }

    pub fn forest(&self) -> Result<Forest> {
        let mut forest = Forest::default();
        for kind in EntityKind::ALL {
            *forest.of_kind_mut(kind) = self.store.load(kind)?;
        }
        Ok(forest)
    }

    pub fn validate_all(&self) -> Result<ValidationReport> {
        self.validate_all_with(self.anchor_mode)
    }

    pub fn validate_all_with(&self, mode: AnchorMode) -> Result<ValidationReport> {
        let forest = self.forest()?;
        let report = validate_all_at(&forest, mode, self.difficulty);
        for failure in report.failures() {
            warn!(
                kind = %failure.kind,
                id = %failure.id,
                fault = failure.fault.as_deref().unwrap_or("anchor mismatch"),
                "integrity check failed"
            );
        }
        info!(entities = report.entities.len(), overall = report.overall, mode = ?mode, "validated ledger");
        Ok(report)
    }

    fn live(&self, kind: EntityKind, id: &str) -> Result<Entity> {
        let entity = self.get(kind, id)?;
        if entity.deleted {
            return Err(LedgerError::invalid(format!("{} {} is deleted", kind, id)));
        }
        Ok(entity)
    }

    /// Load `kind`, apply `change` to the live entity `id`, save. Nothing is
    /// saved when `change` fails.
    fn mutate<F>(&self, kind: EntityKind, id: &str, change: F) -> Result<Entity>
    where
        F: FnOnce(&mut Entity) -> Result<()>,
    {
        let mut entities = self.store.load(kind)?;
        let entity = entities
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| LedgerError::not_found(kind.as_str(), id))?;
        if entity.deleted {
            return Err(LedgerError::invalid(format!("{} {} is deleted", kind, id)));
        }
        change(entity)?;
        let updated = entity.clone();
        self.store.save(kind, &entities)?;
        info!(kind = %kind, id = %updated.id, height = updated.chain.len(), "appended block");
        Ok(updated)
    }
}

fn attendance_of(chain: &Chain) -> impl Iterator<Item = AttendanceRecord> + '_ {
    chain.blocks_of_type(TYPE_ATTENDANCE).filter_map(|b| match b.payload() {
        Some(Payload::Attendance(record)) => Some(record),
        _ => None,
    })
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid(format!("{} is required", field)));
    }
    Ok(trimmed)
}

fn parse_date(date: &str) -> Result<String> {
    let parsed = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| LedgerError::invalid(format!("date '{}' is not YYYY-MM-DD: {}", date, e)))?;
    Ok(parsed.format("%Y-%m-%d").to_string())
}

fn ensure_roll_no_free(students: &[Entity], class_id: &str, roll_no: &str, except: Option<&str>) -> Result<()> {
    let taken = students.iter().any(|s| {
        !s.deleted
            && s.parent_id.as_deref() == Some(class_id)
            && s.roll_no.as_deref() == Some(roll_no)
            && Some(s.id.as_str()) != except
    });
    if taken {
        return Err(LedgerError::invalid(format!("roll number {} is already used in class {}", roll_no, class_id)));
    }
    Ok(())
}

fn new_id(kind: EntityKind) -> String {
    format!("{}-{}", kind.id_prefix(), hex::encode(rand::random::<[u8; 6]>()))
}
