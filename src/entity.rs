//! Departments, classes and students.
//!
//! All three levels share one [`Entity`] shape; what differs between them is
//! data: the [`EntityKind`] tag and which kind a parent reference points at.

use crate::blockchain::Chain;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Department,
    Class,
    Student,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Department, EntityKind::Class, EntityKind::Student];

    /// Kind that entities of this kind anchor to, if any.
    pub fn parent(self) -> Option<EntityKind> {
        match self {
            EntityKind::Department => None,
            EntityKind::Class => Some(EntityKind::Department),
            EntityKind::Student => Some(EntityKind::Class),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Department => "department",
            EntityKind::Class => "class",
            EntityKind::Student => "student",
        }
    }

    /// Name of the persisted collection holding this kind.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Department => "departments",
            EntityKind::Class => "classes",
            EntityKind::Student => "students",
        }
    }

    pub(crate) fn id_prefix(self) -> &'static str {
        match self {
            EntityKind::Department => "dept",
            EntityKind::Class => "class",
            EntityKind::Student => "stu",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent tip recorded when a child chain was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorSnapshot {
    pub parent_id: String,
    pub parent_index: u64,
    pub parent_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorSnapshot>,
    pub chain: Chain,
}

impl Entity {
    pub fn is_root(&self) -> bool {
        self.kind.parent().is_none()
    }
}

/// Every entity of every kind, as loaded for a whole-tree validation pass.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    pub departments: Vec<Entity>,
    pub classes: Vec<Entity>,
    pub students: Vec<Entity>,
}

impl Forest {
    pub fn of_kind(&self, kind: EntityKind) -> &[Entity] {
        match kind {
            EntityKind::Department => &self.departments,
            EntityKind::Class => &self.classes,
            EntityKind::Student => &self.students,
        }
    }

    pub fn of_kind_mut(&mut self, kind: EntityKind) -> &mut Vec<Entity> {
        match kind {
            EntityKind::Department => &mut self.departments,
            EntityKind::Class => &mut self.classes,
            EntityKind::Student => &mut self.students,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.departments.iter().chain(self.classes.iter()).chain(self.students.iter())
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&Entity> {
        self.of_kind(kind).iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.departments.len() + self.classes.len() + self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_is_three_levels() {
        assert_eq!(EntityKind::Department.parent(), None);
        assert_eq!(EntityKind::Class.parent(), Some(EntityKind::Department));
        assert_eq!(EntityKind::Student.parent(), Some(EntityKind::Class));
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&EntityKind::Department).unwrap(), "\"department\"");
        assert_eq!(EntityKind::Class.collection(), "classes");
    }
}
