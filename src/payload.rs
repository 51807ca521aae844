//! Block payloads carried in the `transactions` field of every block.
//!
//! Blocks store their payload as a raw JSON value so that the bytes that were
//! hashed are exactly the bytes that get persisted and re-hashed. [`Payload`]
//! is the typed view over the tags this ledger itself writes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TYPE_GENESIS: &str = "genesis";
pub const TYPE_UPDATE: &str = "update";
pub const TYPE_DELETE: &str = "delete";
pub const TYPE_ATTENDANCE: &str = "attendance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl std::str::FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(format!("unknown attendance status '{}'", other)),
        }
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "Present"),
            AttendanceStatus::Absent => write!(f, "Absent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub student_name: String,
    pub roll_no: String,
    pub dept_id: String,
    pub class_id: String,
    pub status: AttendanceStatus,
    /// Calendar day in `YYYY-MM-DD` form.
    pub date: String,
    /// Wall-clock time the mark was recorded, epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Genesis {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_roll_no: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_roll_no: Option<String>,
    },
    Delete {
        status: String,
        name: String,
    },
    Attendance(AttendanceRecord),
}

impl Payload {
    pub fn genesis(name: impl Into<String>) -> Self {
        Payload::Genesis { name: name.into() }
    }

    pub fn rename(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Payload::Update {
            action: "rename".to_string(),
            old_name: Some(old_name.into()),
            new_name: Some(new_name.into()),
            old_roll_no: None,
            new_roll_no: None,
        }
    }

    pub fn tombstone(name: impl Into<String>) -> Self {
        Payload::Delete { status: "deleted".to_string(), name: name.into() }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Payload::Genesis { .. } => TYPE_GENESIS,
            Payload::Update { .. } => TYPE_UPDATE,
            Payload::Delete { .. } => TYPE_DELETE,
            Payload::Attendance(_) => TYPE_ATTENDANCE,
        }
    }

    pub fn to_value(&self) -> Value {
        // Serializing a derive-only enum into a Value cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        payload.to_value()
    }
}

/// The `type` tag of a raw payload, if it carries one.
pub fn payload_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn genesis_wire_shape() {
        assert_eq!(Payload::genesis("Physics").to_value(), json!({"type": "genesis", "name": "Physics"}));
    }

    #[test]
    fn rename_uses_camel_case_fields_and_omits_roll_numbers() {
        let value = Payload::rename("A", "B").to_value();
        assert_eq!(value, json!({"type": "update", "action": "rename", "oldName": "A", "newName": "B"}));
    }

    #[test]
    fn tombstone_marks_status_deleted() {
        let value = Payload::tombstone("Room 3").to_value();
        assert_eq!(value["status"], "deleted");
        assert_eq!(payload_type(&value), Some(TYPE_DELETE));
    }

    #[test]
    fn attendance_flattens_record_beside_tag() {
        let record = AttendanceRecord {
            student_id: "s1".into(),
            student_name: "Ada".into(),
            roll_no: "07".into(),
            dept_id: "d1".into(),
            class_id: "c1".into(),
            status: AttendanceStatus::Present,
            date: "2026-10-01".into(),
            timestamp: 1_790_000_000_000,
        };
        let value = Payload::Attendance(record.clone()).to_value();
        assert_eq!(value["type"], "attendance");
        assert_eq!(value["studentId"], "s1");
        assert_eq!(value["rollNo"], "07");
        assert_eq!(value["status"], "Present");
        assert_eq!(Payload::from_value(&value), Some(Payload::Attendance(record)));
    }

    #[test]
    fn foreign_objects_have_no_typed_view() {
        let value = json!({"x": 1});
        assert_eq!(payload_type(&value), None);
        assert_eq!(Payload::from_value(&value), None);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("absent".parse::<AttendanceStatus>(), Ok(AttendanceStatus::Absent));
        assert!("late".parse::<AttendanceStatus>().is_err());
    }
}
