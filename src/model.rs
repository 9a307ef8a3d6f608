// src/model.rs  -  Wire and roster records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Class session the operator is marking attendance for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSessionTarget {
    pub id:           String,
    #[serde(default)]
    pub course_name:  String,
    #[serde(default)]
    pub session_name: String,
}

impl ClassSessionTarget {
    pub fn label(&self) -> String {
        match (self.course_name.is_empty(), self.session_name.is_empty()) {
            (false, false) => format!("{} · {}", self.course_name, self.session_name),
            (false, true)  => self.course_name.clone(),
            (true, false)  => self.session_name.clone(),
            (true, true)   => self.id.clone(),
        }
    }
}

/// Read-only subset of a user record, enough to identify a scanned badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentLookupRecord {
    pub id:         String,
    pub name:       String,
    #[serde(default)]
    pub email:      String,
    #[serde(default)]
    pub barcode_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active:  Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Body of `POST /attendance/mark`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMarkRequest {
    pub student_id:        String,
    pub class_instance_id: String,
    pub marked_by_user_id: String,
    pub timestamp:         DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status:            Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes:             Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn mark_request_serialises_camel_case_without_empty_optionals() {
        let req = AttendanceMarkRequest {
            student_id:        "u_7".into(),
            class_instance_id: "cls_1".into(),
            marked_by_user_id: "op_1".into(),
            timestamp:         Utc.with_ymd_and_hms(2026, 3, 2, 8, 15, 0).unwrap(),
            status:            None,
            notes:             None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["studentId"], "u_7");
        assert_eq!(v["classInstanceId"], "cls_1");
        assert_eq!(v["markedByUserId"], "op_1");
        assert_eq!(v["timestamp"], "2026-03-02T08:15:00Z");
        assert!(v.get("status").is_none());
        assert!(v.get("notes").is_none());
    }

    #[test]
    fn student_record_tolerates_missing_optional_fields() {
        let s: StudentLookupRecord =
            serde_json::from_str(r#"{"id":"u1","name":"Ada","barcodeId":"A1B2C3"}"#).unwrap();
        assert_eq!(s.barcode_id, "A1B2C3");
        assert_eq!(s.email, "");
        assert_eq!(s.is_active, None);
    }

    #[test]
    fn class_label_falls_back_to_id() {
        let c = ClassSessionTarget { id: "cls_1".into(), course_name: String::new(), session_name: String::new() };
        assert_eq!(c.label(), "cls_1");
        let c = ClassSessionTarget { id: "x".into(), course_name: "CS101".into(), session_name: "Lab 3".into() };
        assert_eq!(c.label(), "CS101 · Lab 3");
    }
}
