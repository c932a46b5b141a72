use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of values in a face embedding produced by the recognition frontend.
pub const FACE_DESCRIPTOR_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Government,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Government => "government",
        }
    }

    pub fn home(&self) -> &'static str {
        match self {
            Role::Teacher => "/teacher/dashboard",
            Role::Government => "/government/dashboard",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Role::Teacher),
            "government" => Ok(Role::Government),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::Excused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }

    /// Statuses that record the student as physically in school get a `time_in`.
    pub fn records_arrival(&self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            other => Err(format!("unknown attendance status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AttendanceMethod {
    Manual,
    Automatic,
}

impl AttendanceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceMethod::Manual => "manual",
            AttendanceMethod::Automatic => "automatic",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub district: String,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSchool {
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub district: String,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub school_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub school_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub school_id: i64,
    pub name: String,
    pub roll_number: Option<String>,
    pub rfid_tag_id: Option<String>,
    pub class: Option<String>,
    pub section: Option<String>,
    pub parent_contact: Option<String>,
    pub parent_email: Option<String>,
    pub face_descriptor: Option<Json<FaceDescriptor>>,
    pub attendance_percentage: Option<f64>,
    pub max_consec_absences: Option<i64>,
    pub num_long_streaks: Option<i64>,
    pub dropout_risk: Option<f64>,
    pub dropout_pred: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Teacher-editable student fields. The face descriptor is mandatory.
#[derive(Debug, Clone)]
pub struct StudentDetails {
    pub name: String,
    pub roll_number: Option<String>,
    pub rfid_tag_id: Option<String>,
    pub class: Option<String>,
    pub section: Option<String>,
    pub parent_contact: Option<String>,
    pub parent_email: Option<String>,
    pub face_descriptor: FaceDescriptor,
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub search: Option<String>,
    pub class: Option<String>,
}

/// The subset of a student returned by the prediction trigger. The scorer
/// fields keep their snake_case keys, as dashboard clients read them.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSnapshot {
    pub id: i64,
    pub name: String,
    pub class: Option<String>,
    pub school_id: i64,
    pub attendance_percentage: Option<f64>,
    #[serde(rename = "max_consec_absences")]
    pub max_consec_absences: Option<i64>,
    #[serde(rename = "num_long_streaks")]
    pub num_long_streaks: Option<i64>,
    pub dropout_risk: Option<f64>,
    #[serde(rename = "dropout_pred")]
    pub dropout_pred: Option<i64>,
}

/// Fields written back by the dropout scorer for one student.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub student_id: i64,
    pub school_id: i64,
    pub attendance_percentage: f64,
    pub max_consec_absences: i64,
    pub num_long_streaks: i64,
    pub dropout_risk: f64,
    pub dropout_pred: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: i64,
    pub student_id: i64,
    pub school_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub method: AttendanceMethod,
    pub marked_by: Option<i64>,
    pub time_in: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attendance {
    pub fn is_present(&self) -> bool {
        self.status == AttendanceStatus::Present
    }
}

/// An attendance record joined with the student it belongs to.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: Attendance,
    pub student_name: String,
    pub roll_number: Option<String>,
    pub student_class: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub student_id: i64,
    pub school_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub method: AttendanceMethod,
    pub marked_by: Option<i64>,
}

#[derive(Debug, Error)]
pub enum FaceDescriptorError {
    #[error("face descriptor is missing")]
    Missing,
    #[error("face descriptor is not an array of numbers: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("face descriptor must have {FACE_DESCRIPTOR_LEN} values, got {0}")]
    WrongLength(usize),
    #[error("face descriptor contains a non-finite value")]
    NonFinite,
}

/// A validated 128-value facial embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceDescriptor(Vec<f64>);

impl FaceDescriptor {
    /// Parses the JSON payload posted by the capture form.
    pub fn parse(raw: &str) -> Result<Self, FaceDescriptorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FaceDescriptorError::Missing);
        }
        let values: Vec<f64> = serde_json::from_str(raw)?;
        Self::try_from(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

impl TryFrom<Vec<f64>> for FaceDescriptor {
    type Error = FaceDescriptorError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        if values.len() != FACE_DESCRIPTOR_LEN {
            return Err(FaceDescriptorError::WrongLength(values.len()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FaceDescriptorError::NonFinite);
        }
        Ok(FaceDescriptor(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> String {
        let values: Vec<String> = (0..len).map(|i| format!("{}", i as f64 * 0.01)).collect();
        format!("[{}]", values.join(","))
    }

    #[test]
    fn accepts_exactly_128_numbers() {
        let descriptor = FaceDescriptor::parse(&payload(128)).unwrap();
        assert_eq!(descriptor.values().len(), FACE_DESCRIPTOR_LEN);
    }

    #[test]
    fn accepts_integer_values() {
        let raw = format!("[{}]", vec!["1"; 128].join(","));
        assert!(FaceDescriptor::parse(&raw).is_ok());
    }

    #[test]
    fn rejects_wrong_lengths() {
        for len in [0, 1, 127, 129, 256] {
            match FaceDescriptor::parse(&payload(len)) {
                Err(FaceDescriptorError::WrongLength(n)) => assert_eq!(n, len),
                other => panic!("expected WrongLength for {len}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_non_numeric_and_malformed_payloads() {
        let mut mixed: Vec<String> = (0..127).map(|_| "0.5".to_string()).collect();
        mixed.push("\"x\"".to_string());
        let mixed = format!("[{}]", mixed.join(","));

        for raw in [mixed.as_str(), "not json", "{\"a\": 1}", "[[1,2]]", "null", "\"[1,2,3]\""] {
            assert!(
                matches!(FaceDescriptor::parse(raw), Err(FaceDescriptorError::Malformed(_))),
                "payload should be malformed: {raw}"
            );
        }
    }

    #[test]
    fn rejects_missing_payload() {
        assert!(matches!(FaceDescriptor::parse("   "), Err(FaceDescriptorError::Missing)));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in AttendanceStatus::ALL {
            assert_eq!(status.as_str().parse::<AttendanceStatus>().unwrap(), status);
        }
        assert!("PRESENT".parse::<AttendanceStatus>().is_ok());
        assert!("sick".parse::<AttendanceStatus>().is_err());
    }
}
