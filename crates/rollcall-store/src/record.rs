//! Student records as stored under `Students/<id>`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format of `last_attendance_time`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Placeholder for a record that was never marked.
pub const NOT_MARKED: &str = "N/A";

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Attendance status codes as written by the management tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[serde(rename = "P")]
    Present,
    #[serde(rename = "A")]
    Absent,
    #[serde(rename = "E")]
    Excused,
}

impl AttendanceStatus {
    pub fn code(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "P",
            AttendanceStatus::Absent => "A",
            AttendanceStatus::Excused => "E",
        }
    }

    /// Whether setting this status stamps the record with the current time.
    pub fn is_attended(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Excused)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" | "present" => Ok(AttendanceStatus::Present),
            "a" | "absent" => Ok(AttendanceStatus::Absent),
            "e" | "excused" => Ok(AttendanceStatus::Excused),
            other => Err(format!("unknown status {other:?} (expected P, A or E)")),
        }
    }
}

/// Unknown or empty status strings read back as "no status".
fn lenient_status<'de, D: Deserializer<'de>>(d: D) -> Result<Option<AttendanceStatus>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn not_marked() -> String {
    NOT_MARKED.to_string()
}

/// One student, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub branch: String,
    #[serde(
        default,
        rename = "attendance",
        deserialize_with = "lenient_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<AttendanceStatus>,
    #[serde(default)]
    pub total_attendance: u32,
    #[serde(default = "not_marked")]
    pub last_attendance_time: String,
}

impl StudentRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            branch: branch.into(),
            status: None,
            total_attendance: 0,
            last_attendance_time: not_marked(),
        }
    }

    /// Fill fields a partially written record may lack; `key` is its database key.
    pub fn with_defaults(mut self, key: &str) -> Self {
        if self.id.is_empty() {
            self.id = key.to_string();
        }
        if self.name.is_empty() {
            self.name = self.id.clone();
        }
        if self.branch.is_empty() {
            self.branch = NOT_MARKED.to_string();
        }
        self
    }

    /// Parsed `last_attendance_time`, if it holds a timestamp.
    pub fn last_marked(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.last_attendance_time, TIMESTAMP_FORMAT).ok()
    }
}

/// Fields the attendance station patches on recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceUpdate {
    pub attendance: AttendanceStatus,
    pub total_attendance: u32,
    pub last_attendance_time: String,
}

impl AttendanceUpdate {
    /// Mark `record` present at `at`, incrementing its total.
    pub fn present(record: &StudentRecord, at: NaiveDateTime) -> Self {
        Self {
            attendance: AttendanceStatus::Present,
            total_attendance: record.total_attendance.saturating_add(1),
            last_attendance_time: format_timestamp(at),
        }
    }

    pub fn apply(&self, record: &mut StudentRecord) {
        record.status = Some(self.attendance);
        record.total_attendance = self.total_attendance;
        record.last_attendance_time = self.last_attendance_time.clone();
    }
}

/// Characters Firebase Realtime Database forbids in keys.
const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '$', '#', '[', ']', '/'];

/// Check that `key` can be used as a record key.
pub fn validate_key(key: &str) -> Result<(), crate::StoreError> {
    if key.trim().is_empty()
        || key.len() > 768
        || key.chars().any(|c| FORBIDDEN_KEY_CHARS.contains(&c) || c.is_control())
    {
        return Err(crate::StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
