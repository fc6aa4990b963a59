//! Record management: add, update, delete.

use crate::record::{format_timestamp, validate_key, AttendanceStatus, StudentRecord, NOT_MARKED};
use crate::store::StudentStore;
use crate::StoreError;
use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManageError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Field values as entered by the operator. Blank strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct StudentForm {
    pub id: String,
    pub name: String,
    pub branch: String,
    pub status: Option<AttendanceStatus>,
    pub total: Option<u32>,
}

fn required(value: &str, field: &'static str) -> Result<String, ManageError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ManageError::Missing(field));
    }
    Ok(value.to_string())
}

fn or_current(value: &str, current: &str) -> String {
    match value.trim() {
        "" => current.to_string(),
        v => v.to_string(),
    }
}

/// Create (or overwrite) the record at `form.id`.
///
/// The record is stamped with `now` only when its status counts as attended.
pub async fn add_student<S: StudentStore + ?Sized>(
    store: &S,
    form: &StudentForm,
    now: NaiveDateTime,
) -> Result<StudentRecord, ManageError> {
    let id = required(&form.id, "student id")?;
    let name = required(&form.name, "name")?;
    let branch = required(&form.branch, "branch")?;
    validate_key(&id)?;

    let mut record = StudentRecord::new(id, name, branch);
    record.status = form.status;
    record.total_attendance = form.total.unwrap_or(0);
    record.last_attendance_time = match form.status {
        Some(status) if status.is_attended() => format_timestamp(now),
        _ => NOT_MARKED.to_string(),
    };

    store.put(&record).await?;
    tracing::info!(id = %record.id, status = ?record.status, "student added");
    Ok(record)
}

/// Overwrite the record at `form.id`, keeping current values for blank fields.
/// A missing record is created from the form alone.
pub async fn update_student<S: StudentStore + ?Sized>(
    store: &S,
    form: &StudentForm,
    now: NaiveDateTime,
) -> Result<StudentRecord, ManageError> {
    let id = required(&form.id, "student id")?;
    validate_key(&id)?;

    let current = store.get(&id).await?;
    if current.is_none() {
        tracing::warn!(%id, "updating a student with no existing record");
    }
    let current = current.unwrap_or_else(|| StudentRecord::new(id.as_str(), "", ""));

    let record = StudentRecord {
        name: or_current(&form.name, &current.name),
        branch: or_current(&form.branch, &current.branch),
        status: form.status.or(current.status),
        total_attendance: form.total.unwrap_or(current.total_attendance),
        last_attendance_time: format_timestamp(now),
        id,
    };

    store.put(&record).await?;
    tracing::info!(id = %record.id, "student updated");
    Ok(record)
}

/// Remove the record at `id`. Returns whether it existed.
pub async fn delete_student<S: StudentStore + ?Sized>(store: &S, id: &str) -> Result<bool, ManageError> {
    let id = required(id, "student id")?;
    let existed = store.get(&id).await?.is_some();
    store.delete(&id).await?;
    tracing::info!(%id, existed, "student deleted");
    Ok(existed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(8, 30, 0).unwrap()
    }

    fn form(id: &str, name: &str, branch: &str) -> StudentForm {
        StudentForm {
            id: id.into(),
            name: name.into(),
            branch: branch.into(),
            ..StudentForm::default()
        }
    }

    #[tokio::test]
    async fn test_add_requires_fields() {
        let store = MemoryStore::new();
        let err = add_student(&store, &form("S1", "Ada", "  "), now()).await.unwrap_err();
        assert!(matches!(err, ManageError::Missing("branch")));
        let err = add_student(&store, &form("", "Ada", "CS"), now()).await.unwrap_err();
        assert!(matches!(err, ManageError::Missing("student id")));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_add_timestamp_depends_on_status() {
        let store = MemoryStore::new();

        let mut present = form("S1", " Ada ", "CS");
        present.status = Some(AttendanceStatus::Present);
        present.total = Some(3);
        let r = add_student(&store, &present, now()).await.unwrap();
        assert_eq!(r.name, "Ada");
        assert_eq!(r.total_attendance, 3);
        assert_eq!(r.last_attendance_time, "2024-03-04 08:30:00");

        let mut absent = form("S2", "Grace", "EE");
        absent.status = Some(AttendanceStatus::Absent);
        let r = add_student(&store, &absent, now()).await.unwrap();
        assert_eq!(r.last_attendance_time, NOT_MARKED);
        assert_eq!(r.total_attendance, 0);

        let r = add_student(&store, &form("S3", "Alan", "ME"), now()).await.unwrap();
        assert_eq!(r.status, None);
        assert_eq!(r.last_attendance_time, NOT_MARKED);
    }

    #[tokio::test]
    async fn test_add_rejects_bad_key() {
        let store = MemoryStore::new();
        let err = add_student(&store, &form("a/b", "Ada", "CS"), now()).await.unwrap_err();
        assert!(matches!(err, ManageError::Store(StoreError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_update_keeps_blank_fields() {
        let mut existing = StudentRecord::new("S1", "Ada", "CS");
        existing.status = Some(AttendanceStatus::Absent);
        existing.total_attendance = 5;
        let store = MemoryStore::with_records([existing]);

        let mut edit = form("S1", "", "Maths");
        edit.status = Some(AttendanceStatus::Excused);
        let r = update_student(&store, &edit, now()).await.unwrap();

        assert_eq!(r.name, "Ada");
        assert_eq!(r.branch, "Maths");
        assert_eq!(r.status, Some(AttendanceStatus::Excused));
        assert_eq!(r.total_attendance, 5);
        assert_eq!(r.last_attendance_time, "2024-03-04 08:30:00");
        assert_eq!(store.get("S1").await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn test_update_missing_record_creates_it() {
        let store = MemoryStore::new();
        let r = update_student(&store, &form("S7", "Linus", ""), now()).await.unwrap();
        assert_eq!(r.name, "Linus");
        assert_eq!(r.branch, "");
        assert!(store.get("S7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryStore::with_records([StudentRecord::new("S1", "Ada", "CS")]);
        assert!(delete_student(&store, "S1").await.unwrap());
        assert!(!delete_student(&store, "S1").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(
            delete_student(&store, " ").await,
            Err(ManageError::Missing("student id"))
        ));
    }
}
