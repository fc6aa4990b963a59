//! Marks recognized students present, at most once per session.

use chrono::{Local, NaiveDateTime};
use rollcall_store::{AttendanceUpdate, StoreError, StudentStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// What happened for one recognition.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Record patched present; carries the new total.
    Marked { total_attendance: u32 },
    /// Already handled this session. No database access.
    Debounced,
    /// Marked elsewhere within the cooldown window. No write.
    RecentlyMarked,
    /// No record under this identity. No write.
    MissingRecord,
}

pub struct AttendanceUpdater<S: StudentStore + ?Sized> {
    store: Arc<S>,
    session: Uuid,
    cooldown: Duration,
    handled: HashSet<String>,
    missing: HashSet<String>,
}

impl<S: StudentStore + ?Sized> AttendanceUpdater<S> {
    pub fn new(store: Arc<S>, cooldown: Duration) -> Self {
        Self {
            store,
            session: Uuid::new_v4(),
            cooldown,
            handled: HashSet::new(),
            missing: HashSet::new(),
        }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Number of identities handled so far this session.
    pub fn handled(&self) -> usize {
        self.handled.len()
    }

    /// Handle a recognition at local time.
    pub async fn record(&mut self, identity: &str) -> Result<Outcome, StoreError> {
        self.record_at(identity, Local::now().naive_local()).await
    }

    /// Handle a recognition at `now`.
    ///
    /// Store errors propagate and leave the identity unhandled.
    pub async fn record_at(&mut self, identity: &str, now: NaiveDateTime) -> Result<Outcome, StoreError> {
        if self.handled.contains(identity) {
            return Ok(Outcome::Debounced);
        }

        let Some(record) = self.store.get(identity).await? else {
            if self.missing.insert(identity.to_string()) {
                tracing::warn!(session = %self.session, %identity, "no record found for recognized student");
            }
            return Ok(Outcome::MissingRecord);
        };

        if let Some(last) = record.last_marked() {
            let elapsed = now.signed_duration_since(last);
            let within = elapsed
                .to_std()
                .map(|e| e <= self.cooldown)
                // A timestamp in the future counts as recent.
                .unwrap_or(true);
            if within {
                tracing::info!(
                    session = %self.session,
                    %identity,
                    last = %record.last_attendance_time,
                    "already marked recently"
                );
                self.handled.insert(identity.to_string());
                return Ok(Outcome::RecentlyMarked);
            }
        }

        let update = AttendanceUpdate::present(&record, now);
        self.store.update_attendance(identity, &update).await?;
        tracing::info!(
            session = %self.session,
            %identity,
            name = %record.name,
            total = update.total_attendance,
            "attendance marked"
        );

        self.handled.insert(identity.to_string());
        self.missing.remove(identity);
        Ok(Outcome::Marked {
            total_attendance: update.total_attendance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{cache_s1_s2, frame_showing, MarkerEncoder};
    use crate::engine::process_frame;
    use chrono::NaiveDate;
    use rollcall_core::NearestMatcher;
    use rollcall_store::{AttendanceStatus, MemoryStore, StudentRecord};

    const COOLDOWN: Duration = Duration::from_secs(30);

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn student(id: &str, total: u32, last: &str) -> StudentRecord {
        let mut r = StudentRecord::new(id, format!("Student {id}"), "CS");
        r.total_attendance = total;
        r.last_attendance_time = last.to_string();
        r
    }

    #[tokio::test]
    async fn test_marks_once_per_session() {
        let store = Arc::new(MemoryStore::with_records([student("S1", 2, "N/A")]));
        let mut updater = AttendanceUpdater::new(store.clone(), COOLDOWN);

        let first = updater.record_at("S1", at(9, 0, 0)).await.unwrap();
        assert_eq!(first, Outcome::Marked { total_attendance: 3 });
        // Well past the cooldown, still the same session.
        let second = updater.record_at("S1", at(11, 0, 0)).await.unwrap();
        assert_eq!(second, Outcome::Debounced);

        assert_eq!(store.write_count(), 1);
        let r = store.get("S1").await.unwrap().unwrap();
        assert_eq!(r.status, Some(AttendanceStatus::Present));
        assert_eq!(r.total_attendance, 3);
        assert_eq!(r.last_attendance_time, "2024-03-04 09:00:00");
    }

    #[tokio::test]
    async fn test_recent_mark_is_not_repeated() {
        let store = Arc::new(MemoryStore::with_records([student("S1", 5, "2024-03-04 08:59:50")]));
        let mut updater = AttendanceUpdater::new(store.clone(), COOLDOWN);

        assert_eq!(updater.record_at("S1", at(9, 0, 0)).await.unwrap(), Outcome::RecentlyMarked);
        assert_eq!(updater.record_at("S1", at(9, 5, 0)).await.unwrap(), Outcome::Debounced);
        assert_eq!(store.write_count(), 0);
        assert_eq!(updater.handled(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_boundary() {
        let store = Arc::new(MemoryStore::with_records([
            student("S1", 0, "2024-03-04 08:59:30"),
            student("S2", 0, "2024-03-04 08:59:29"),
            student("S3", 0, "2024-03-04 09:00:10"),
        ]));
        let mut updater = AttendanceUpdater::new(store.clone(), COOLDOWN);
        let now = at(9, 0, 0);

        assert_eq!(updater.record_at("S1", now).await.unwrap(), Outcome::RecentlyMarked);
        assert_eq!(updater.record_at("S2", now).await.unwrap(), Outcome::Marked { total_attendance: 1 });
        assert_eq!(updater.record_at("S3", now).await.unwrap(), Outcome::RecentlyMarked);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_written() {
        let store = Arc::new(MemoryStore::new());
        let mut updater = AttendanceUpdater::new(store.clone(), COOLDOWN);

        assert_eq!(updater.record_at("S9", at(9, 0, 0)).await.unwrap(), Outcome::MissingRecord);
        assert_eq!(updater.record_at("S9", at(9, 0, 1)).await.unwrap(), Outcome::MissingRecord);
        assert_eq!(store.write_count(), 0);
        assert!(store.get("S9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recognized_frame_marks_present_once() {
        let store = Arc::new(MemoryStore::with_records([student("S1", 0, "N/A"), student("S2", 4, "N/A")]));
        let mut updater = AttendanceUpdater::new(store.clone(), COOLDOWN);
        let cache = cache_s1_s2();
        let matcher = NearestMatcher::default();

        for seq in 0..3 {
            let recognized = process_frame(&mut MarkerEncoder, &cache, &matcher, &frame_showing(1, seq)).unwrap();
            assert_eq!(recognized.len(), 1);
            assert_eq!(recognized[0].identity, "S1");
            updater.record_at(&recognized[0].identity, at(9, 0, seq)).await.unwrap();
        }

        assert_eq!(store.write_count(), 1);
        let s1 = store.get("S1").await.unwrap().unwrap();
        assert_eq!(s1.status, Some(AttendanceStatus::Present));
        assert_eq!(s1.total_attendance, 1);
        let s2 = store.get("S2").await.unwrap().unwrap();
        assert_eq!(s2.status, None);
        assert_eq!(s2.total_attendance, 4);
    }
}
