//! rollcall-store: student records and where they live.
//!
//! [`StudentStore`] is the seam between the attendance logic and the
//! database. [`FirebaseStore`] talks to a Firebase Realtime Database over
//! REST; [`MemoryStore`] keeps records in process for tests and dry runs.

pub mod config;
pub mod credentials;
mod error;
pub mod export;
pub mod firebase;
pub mod manage;
pub mod record;
pub mod store;

pub use config::{ConfigError, ConfigFile, DatabaseConfig};
pub use error::StoreError;
pub use export::{export_records, ExportError, ExportFormat};
pub use firebase::FirebaseStore;
pub use manage::{add_student, delete_student, update_student, ManageError, StudentForm};
pub use record::{validate_key, AttendanceStatus, AttendanceUpdate, StudentRecord};
pub use store::{MemoryStore, StudentStore};
