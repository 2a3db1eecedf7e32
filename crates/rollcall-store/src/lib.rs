//! rollcall-store — SQLite persistence.
//!
//! Three tables: `students`, `face_encodings` (one embedding per student,
//! packed little-endian f32) and `attendance` (at most one row per student
//! per date, enforced by a uniqueness constraint).

pub mod error;
pub mod models;
pub mod store;

pub use error::StoreError;
pub use models::{
    AttendanceRecord, AttendanceRow, AttendanceStatus, DepartmentSummary, NewStudent, Student,
};
pub use store::Store;
