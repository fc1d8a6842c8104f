//! Core domain logic for the schedule backend: the recurring-event occurrence
//! engine, schedule assembly, and the ports the service layer implements.

pub mod domain;
pub mod drafts;
pub mod error;
pub mod occurrence;
pub mod ports;
pub mod schedule;

pub use domain::{
    Caller, Class, ClassType, Priority, Record, ScheduleItem, Scope, Subject, Task, Teacher,
    TimeBlock, User, UserCredentials, WeekdayMask,
};
pub use drafts::{
    ClassDraft, ClassTypeDraft, Draft, SubjectDraft, TaskDraft, TeacherDraft, TimeBlockDraft,
    ValidationError,
};
pub use error::{ScheduleError, ScheduleResult};
pub use occurrence::{closest_future_occurrence, is_occurrence};
pub use ports::{CatalogStore, PortError, PortResult, RecordStore, ScheduleStore, UserStore};
pub use schedule::{assemble_schedule, build_schedule, parse_viewing_date, select_occurrences};
