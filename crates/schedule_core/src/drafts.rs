//! crates/schedule_core/src/drafts.rs
//!
//! Client-supplied input for new records. A draft is validated and stamped with
//! an owner, id and creation time when it becomes a record.

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{
    Class, ClassType, Priority, Record, Subject, Task, Teacher, TimeBlock, WeekdayMask,
};

const MAX_TITLE_CHARS: usize = 100;
const DEFAULT_COLOR: &str = "000000";

/// Reasons a draft cannot become a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be blank")]
    Blank(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("color must be six hex digits, got '{0}'")]
    InvalidColor(String),
    #[error("weekday must be between 1 (Monday) and 7 (Sunday), got {0}")]
    InvalidWeekday(u8),
    #[error("days_of_week must name at least one day when present")]
    EmptyWeekdayMask,
    #[error("recurrence interval must be a positive number of days, got {0}")]
    InvalidRecurrence(i32),
    #[error("time_start must be before time_end")]
    InvertedTimes,
    #[error("end_date must not be before start_date")]
    InvertedDates,
}

/// A draft that can be turned into a stored record for `owner`.
pub trait Draft {
    type Record;

    fn into_record(self, owner: Uuid) -> Result<Self::Record, ValidationError>;

    /// Validates the draft as a full replacement for `current`, which keeps its
    /// id, owner and creation time.
    fn into_revision(self, current: &Self::Record) -> Result<Self::Record, ValidationError>
    where
        Self: Sized,
        Self::Record: Record,
    {
        let mut record = self.into_record(current.owner())?;
        record.adopt(current);
        Ok(record)
    }
}

fn required_title(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Blank(field));
    }
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_TITLE_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_true() -> bool {
    true
}

//=========================================================================================
// Reference Entities
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct SubjectDraft {
    pub title: String,
    #[serde(default = "default_color")]
    pub color: String,
}

impl SubjectDraft {
    /// Normalized title used as the natural key.
    pub fn key(&self) -> Result<String, ValidationError> {
        required_title("title", &self.title)
    }
}

impl Draft for SubjectDraft {
    type Record = Subject;

    fn into_record(self, owner: Uuid) -> Result<Subject, ValidationError> {
        let title = self.key()?;
        let color = self.color.trim().trim_start_matches('#').to_ascii_lowercase();
        if color.len() != 6 || !color.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidColor(self.color));
        }
        Ok(Subject {
            id: Uuid::new_v4(),
            owner,
            title,
            color,
            created: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct TeacherDraft {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

impl TeacherDraft {
    pub fn key(&self) -> Result<String, ValidationError> {
        required_title("name", &self.name)
    }
}

impl Draft for TeacherDraft {
    type Record = Teacher;

    fn into_record(self, owner: Uuid) -> Result<Teacher, ValidationError> {
        Ok(Teacher {
            id: Uuid::new_v4(),
            owner,
            name: self.key()?,
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
            created: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct ClassTypeDraft {
    pub title: String,
    #[serde(default = "default_true")]
    pub is_custom: bool,
}

impl ClassTypeDraft {
    pub fn key(&self) -> Result<String, ValidationError> {
        required_title("title", &self.title)
    }
}

impl Draft for ClassTypeDraft {
    type Record = ClassType;

    fn into_record(self, owner: Uuid) -> Result<ClassType, ValidationError> {
        Ok(ClassType {
            id: Uuid::new_v4(),
            owner,
            title: self.key()?,
            is_custom: self.is_custom,
            created: Utc::now(),
        })
    }
}

//=========================================================================================
// Classes
//=========================================================================================

/// A class described by its reference data rather than by ids; the referenced
/// subject, type and teacher are resolved by natural key when it is stored.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct ClassDraft {
    pub subject: SubjectDraft,
    #[serde(default, rename = "type")]
    pub class_type: Option<ClassTypeDraft>,
    #[serde(default)]
    pub teacher: Option<TeacherDraft>,
    #[serde(default)]
    pub location: String,
}

impl ClassDraft {
    /// Validates every nested draft before anything is written.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.subject.clone().into_record(Uuid::nil())?;
        if let Some(class_type) = &self.class_type {
            class_type.key()?;
        }
        if let Some(teacher) = &self.teacher {
            teacher.key()?;
        }
        Ok(())
    }

    /// Builds the class once its references have been resolved.
    pub fn into_class(
        self,
        owner: Uuid,
        subject: &Subject,
        class_type: Option<&ClassType>,
        teacher: Option<&Teacher>,
    ) -> Class {
        Class {
            id: Uuid::new_v4(),
            owner,
            subject_id: subject.id,
            class_type_id: class_type.map(|t| t.id),
            teacher_id: teacher.map(|t| t.id),
            location: self.location.trim().to_string(),
            created: Utc::now(),
        }
    }
}

//=========================================================================================
// Time Blocks and Tasks
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct TimeBlockDraft {
    pub class_id: Uuid,
    #[serde(default)]
    pub recurrence_interval: Option<i32>,
    #[serde(default)]
    #[schema(value_type = Option<Vec<u8>>)]
    pub days_of_week: Option<WeekdayMask>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[schema(value_type = String, example = "10:00:00")]
    pub time_start: NaiveTime,
    #[schema(value_type = String, example = "11:30:00")]
    pub time_end: NaiveTime,
}

impl Draft for TimeBlockDraft {
    type Record = TimeBlock;

    fn into_record(self, owner: Uuid) -> Result<TimeBlock, ValidationError> {
        if let Some(interval) = self.recurrence_interval {
            if interval <= 0 {
                return Err(ValidationError::InvalidRecurrence(interval));
            }
        }
        if self.days_of_week.is_some_and(WeekdayMask::is_empty) {
            return Err(ValidationError::EmptyWeekdayMask);
        }
        if self.time_start >= self.time_end {
            return Err(ValidationError::InvertedTimes);
        }
        if self.end_date.is_some_and(|end| end < self.start_date) {
            return Err(ValidationError::InvertedDates);
        }
        Ok(TimeBlock {
            id: Uuid::new_v4(),
            owner,
            class_id: self.class_id,
            recurrence_interval: self.recurrence_interval,
            days_of_week: self.days_of_week,
            start_date: self.start_date,
            end_date: self.end_date,
            time_start: self.time_start,
            time_end: self.time_end,
            created: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub class_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl Draft for TaskDraft {
    type Record = Task;

    fn into_record(self, owner: Uuid) -> Result<Task, ValidationError> {
        let now = Utc::now();
        Ok(Task {
            id: Uuid::new_v4(),
            owner,
            title: required_title("title", &self.title)?,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            priority: self.priority,
            is_completed: self.is_completed,
            class_id: self.class_id,
            due_date: self.due_date,
            completed_at: self.is_completed.then_some(now),
            created: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn time_block_draft() -> TimeBlockDraft {
        TimeBlockDraft {
            class_id: Uuid::new_v4(),
            recurrence_interval: Some(14),
            days_of_week: Some(WeekdayMask::try_from(vec![1, 2, 3]).unwrap()),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2020, 12, 31),
            time_start: time(10, 0),
            time_end: time(12, 0),
        }
    }

    #[test]
    fn subject_draft_normalizes_title_and_color() {
        let draft = SubjectDraft {
            title: "  Algebra ".to_string(),
            color: "#A0B1C2".to_string(),
        };
        let owner = Uuid::new_v4();
        let subject = draft.into_record(owner).unwrap();
        assert_eq!(subject.title, "Algebra");
        assert_eq!(subject.color, "a0b1c2");
        assert_eq!(subject.owner, owner);
    }

    #[test]
    fn subject_draft_rejects_bad_input() {
        let blank = SubjectDraft {
            title: "   ".to_string(),
            color: default_color(),
        };
        assert_eq!(
            blank.into_record(Uuid::new_v4()),
            Err(ValidationError::Blank("title"))
        );

        let bad_color = SubjectDraft {
            title: "Physics".to_string(),
            color: "blue".to_string(),
        };
        assert!(matches!(
            bad_color.into_record(Uuid::new_v4()),
            Err(ValidationError::InvalidColor(_))
        ));
    }

    #[test]
    fn time_block_draft_requires_positive_interval() {
        for interval in [0, -7] {
            let draft = TimeBlockDraft {
                recurrence_interval: Some(interval),
                ..time_block_draft()
            };
            assert_eq!(
                draft.into_record(Uuid::new_v4()),
                Err(ValidationError::InvalidRecurrence(interval))
            );
        }
        assert!(time_block_draft().into_record(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn time_block_draft_checks_ordering_and_mask() {
        let inverted = TimeBlockDraft {
            time_start: time(12, 0),
            time_end: time(10, 0),
            ..time_block_draft()
        };
        assert_eq!(
            inverted.into_record(Uuid::new_v4()),
            Err(ValidationError::InvertedTimes)
        );

        let empty_mask = TimeBlockDraft {
            days_of_week: Some(WeekdayMask::try_from(Vec::new()).unwrap()),
            ..time_block_draft()
        };
        assert_eq!(
            empty_mask.into_record(Uuid::new_v4()),
            Err(ValidationError::EmptyWeekdayMask)
        );

        let ends_early = TimeBlockDraft {
            end_date: NaiveDate::from_ymd_opt(2019, 12, 31),
            ..time_block_draft()
        };
        assert_eq!(
            ends_early.into_record(Uuid::new_v4()),
            Err(ValidationError::InvertedDates)
        );
    }

    #[test]
    fn class_draft_reads_nested_reference_data() {
        let draft: ClassDraft = serde_json::from_str(
            r#"{
                "subject": {"title": "Chemistry", "color": "00ff00"},
                "type": {"title": "Lab"},
                "teacher": {"name": "Dr. Reyes", "email": "reyes@example.com"},
                "location": "Room 12"
            }"#,
        )
        .unwrap();

        assert!(draft.validate().is_ok());
        let class_type = draft.class_type.as_ref().unwrap();
        assert!(class_type.is_custom);
        assert_eq!(draft.teacher.as_ref().unwrap().phone, "");
    }

    fn task_draft(is_completed: bool) -> TaskDraft {
        TaskDraft {
            title: "Lab report".to_string(),
            description: None,
            priority: Priority::Medium,
            is_completed,
            class_id: None,
            due_date: NaiveDate::from_ymd_opt(2020, 3, 1),
        }
    }

    #[test]
    fn revision_keeps_identity() {
        let owner = Uuid::new_v4();
        let current = time_block_draft().into_record(owner).unwrap();
        let revised = TimeBlockDraft {
            recurrence_interval: Some(7),
            ..time_block_draft()
        }
        .into_revision(&current)
        .unwrap();

        assert_eq!(revised.id, current.id);
        assert_eq!(revised.owner, owner);
        assert_eq!(revised.created, current.created);
        assert_eq!(revised.recurrence_interval, Some(7));
    }

    #[test]
    fn revision_is_validated() {
        let current = time_block_draft().into_record(Uuid::new_v4()).unwrap();
        let revised = TimeBlockDraft {
            recurrence_interval: Some(0),
            ..time_block_draft()
        }
        .into_revision(&current);
        assert_eq!(revised, Err(ValidationError::InvalidRecurrence(0)));
    }

    #[test]
    fn completing_a_task_stamps_it_once() {
        let open = task_draft(false).into_record(Uuid::new_v4()).unwrap();
        assert_eq!(open.completed_at, None);

        let done = task_draft(true).into_revision(&open).unwrap();
        assert!(done.is_completed);
        let stamped = done.completed_at.expect("completion time");

        let still_done = task_draft(true).into_revision(&done).unwrap();
        assert_eq!(still_done.completed_at, Some(stamped));

        let reopened = task_draft(false).into_revision(&still_done).unwrap();
        assert_eq!(reopened.completed_at, None);
        assert_eq!(reopened.id, open.id);
    }

    #[test]
    fn completed_task_is_stamped() {
        let draft = TaskDraft {
            title: "Essay".to_string(),
            description: Some("   ".to_string()),
            priority: Priority::High,
            is_completed: true,
            class_id: None,
            due_date: None,
        };
        let task = draft.into_record(Uuid::new_v4()).unwrap();
        assert!(task.completed_at.is_some());
        assert_eq!(task.description, None);
    }
}
