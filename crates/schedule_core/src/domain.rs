//! crates/schedule_core/src/domain.rs
//!
//! Defines the core data structures of the schedule: the user-owned reference
//! entities, classes and their recurring time blocks, tasks, and the assembled
//! schedule item handed back to callers.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::drafts::ValidationError;

//=========================================================================================
// Ownership and Access Scope
//=========================================================================================

/// Common view over every user-owned record.
pub trait Record {
    /// Human-readable kind, used in error messages and logs.
    const KIND: &'static str;

    fn id(&self) -> Uuid;
    fn owner(&self) -> Uuid;

    /// Takes over the identity of the record this one replaces.
    fn adopt(&mut self, previous: &Self);

    /// The field that must be unique per owner, if the record has one.
    fn natural_key(&self) -> Option<&str> {
        None
    }
}

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub is_staff: bool,
}

impl Caller {
    /// The visibility scope for list and retrieve operations.
    pub fn scope(&self) -> Scope {
        if self.is_staff {
            Scope::All
        } else {
            Scope::Owner(self.user_id)
        }
    }

    pub fn can_view_user(&self, user_id: Uuid) -> bool {
        self.is_staff || self.user_id == user_id
    }
}

/// Which owners' records a query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Owner(Uuid),
}

impl Scope {
    /// The owner to filter by, or `None` when every owner is visible.
    pub fn owner_filter(self) -> Option<Uuid> {
        match self {
            Scope::All => None,
            Scope::Owner(owner) => Some(owner),
        }
    }

    pub fn permits(self, owner: Uuid) -> bool {
        self.owner_filter().map_or(true, |scoped| scoped == owner)
    }
}

//=========================================================================================
// Users
//=========================================================================================

/// A registered user, as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub is_staff: bool,
    pub created: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub hashed_password: String,
    pub is_staff: bool,
}

//=========================================================================================
// Reference Entities
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Subject {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    /// Six hex digits, without a leading `#`.
    pub color: String,
    pub created: DateTime<Utc>,
}

impl Record for Subject {
    const KIND: &'static str = "subject";

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner(&self) -> Uuid {
        self.owner
    }
    fn adopt(&mut self, previous: &Self) {
        self.id = previous.id;
        self.owner = previous.owner;
        self.created = previous.created;
    }
    fn natural_key(&self) -> Option<&str> {
        Some(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Teacher {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub created: DateTime<Utc>,
}

impl Record for Teacher {
    const KIND: &'static str = "teacher";

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner(&self) -> Uuid {
        self.owner
    }
    fn adopt(&mut self, previous: &Self) {
        self.id = previous.id;
        self.owner = previous.owner;
        self.created = previous.created;
    }
    fn natural_key(&self) -> Option<&str> {
        Some(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassType {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    pub is_custom: bool,
    pub created: DateTime<Utc>,
}

impl Record for ClassType {
    const KIND: &'static str = "class type";

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner(&self) -> Uuid {
        self.owner
    }
    fn adopt(&mut self, previous: &Self) {
        self.id = previous.id;
        self.owner = previous.owner;
        self.created = previous.created;
    }
    fn natural_key(&self) -> Option<&str> {
        Some(&self.title)
    }
}

//=========================================================================================
// Classes and Time Blocks
//=========================================================================================

/// Groups a subject with its optional type and teacher at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Class {
    pub id: Uuid,
    pub owner: Uuid,
    pub subject_id: Uuid,
    pub class_type_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub location: String,
    pub created: DateTime<Utc>,
}

impl Record for Class {
    const KIND: &'static str = "class";

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner(&self) -> Uuid {
        self.owner
    }
    fn adopt(&mut self, previous: &Self) {
        self.id = previous.id;
        self.owner = previous.owner;
        self.created = previous.created;
    }
}

/// A set of weekdays, stored as one bit per day (Monday is bit 0).
///
/// On the wire the mask is a sorted list of ISO weekday numbers, Monday = 1
/// through Sunday = 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    const ALL_DAYS: u8 = 0b0111_1111;

    /// Builds a mask from its stored bit representation.
    pub fn from_bits(bits: u8) -> Option<Self> {
        ((bits & !Self::ALL_DAYS) == 0).then_some(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// The single-day mask bit for `day`.
    pub fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// ISO weekday numbers in ascending order.
    pub fn iso_days(self) -> Vec<u8> {
        (0..7u8)
            .filter(|index| self.0 & (1 << index) != 0)
            .map(|index| index + 1)
            .collect()
    }
}

impl FromIterator<Weekday> for WeekdayMask {
    fn from_iter<I: IntoIterator<Item = Weekday>>(days: I) -> Self {
        Self(days.into_iter().fold(0, |bits, day| bits | Self::bit(day)))
    }
}

impl TryFrom<Vec<u8>> for WeekdayMask {
    type Error = ValidationError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        days.into_iter().try_fold(Self(0), |mask, day| match day {
            1..=7 => Ok(Self(mask.0 | 1 << (day - 1))),
            other => Err(ValidationError::InvalidWeekday(other)),
        })
    }
}

impl From<WeekdayMask> for Vec<u8> {
    fn from(mask: WeekdayMask) -> Self {
        mask.iso_days()
    }
}

/// A recurring (or one-off) slot in which a class takes place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeBlock {
    pub id: Uuid,
    pub owner: Uuid,
    pub class_id: Uuid,
    /// Days between occurrences; `None` for a one-time event on `start_date`.
    pub recurrence_interval: Option<i32>,
    #[schema(value_type = Option<Vec<u8>>)]
    pub days_of_week: Option<WeekdayMask>,
    pub start_date: NaiveDate,
    /// Last day the block is valid; `None` means open-ended.
    pub end_date: Option<NaiveDate>,
    #[schema(value_type = String, example = "10:00:00")]
    pub time_start: NaiveTime,
    #[schema(value_type = String, example = "11:30:00")]
    pub time_end: NaiveTime,
    pub created: DateTime<Utc>,
}

impl TimeBlock {
    /// The cheap, over-inclusive pre-filter: validity window and weekday mask.
    ///
    /// A block passing this check may still not occur on `date`; exact
    /// refinement is done by [`crate::occurrence::is_occurrence`].
    pub fn within_coarse_bounds(&self, date: NaiveDate) -> bool {
        self.start_date <= date
            && self.end_date.map_or(true, |end| end >= date)
            && self
                .days_of_week
                .map_or(true, |mask| mask.contains(date.weekday()))
    }
}

impl Record for TimeBlock {
    const KIND: &'static str = "time block";

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner(&self) -> Uuid {
        self.owner
    }
    fn adopt(&mut self, previous: &Self) {
        self.id = previous.id;
        self.owner = previous.owner;
        self.created = previous.created;
    }
}

//=========================================================================================
// Tasks
//=========================================================================================

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_i16(self) -> i16 {
        match self {
            Priority::None => 0,
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Priority::None),
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub is_completed: bool,
    pub class_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl Task {
    /// Agenda ordering: latest due date first (undated last), then higher
    /// priority, then creation order.
    pub fn agenda_order(a: &Task, b: &Task) -> Ordering {
        let by_due = match (a.due_date, b.due_date) {
            (Some(left), Some(right)) => right.cmp(&left),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_due
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.created.cmp(&b.created))
    }
}

impl Record for Task {
    const KIND: &'static str = "task";

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner(&self) -> Uuid {
        self.owner
    }
    /// A task that was already complete keeps its original completion time.
    fn adopt(&mut self, previous: &Self) {
        self.id = previous.id;
        self.owner = previous.owner;
        self.created = previous.created;
        if self.is_completed && previous.is_completed {
            self.completed_at = previous.completed_at;
        }
    }
}

//=========================================================================================
// Assembled Schedule
//=========================================================================================

/// One class occurrence on the viewed date, joined with its reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleItem {
    pub class_id: Uuid,
    pub subject: Subject,
    pub class_type: Option<ClassType>,
    pub teacher: Option<Teacher>,
    pub location: String,
    pub owner: Uuid,
    /// Creation time of the class.
    pub created: DateTime<Utc>,
    #[schema(value_type = String, example = "10:00:00")]
    pub time_start: NaiveTime,
    #[schema(value_type = String, example = "11:30:00")]
    pub time_end: NaiveTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn block(mask: Option<WeekdayMask>, end: Option<NaiveDate>) -> TimeBlock {
        TimeBlock {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            recurrence_interval: Some(7),
            days_of_week: mask,
            start_date: date(2020, 1, 1),
            end_date: end,
            time_start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            time_end: NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            created: Utc::now(),
        }
    }

    #[test]
    fn weekday_mask_serializes_as_iso_numbers() {
        let mask: WeekdayMask = [Weekday::Wed, Weekday::Mon].into_iter().collect();
        assert_eq!(serde_json::to_string(&mask).unwrap(), "[1,3]");

        let parsed: WeekdayMask = serde_json::from_str("[7,2]").unwrap();
        assert!(parsed.contains(Weekday::Sun));
        assert!(parsed.contains(Weekday::Tue));
        assert!(!parsed.contains(Weekday::Mon));
    }

    #[test]
    fn weekday_mask_rejects_out_of_range_days() {
        assert!(serde_json::from_str::<WeekdayMask>("[0]").is_err());
        assert!(serde_json::from_str::<WeekdayMask>("[8]").is_err());
        assert!(WeekdayMask::from_bits(0b1000_0000).is_none());
    }

    #[test]
    fn coarse_bounds_respect_window_and_mask() {
        let mon_tue: WeekdayMask = [Weekday::Mon, Weekday::Tue].into_iter().collect();
        let bounded = block(Some(mon_tue), Some(date(2020, 12, 31)));

        // 2020-01-06 is a Monday.
        assert!(bounded.within_coarse_bounds(date(2020, 1, 6)));
        assert!(!bounded.within_coarse_bounds(date(2020, 1, 8)));
        assert!(!bounded.within_coarse_bounds(date(2019, 12, 30)));
        assert!(!bounded.within_coarse_bounds(date(2021, 1, 4)));

        let open = block(None, None);
        assert!(open.within_coarse_bounds(date(2031, 6, 18)));
    }

    #[test]
    fn scope_filters_by_owner_unless_staff() {
        let owner = Uuid::new_v4();
        let regular = Caller { user_id: owner, is_staff: false };
        let staff = Caller { user_id: Uuid::new_v4(), is_staff: true };

        assert_eq!(regular.scope(), Scope::Owner(owner));
        assert!(!regular.scope().permits(Uuid::new_v4()));
        assert!(staff.scope().permits(owner));
        assert_eq!(staff.scope().owner_filter(), None);
    }

    #[test]
    fn tasks_order_by_due_date_then_priority() {
        let owner = Uuid::new_v4();
        let task = |due: Option<NaiveDate>, priority| Task {
            id: Uuid::new_v4(),
            owner,
            title: "task".to_string(),
            description: None,
            priority,
            is_completed: false,
            class_id: None,
            due_date: due,
            completed_at: None,
            created: Utc::now(),
        };
        let mut tasks = vec![
            task(None, Priority::High),
            task(Some(date(2020, 1, 1)), Priority::Low),
            task(Some(date(2020, 1, 3)), Priority::None),
            task(Some(date(2020, 1, 1)), Priority::High),
        ];
        tasks.sort_by(Task::agenda_order);

        let summary: Vec<_> = tasks.iter().map(|t| (t.due_date, t.priority)).collect();
        assert_eq!(
            summary,
            vec![
                (Some(date(2020, 1, 3)), Priority::None),
                (Some(date(2020, 1, 1)), Priority::High),
                (Some(date(2020, 1, 1)), Priority::Low),
                (None, Priority::High),
            ]
        );
    }
}
