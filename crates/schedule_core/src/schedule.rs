//! crates/schedule_core/src/schedule.rs
//!
//! Builds the ordered list of classes taking place on a given date.
//!
//! Assembly is a two-stage pipeline: the store returns candidates that pass
//! cheap, indexable bounds, then every candidate is refined with the exact
//! occurrence check before being joined with its class data.

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Class, ClassType, Record, ScheduleItem, Subject, Teacher, TimeBlock};
use crate::error::{ScheduleError, ScheduleResult};
use crate::occurrence::is_occurrence;
use crate::ports::{PortError, ScheduleStore};

const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

/// Parses a viewing date given as `YYYY-MM-DD`.
///
/// The year has exactly four digits and lies in 1..=9999; month and day have
/// one or two digits.
///
/// # Errors
/// Returns `InvalidDate` for non-numeric or wrongly sized components, a wrong
/// number of components, or values that do not form a calendar date.
pub fn parse_viewing_date(raw: &str) -> ScheduleResult<NaiveDate> {
    let invalid = || ScheduleError::InvalidDate(raw.to_string());

    let parts: Vec<&str> = raw.trim().split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return Err(invalid());
    };
    let digits = |part: &str, widths: std::ops::RangeInclusive<usize>| {
        widths.contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
    };
    if !digits(*year, 4..=4) || !digits(*month, 1..=2) || !digits(*day, 1..=2) {
        return Err(invalid());
    }

    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(invalid());
    }
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Keeps the candidates that actually occur on `date`, preserving their order.
///
/// # Errors
/// Propagates `InvalidRecurrence` for a stored block with a non-positive interval.
pub fn select_occurrences(
    date: NaiveDate,
    candidates: Vec<TimeBlock>,
) -> ScheduleResult<Vec<TimeBlock>> {
    candidates
        .into_iter()
        .filter_map(|block| {
            let interval = block.recurrence_interval.map(i64::from);
            match is_occurrence(date, block.start_date, interval) {
                Ok(true) => Some(Ok(block)),
                Ok(false) => None,
                Err(error) => Some(Err(error)),
            }
        })
        .collect()
}

/// Parses `viewing_date` and assembles the schedule of `owner` for that day.
pub async fn build_schedule(
    store: &dyn ScheduleStore,
    owner: Uuid,
    viewing_date: &str,
) -> ScheduleResult<Vec<ScheduleItem>> {
    let date = parse_viewing_date(viewing_date)?;
    assemble_schedule(store, owner, date).await
}

/// Assembles the schedule of `owner` for `date`, ordered by start time.
///
/// Items with equal start times keep the order the store returned them in.
/// An empty result means nothing is scheduled that day.
///
/// # Errors
/// - `DanglingReference` if a surviving block's class or the class's subject,
///   type or teacher is missing.
/// - `InvalidRecurrence` for a stored block with a non-positive interval.
/// - `Port` for any other store failure.
pub async fn assemble_schedule(
    store: &dyn ScheduleStore,
    owner: Uuid,
    date: NaiveDate,
) -> ScheduleResult<Vec<ScheduleItem>> {
    let candidates = store.find_time_blocks(owner, date).await?;
    let candidate_count = candidates.len();
    let occurrences = select_occurrences(date, candidates)?;
    debug!(
        %owner,
        %date,
        candidates = candidate_count,
        occurrences = occurrences.len(),
        "Refined schedule candidates."
    );

    let mut items = Vec::with_capacity(occurrences.len());
    for block in occurrences {
        items.push(join_class(store, block).await?);
    }
    items.sort_by_key(|item| item.time_start);
    Ok(items)
}

async fn join_class(store: &dyn ScheduleStore, block: TimeBlock) -> ScheduleResult<ScheduleItem> {
    let class = store
        .find_class(block.class_id)
        .await
        .map_err(dangling(Class::KIND, block.class_id))?;
    let subject = store
        .find_subject(class.subject_id)
        .await
        .map_err(dangling(Subject::KIND, class.subject_id))?;

    let class_type = match class.class_type_id {
        Some(id) => Some(
            store
                .find_class_type(id)
                .await
                .map_err(dangling(ClassType::KIND, id))?,
        ),
        None => None,
    };
    let teacher = match class.teacher_id {
        Some(id) => Some(
            store
                .find_teacher(id)
                .await
                .map_err(dangling(Teacher::KIND, id))?,
        ),
        None => None,
    };

    Ok(ScheduleItem {
        class_id: class.id,
        subject,
        class_type,
        teacher,
        location: class.location,
        owner: class.owner,
        created: class.created,
        time_start: block.time_start,
        time_end: block.time_end,
    })
}

fn dangling(kind: &'static str, id: Uuid) -> impl FnOnce(PortError) -> ScheduleError {
    move |error| match error {
        PortError::NotFound(_) => ScheduleError::DanglingReference { kind, id },
        other => ScheduleError::Port(other),
    }
}
