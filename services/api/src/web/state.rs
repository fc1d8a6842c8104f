//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use schedule_core::domain::{Class, ClassType, Subject, Task, Teacher, TimeBlock};
use schedule_core::ports::{CatalogStore, RecordStore, ScheduleStore, UserStore};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserStore>,
    pub schedule: Arc<dyn ScheduleStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub subjects: Arc<dyn RecordStore<Subject>>,
    pub teachers: Arc<dyn RecordStore<Teacher>>,
    pub class_types: Arc<dyn RecordStore<ClassType>>,
    pub classes: Arc<dyn RecordStore<Class>>,
    pub time_blocks: Arc<dyn RecordStore<TimeBlock>>,
    pub tasks: Arc<dyn RecordStore<Task>>,
}

impl AppState {
    /// Wires every port to the same backing store.
    pub fn new<S>(config: Arc<Config>, store: Arc<S>) -> Self
    where
        S: UserStore
            + ScheduleStore
            + CatalogStore
            + RecordStore<Subject>
            + RecordStore<Teacher>
            + RecordStore<ClassType>
            + RecordStore<Class>
            + RecordStore<TimeBlock>
            + RecordStore<Task>
            + 'static,
    {
        Self {
            config,
            users: store.clone(),
            schedule: store.clone(),
            catalog: store.clone(),
            subjects: store.clone(),
            teachers: store.clone(),
            class_types: store.clone(),
            classes: store.clone(),
            time_blocks: store.clone(),
            tasks: store,
        }
    }
}
