use crate::health::EvaluationParameters;
use crate::scheduler::ScheduleStore;
use crate::storage::{Pool, SqliteHistory};

#[derive(Clone)]
pub struct AppState {
    pub schedules: ScheduleStore,
    pub history: SqliteHistory,
    /// Defaults for requests that omit `limit` / `percentageFromAverage`.
    pub evaluation: EvaluationParameters,
}

impl AppState {
    pub fn new(pool: Pool, evaluation: EvaluationParameters) -> Self {
        Self {
            schedules: ScheduleStore::new(pool.clone()),
            history: SqliteHistory::new(pool),
            evaluation,
        }
    }
}
