pub mod config;
pub mod error;
pub mod model;
pub mod repository;
pub mod scanner;
pub mod scheduler;

pub use config::AppConfig;
pub use error::{Error, RepoError, ScanError};
pub use model::{FileRecord, Snapshot};
pub use repository::{open_repository, Flavor, Repository};
pub use scheduler::{CycleOutcome, Scheduler, SchedulerState, SchedulerStats};
