mod discover;
mod ingest;
mod sync;
mod verify;

pub use discover::{discover, discover_documents};
pub use ingest::{ingest, ingest_files};
pub use sync::{synchronize, sync_objects, SyncReport};
pub use verify::{verify, verify_summary};

use common::error::AppError;
use state_machines::core::GuardError;

use super::state::IngestionMachine;

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}

type StageResult<S> = Result<IngestionMachine<(), S>, AppError>;
