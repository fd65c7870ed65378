pub mod clean;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod harvest;
pub mod identity;
pub mod orchestrator;
mod rate_limit;
pub mod source;
pub mod stage;
pub mod urls;
pub mod worker;

pub use clean::{clean_record, validate_record, CleanOptions, ValidationOptions};
pub use dedup::{dedup_key, Deduplicator};
pub use error::{DriverError, FetchError, RemediationHint, RunError, SourceError, StageError};
pub use extract::{extract_field, FieldKind, PageHandle, Platform};
pub use fetch::{HttpFetcher, PageFetcher};
pub use harvest::{EmailHarvester, HarvestReport};
pub use identity::{Identity, IdentityController, IdentityPool, PacingPolicy};
pub use orchestrator::{
    run_collection, spawn_connectivity_monitor, start_run, ConnectivityProbe, RunConfig, RunDeps,
    RunEvent, RunHandle, RunSummary, TcpProbe, TerminationReason,
};
pub use source::{
    CandidatePayload, DirectoryConfig, ElementHandle, HttpDirectoryDriver, ListingDriver,
    ListingSource, PageState, PlacesApiSource, PlacesConfig, RawCandidate, SearchConfig,
    SourceProvider, WebSearchSource,
};
pub use stage::{DirectoryStager, ResourceStager};
pub use worker::{EntryWorker, Outcome, WorkerConfig};
