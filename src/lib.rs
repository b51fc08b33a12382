pub mod backup;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod dispatch;
pub mod events;
pub mod fetch;
pub mod health;
pub mod normalize;
pub mod retry;
pub mod session;
pub mod sources;
pub mod utils;

pub use backup::BackupWriter;
pub use cache::{CacheEntry, EventCache};
pub use config::{Credential, HarvestConfig, HarvestConfigBuilder};
pub use coordinator::{RunCoordinator, RunStatus, RunSummary};
pub use dedup::{deduplicate, similarity};
pub use dispatch::{
    CancelFlag, Dispatcher, DomainHealthBoard, HarvestError, RunResult, SourceOutcome,
    SourcePipeline, SourceReport, SourceStage,
};
pub use events::{Event, EventDraft, SourceRef, Venue};
pub use fetch::{
    Fetch, FetchError, FetchErrorKind, FetcherChoice, HttpFetcher, RawContent, SessionFetcher,
    StructuralProbe, choose_fetcher,
};
pub use health::{HealthChecker, HealthStatus};
pub use normalize::Normalizer;
pub use retry::{RetryPolicy, RetryReport};
pub use session::{SessionGuard, SessionManager};
pub use sources::{FetchMethod, Source, SourceKind, load_sources, select_active};
