mod config;
mod engine;
mod error;
pub mod ingest;
mod memory;
mod model;
pub mod recompute;
pub mod replay;
mod repository;
mod round;
mod store;
pub mod window;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::{ConfigError, IngestError, StoreError, StoreResult, WindowError};
pub use ingest::{DistanceInput, IngestReceipt, RefuelingInput};
pub use memory::{MemoryRepository, DEFAULT_BATCH_LIMIT};
pub use model::{
    BatchUpdate, EventEdit, EventId, EventKind, EventPatch, EventRecord, StoredEvent, Vehicle,
    VehicleId, VehicleUpdate,
};
pub use recompute::AggregateSummary;
pub use replay::{ReconcileStage, Reconciliation, ReplayReport};
pub use repository::{chronological, EventRepository};
pub use round::round2;
pub use store::{FileRepository, FileRepositoryBuilder, DEFAULT_CHECKPOINT_EVERY};
pub use window::{
    Consumption, MonthWindow, WindowRequest, WindowStats, WindowTotals, YearOverview,
};
