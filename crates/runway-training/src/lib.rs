//! Runway Training
//!
//! Framework-agnostic run bookkeeping for training jobs:
//! - Identifying a run (`RunIdentity`)
//! - Resolving log/checkpoint directories and resume state (`LayoutResolver`)
//! - Reading and writing the run configuration snapshot (`RunConfig`)
//! - Computing a value once per process group and sharing it (`Broadcast`)

pub mod coordination;
pub mod error;
pub mod identity;
pub mod layout;
pub mod snapshot;

pub use coordination::{Broadcast, LocalGroup, LocalGroupMember, RankInfo, SingleProcess};
pub use error::{LayoutError, LayoutResult};
pub use identity::{RunIdentity, DEFAULT_BASE_DIR, DEFAULT_NAME, DEFAULT_VERSION};
pub use layout::{
    LayoutProbe, LayoutResolver, LocalFs, PreviousAttempt, ResolvedLayout, ResolverOptions, BEST_CHECKPOINT_STEM,
    LAST_CHECKPOINT,
};
pub use snapshot::{read_checkpoint_root, write_snapshot, RunConfig, SNAPSHOT_FILE};
