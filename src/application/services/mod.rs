pub mod connectivity_monitor;
pub mod mention_resolver;
pub mod offline_session;
pub mod operation_queue;
pub mod read_cache;
pub mod realtime_merge;
pub mod retry_policy;
pub mod sync_engine;

pub use connectivity_monitor::ConnectivityMonitor;
pub use mention_resolver::{extract_handles, LookupOutcome, MentionLookup, MentionResolver};
pub use offline_session::{OfflineSession, SessionCollaborators};
pub use operation_queue::{EnqueueOutcome, OperationQueue};
pub use read_cache::{CachePage, ReadCache};
pub use realtime_merge::{RealtimeMerger, ViewHandle, ViewUpdate};
pub use retry_policy::RetryPolicy;
pub use sync_engine::{Confirmation, DrainReport, SyncEngine, SyncStatus};
