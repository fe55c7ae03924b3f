pub mod cached_item;
pub mod connectivity;
pub mod pending_operation;
pub mod profile_reference;
pub mod realtime_event;

pub use cached_item::{CachedItem, ItemState};
pub use connectivity::{Connectivity, ConnectivityState, ConnectivityTransition};
pub use pending_operation::PendingOperation;
pub use profile_reference::ProfileReference;
pub use realtime_event::{ConfirmedItem, RealtimeEvent};
