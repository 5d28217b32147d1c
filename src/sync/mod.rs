mod catalog;
mod engine;
mod remote;

pub use catalog::load_catalog;
pub use engine::{push_dirty, sync_once, SyncEngine, SyncEvent, SyncHandle, SyncNotifier, SyncSettings};
pub use remote::{HttpRemoteStore, RemoteStore};
