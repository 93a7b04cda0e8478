mod controller;
mod store;

pub use controller::{SyncController, SyncError, SyncOptions, SyncState};
pub use store::{CategorizedListing, ClientStateStore};
