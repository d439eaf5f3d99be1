//! Traits at the seams where the host platform plugs in.

mod location;
mod store;

pub use location::{LocationPermissions, PermissionStatus, TaskScheduler, TrackingOptions};
pub use store::TokenStore;
