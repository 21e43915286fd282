pub mod auth;
pub mod dom_regions;
pub mod identity_service;
pub mod region_merge;

pub use identity_service::{BrowserIdentityProvider, IdentityManager, IdentityProvider};
pub use region_merge::{full_text, merge_regions, MergeThresholds};
