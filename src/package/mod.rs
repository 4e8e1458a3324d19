//! Installed package discovery
//!
//! This module provides the on-disk view of a project's module store:
//! package records, manifests, store enumeration and version ordering.

mod discovery;
mod manifest;
mod record;
mod version;

pub use discovery::StoreWalker;
pub use manifest::Manifest;
pub use record::PackageRecord;
pub use version::VersionComparator;
