//! Package resolution: version constraints to a lock and fetched source trees
mod cache;
mod lock;
mod manifest;
mod package_error;
mod provider;
mod resolver;

pub use cache::{CacheStats, RevisionCache};
pub use lock::{LockedPackage, Lockfile};
pub use manifest::PackageManifest;
pub use package_error::{DependencyConflictError, PackageError, Requirement};
pub use provider::{FilesystemProvider, MemoryProvider, PackageProvider, SourceTree};
pub use resolver::{Resolution, ResolvedPackage, Resolver};
