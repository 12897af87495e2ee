use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use semver::Version;

use super::SourceTree;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
	pub hits: usize,
	pub misses: usize,
}

/// Process-wide cache of fetched revisions, keyed by package name and version.
/// Optionally backed by a directory of JSON files.
#[derive(Debug, Default)]
pub struct RevisionCache {
	memory: Mutex<HashMap<(String, Version), Arc<SourceTree>>>,
	disk: Option<PathBuf>,
	hits: AtomicUsize,
	misses: AtomicUsize,
}

impl RevisionCache {
	/// Memory-only cache
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_disk(dir: impl Into<PathBuf>) -> Self {
		Self {
			disk: Some(dir.into()),
			..Self::default()
		}
	}

	fn file_name(dir: &Path, name: &str, version: &Version) -> PathBuf {
		dir.join(format!("{}.json", sha256::digest(format!("{}@{}", name, version))))
	}

	fn load(&self, name: &str, version: &Version) -> Option<SourceTree> {
		let path = Self::file_name(self.disk.as_ref()?, name, version);
		let text = std::fs::read_to_string(&path).ok()?;
		match serde_json::from_str::<SourceTree>(&text) {
			Ok(tree) if tree.manifest.name == name && &tree.manifest.version == version => Some(tree),
			_ => {
				warn!("Ignoring corrupted cache entry {}", path.display());
				None
			},
		}
	}

	pub fn get(&self, name: &str, version: &Version) -> Option<Arc<SourceTree>> {
		let key = (name.to_string(), version.clone());
		let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
		if let Some(tree) = memory.get(&key) {
			self.hits.fetch_add(1, Ordering::SeqCst);
			return Some(tree.clone());
		}

		match self.load(name, version) {
			Some(tree) => {
				debug!("Loaded {}@{} from disk cache", name, version);
				self.hits.fetch_add(1, Ordering::SeqCst);
				let tree = Arc::new(tree);
				memory.insert(key, tree.clone());
				Some(tree)
			},
			None => {
				self.misses.fetch_add(1, Ordering::SeqCst);
				None
			},
		}
	}

	pub fn insert(&self, tree: SourceTree) -> Arc<SourceTree> {
		let name = tree.manifest.name.clone();
		let version = tree.manifest.version.clone();

		if let Some(dir) = &self.disk {
			let path = Self::file_name(dir, &name, &version);
			let written = std::fs::create_dir_all(dir)
				.and_then(|_| serde_json::to_string(&tree).map_err(std::io::Error::from))
				.and_then(|json| std::fs::write(&path, json));
			if let Err(e) = written {
				warn!("Cannot write cache entry {}: {}", path.display(), e);
			}
		}

		let tree = Arc::new(tree);
		let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
		memory.insert((name, version), tree.clone());
		tree
	}

	/// Drops a revision from memory and disk
	pub fn invalidate(&self, name: &str, version: &Version) {
		let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
		memory.remove(&(name.to_string(), version.clone()));
		if let Some(dir) = &self.disk {
			let _ = std::fs::remove_file(Self::file_name(dir, name, version));
		}
	}

	/// Drops everything held in memory. Disk entries are kept.
	pub fn clear(&self) {
		self.memory.lock().unwrap_or_else(|e| e.into_inner()).clear();
	}

	pub fn stats(&self) -> CacheStats {
		CacheStats {
			hits: self.hits.load(Ordering::SeqCst),
			misses: self.misses.load(Ordering::SeqCst),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::package::PackageManifest;

	fn tree(name: &str) -> SourceTree {
		SourceTree::new(PackageManifest::new(name, Version::new(1, 0, 0)), vec![])
	}

	#[test]
	fn test_memory_cache() {
		let cache = RevisionCache::new();
		let v1 = Version::new(1, 0, 0);
		assert!(cache.get("a", &v1).is_none());
		cache.insert(tree("a"));
		assert_eq!(cache.get("a", &v1).unwrap().manifest.name, "a");
		assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });

		cache.invalidate("a", &v1);
		assert!(cache.get("a", &v1).is_none());
	}

	#[test]
	fn test_disk_cache_survives_clear() {
		let dir = tempfile::tempdir().unwrap();
		let cache = RevisionCache::with_disk(dir.path());
		let v1 = Version::new(1, 0, 0);
		cache.insert(tree("a"));
		cache.clear();
		assert_eq!(cache.get("a", &v1).unwrap().manifest.name, "a");

		let fresh = RevisionCache::with_disk(dir.path());
		assert!(fresh.get("a", &v1).is_some());
		fresh.invalidate("a", &v1);
		assert!(RevisionCache::with_disk(dir.path()).get("a", &v1).is_none());
	}
}
