use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use log::debug;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use super::{PackageError, PackageManifest};
use crate::ast::SourceFile;
use crate::config::CONFIG_FILE_NAME;

/// Fetched contents of one package revision
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceTree {
	pub manifest: PackageManifest,
	/// Modules sorted by path
	pub files: Vec<SourceFile>,
}

impl SourceTree {
	pub fn new(manifest: PackageManifest, mut files: Vec<SourceFile>) -> Self {
		files.sort_by(|a, b| a.path.cmp(&b.path));
		Self { manifest, files }
	}

	/// Content checksum, identical trees always produce identical checksums
	pub fn checksum(&self) -> String {
		let json = serde_json::to_string(self).unwrap_or_default();
		sha256::digest(json)
	}
}

/// Backing store of versioned packages. Implementations must be usable
/// from several fetch threads at once.
pub trait PackageProvider: Send + Sync {
	/// All published versions of a package
	fn list_versions(&self, name: &str) -> Result<Vec<Version>, PackageError>;

	fn fetch(&self, name: &str, version: &Version) -> Result<SourceTree, PackageError>;

	/// Highest published version matching the constraint
	fn resolve(&self, name: &str, constraint: &VersionReq) -> Result<Option<Version>, PackageError> {
		Ok(self
			.list_versions(name)?
			.into_iter()
			.filter(|v| constraint.matches(v))
			.max())
	}
}

/// Packages laid out as `<root>/<name>/<version>/cirk.yaml` with modules in `src/*.json`
#[derive(Clone, Debug)]
pub struct FilesystemProvider {
	root: PathBuf,
}

impl FilesystemProvider {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}
}

impl PackageProvider for FilesystemProvider {
	fn list_versions(&self, name: &str) -> Result<Vec<Version>, PackageError> {
		let dir = self.root.join(name);
		if !dir.is_dir() {
			return Err(PackageError::PackageNotFound {
				name: name.into(),
				requested_by: String::new(),
			});
		}

		let mut versions = vec![];
		for entry in std::fs::read_dir(&dir).map_err(|e| PackageError::io(dir.display(), e))? {
			let entry = entry.map_err(|e| PackageError::io(dir.display(), e))?;
			match Version::parse(&entry.file_name().to_string_lossy()) {
				Ok(version) => versions.push(version),
				Err(_) => debug!("Ignoring {} in package registry", entry.path().display()),
			}
		}
		versions.sort();
		Ok(versions)
	}

	fn fetch(&self, name: &str, version: &Version) -> Result<SourceTree, PackageError> {
		let dir = self.root.join(name).join(version.to_string());
		let manifest = PackageManifest::open(&dir.join(CONFIG_FILE_NAME))?;
		if manifest.name != name || &manifest.version != version {
			return Err(PackageError::FetchFailed {
				name: name.into(),
				version: version.clone(),
				reason: format!("manifest describes `{}@{}`", manifest.name, manifest.version),
			});
		}

		let src = dir.join("src");
		let mut files = vec![];
		if src.is_dir() {
			for entry in std::fs::read_dir(&src).map_err(|e| PackageError::io(src.display(), e))? {
				let path = entry.map_err(|e| PackageError::io(src.display(), e))?.path();
				if path.extension().map_or(true, |e| e != "json") {
					continue;
				}
				let file = SourceFile::open(&path).map_err(|e| PackageError::FetchFailed {
					name: name.into(),
					version: version.clone(),
					reason: e.to_string(),
				})?;
				files.push(file);
			}
		}

		Ok(SourceTree::new(manifest, files))
	}
}

/// In-memory package store, used for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryProvider {
	packages: Mutex<BTreeMap<String, BTreeMap<Version, SourceTree>>>,
	/// Artificial latency of upcoming fetches, per package
	delays: Mutex<HashMap<String, Vec<Duration>>>,
	fetches: AtomicUsize,
	listings: AtomicUsize,
}

impl MemoryProvider {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn publish(&self, tree: SourceTree) {
		let mut packages = self.packages.lock().unwrap_or_else(|e| e.into_inner());
		packages
			.entry(tree.manifest.name.clone())
			.or_default()
			.insert(tree.manifest.version.clone(), tree);
	}

	/// Delays the next fetches of a package, one entry per attempt
	pub fn delay_fetches(&self, name: &str, delays: Vec<Duration>) {
		let mut map = self.delays.lock().unwrap_or_else(|e| e.into_inner());
		map.insert(name.into(), delays);
	}

	/// Number of `fetch` calls so far
	pub fn fetch_count(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}

	/// Number of `list_versions` calls so far
	pub fn listing_count(&self) -> usize {
		self.listings.load(Ordering::SeqCst)
	}
}

impl PackageProvider for MemoryProvider {
	fn list_versions(&self, name: &str) -> Result<Vec<Version>, PackageError> {
		self.listings.fetch_add(1, Ordering::SeqCst);
		let packages = self.packages.lock().unwrap_or_else(|e| e.into_inner());
		match packages.get(name) {
			Some(versions) => Ok(versions.keys().cloned().collect()),
			None => Err(PackageError::PackageNotFound {
				name: name.into(),
				requested_by: String::new(),
			}),
		}
	}

	fn fetch(&self, name: &str, version: &Version) -> Result<SourceTree, PackageError> {
		self.fetches.fetch_add(1, Ordering::SeqCst);
		let delay = {
			let mut delays = self.delays.lock().unwrap_or_else(|e| e.into_inner());
			delays
				.get_mut(name)
				.filter(|d| !d.is_empty())
				.map(|d| d.remove(0))
		};
		if let Some(delay) = delay {
			std::thread::sleep(delay);
		}

		let packages = self.packages.lock().unwrap_or_else(|e| e.into_inner());
		packages
			.get(name)
			.and_then(|versions| versions.get(version))
			.cloned()
			.ok_or_else(|| PackageError::FetchFailed {
				name: name.into(),
				version: version.clone(),
				reason: "no such revision".into(),
			})
	}
}
