use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};

use super::PackageError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
	pub version: Version,
	pub checksum: String,
	/// Packages whose requirements selected this one
	#[serde(default)]
	pub requested_by: BTreeSet<String>,
}

/// Selected revision of every package, sorted by name so identical
/// resolutions serialize identically
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
	#[serde(default)]
	pub packages: BTreeMap<String, LockedPackage>,
}

impl Lockfile {
	pub fn get(&self, name: &str) -> Option<&LockedPackage> {
		self.packages.get(name)
	}

	pub fn to_yaml(&self) -> Result<String, PackageError> {
		serde_yaml::to_string(self).map_err(|error| PackageError::MalformedLock {
			path: String::new(),
			error,
		})
	}

	pub fn from_yaml(text: &str, path: &str) -> Result<Self, PackageError> {
		serde_yaml::from_str(text).map_err(|error| PackageError::MalformedLock {
			path: path.into(),
			error,
		})
	}

	/// Reads the lock file, a missing file is an empty lock
	pub fn open(path: &Path) -> Result<Self, PackageError> {
		if !path.exists() {
			return Ok(Self::default());
		}
		let text = std::fs::read_to_string(path).map_err(|e| PackageError::io(path.display(), e))?;
		Self::from_yaml(&text, &path.display().to_string())
	}

	pub fn save(&self, path: &Path) -> Result<(), PackageError> {
		std::fs::write(path, self.to_yaml()?).map_err(|e| PackageError::io(path.display(), e))
	}
}
