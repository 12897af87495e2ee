use std::collections::BTreeMap;
use std::path::Path;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use super::PackageError;
use crate::config::ProjectConfig;

/// Identity and requirements of a package, read from its `cirk.yaml`.
/// Other configuration keys are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
	pub name: String,
	pub version: Version,
	#[serde(default)]
	pub dependencies: BTreeMap<String, VersionReq>,
}

impl PackageManifest {
	pub fn new(name: &str, version: Version) -> Self {
		Self {
			name: name.into(),
			version,
			dependencies: BTreeMap::new(),
		}
	}

	pub fn with_dependency(mut self, name: &str, constraint: VersionReq) -> Self {
		self.dependencies.insert(name.into(), constraint);
		self
	}

	pub fn open(path: &Path) -> Result<Self, PackageError> {
		let text = std::fs::read_to_string(path).map_err(|e| PackageError::io(path.display(), e))?;
		serde_yaml::from_str(&text).map_err(|error| PackageError::FetchFailed {
			name: path.display().to_string(),
			version: Version::new(0, 0, 0),
			reason: error.to_string(),
		})
	}
}

impl From<&ProjectConfig> for PackageManifest {
	fn from(config: &ProjectConfig) -> Self {
		Self {
			name: config.name.clone(),
			version: config.version.clone(),
			dependencies: config.dependencies.clone(),
		}
	}
}
