//! Project configuration (`cirk.yaml`)
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cirn::elab::{CheckRule, RuleLevel, RuleSeverityPolicy};
use log::debug;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::compiler_diagnostic::*;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "cirk.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("No `cirk.yaml` found in `{0}` or any of its parents")]
	NotFound(String),

	#[error("Cannot read `{path}`")]
	Io {
		path: String,
		#[source]
		error: std::io::Error,
	},

	#[error("Malformed configuration `{path}`: {error}")]
	Malformed {
		path: String,
		#[source]
		error: serde_yaml::Error,
	},

	#[error("Unknown check `{0}`")]
	UnknownCheck(String),

	#[error("Invalid entry point `{0}`")]
	InvalidEntry(String),
}

impl ProvidesCompilerDiagnostic for ConfigError {
	fn to_diagnostic(&self) -> CompilerDiagnostic {
		use ConfigError::*;
		let builder = CompilerDiagnosticBuilder::from_error(self);
		match self {
			NotFound(_) => builder
				.error_code("config::not_found")
				.help("Run the command inside a project directory or pass the project path explicitly.")
				.build(),
			Io { error, .. } => builder.error_code("config::io").help(&error.to_string()).build(),
			Malformed { .. } => builder.error_code("config::malformed").build(),
			UnknownCheck(_) => {
				let known: Vec<&str> = CheckRule::ALL.iter().map(|r| r.name()).collect();
				builder
					.error_code("config::unknown_check")
					.help(&format!("Known checks are: {}", known.join(", ")))
					.build()
			},
			InvalidEntry(_) => builder
				.error_code("config::invalid_entry")
				.help("The entry point has the form `<module>:<Definition>`, e.g. `main:Board`.")
				.build(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
	pub src: PathBuf,
	pub registry: PathBuf,
	pub cache: PathBuf,
	pub lock: PathBuf,
}

impl Default for PathsConfig {
	fn default() -> Self {
		Self {
			src: "src".into(),
			registry: "registry".into(),
			cache: ".cirk/cache".into(),
			lock: "cirk-lock.yaml".into(),
		}
	}
}

/// Fetch behaviour of the package resolver
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
	pub timeout_ms: u64,
	pub retries: u32,
	pub backoff_ms: u64,
	pub parallel: bool,
}

impl Default for FetchConfig {
	fn default() -> Self {
		Self {
			timeout_ms: 5000,
			retries: 3,
			backoff_ms: 100,
			parallel: true,
		}
	}
}

impl FetchConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	/// Delay before the given retry, doubled on every attempt
	pub fn backoff(&self, attempt: u32) -> Duration {
		Duration::from_millis(self.backoff_ms.saturating_mul(1 << attempt.min(16)))
	}
}

fn default_version() -> Version {
	Version::new(0, 1, 0)
}

/// Contents of `cirk.yaml`. Packages use the same file as their manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
	pub name: String,
	#[serde(default = "default_version")]
	pub version: Version,
	/// `<module>:<Definition>`
	#[serde(default)]
	pub entry: Option<String>,
	#[serde(default)]
	pub dependencies: BTreeMap<String, VersionReq>,
	#[serde(default)]
	pub paths: PathsConfig,
	#[serde(default)]
	pub fetch: FetchConfig,
	#[serde(default)]
	pub checks: BTreeMap<String, RuleLevel>,
}

impl ProjectConfig {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.into(),
			version: default_version(),
			entry: None,
			dependencies: BTreeMap::new(),
			paths: PathsConfig::default(),
			fetch: FetchConfig::default(),
			checks: BTreeMap::new(),
		}
	}

	pub fn from_yaml(text: &str, path: &str) -> Result<Self, ConfigError> {
		serde_yaml::from_str(text).map_err(|error| ConfigError::Malformed {
			path: path.into(),
			error,
		})
	}

	pub fn open(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.display().to_string(),
			error,
		})?;
		Self::from_yaml(&text, &path.display().to_string())
	}

	/// Walks up from `start` until a directory containing the configuration file is found
	pub fn find(start: &Path) -> Result<PathBuf, ConfigError> {
		let start = if start.is_file() {
			start.parent().unwrap_or(start)
		}
		else {
			start
		};

		for dir in start.ancestors() {
			let candidate = dir.join(CONFIG_FILE_NAME);
			debug!("Looking for {}", candidate.display());
			if candidate.is_file() {
				return Ok(candidate);
			}
		}
		Err(ConfigError::NotFound(start.display().to_string()))
	}

	/// Splits the entry point into module and definition name
	pub fn entry_point(&self, entry: Option<&str>) -> Result<(String, String), ConfigError> {
		let entry = entry.or(self.entry.as_deref()).unwrap_or("main:Main");
		match entry.split_once(':') {
			Some((module, name)) if !module.is_empty() && !name.is_empty() => Ok((module.into(), name.into())),
			_ => Err(ConfigError::InvalidEntry(entry.into())),
		}
	}

	/// Severity policy built from the `checks` section
	pub fn severity_policy(&self) -> Result<RuleSeverityPolicy, ConfigError> {
		let mut policy = RuleSeverityPolicy::new();
		for (name, level) in &self.checks {
			let rule = CheckRule::from_name(name).ok_or_else(|| ConfigError::UnknownCheck(name.clone()))?;
			policy.set_level(rule, *level);
		}
		Ok(policy)
	}
}
