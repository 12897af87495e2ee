use std::fmt::Display;

use semver::{Version, VersionReq};
use thiserror::Error;

use crate::core::compiler_diagnostic::*;

/// A version constraint together with the package that imposed it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
	pub requester: String,
	pub constraint: VersionReq,
}

impl Display for Requirement {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "`{}` requires `{}`", self.requester, self.constraint)
	}
}

#[derive(Clone, Debug)]
pub struct DependencyConflictError {
	pub name: String,
	pub first: Requirement,
	pub second: Requirement,
	pub available: Vec<Version>,
}

#[derive(Debug, Error)]
pub enum PackageError {
	#[error("Package `{name}` does not exist (required by `{requested_by}`)")]
	PackageNotFound { name: String, requested_by: String },

	#[error("No version of `{name}` matches `{constraint}` (required by `{requested_by}`)")]
	NoMatchingVersion {
		name: String,
		constraint: VersionReq,
		requested_by: String,
		available: Vec<Version>,
	},

	#[error("Conflicting requirements on `{}`: {} but {}", .0.name, .0.first, .0.second)]
	DependencyConflict(Box<DependencyConflictError>),

	#[error("Cyclic dependency: {}", .cycle.join(" -> "))]
	CyclicDependency { cycle: Vec<String> },

	#[error("Fetching `{name}@{version}` timed out after {attempts} attempts")]
	FetchTimeout {
		name: String,
		version: Version,
		attempts: u32,
		timeout_ms: u64,
	},

	#[error("Cannot fetch `{name}@{version}`: {reason}")]
	FetchFailed {
		name: String,
		version: Version,
		reason: String,
	},

	#[error("Checksum of `{name}@{version}` does not match the lock file")]
	ChecksumMismatch {
		name: String,
		version: Version,
		expected: String,
		found: String,
	},

	#[error("Malformed lock file `{path}`: {error}")]
	MalformedLock {
		path: String,
		#[source]
		error: serde_yaml::Error,
	},

	#[error("Cannot access `{path}`")]
	Io {
		path: String,
		#[source]
		error: std::io::Error,
	},

	#[error("Package resolution did not settle after {0} rounds")]
	Unsettled(usize),

	#[error("Package resolution was cancelled")]
	Cancelled,
}

impl PackageError {
	/// Timeouts may go away when the fetch is repeated
	pub fn is_retryable(&self) -> bool {
		matches!(self, PackageError::FetchTimeout { .. })
	}

	pub(crate) fn io(path: impl Display, error: std::io::Error) -> Self {
		PackageError::Io {
			path: path.to_string(),
			error,
		}
	}
}

fn versions(available: &[Version]) -> String {
	if available.is_empty() {
		return "No versions are available".into();
	}
	let list: Vec<String> = available.iter().map(|v| v.to_string()).collect();
	format!("Available versions: {}", list.join(", "))
}

impl ProvidesCompilerDiagnostic for PackageError {
	fn to_diagnostic(&self) -> CompilerDiagnostic {
		use PackageError::*;
		let builder = CompilerDiagnosticBuilder::from_error(self);
		match self {
			PackageNotFound { .. } => builder
				.error_code("package::not_found")
				.help("Check the package name and the registry path in `cirk.yaml`.")
				.build(),
			NoMatchingVersion { available, .. } => builder
				.error_code("package::no_matching_version")
				.help(&versions(available))
				.build(),
			DependencyConflict(conflict) => builder
				.error_code("package::dependency_conflict")
				.help(&format!(
					"No single version satisfies both constraints. {}",
					versions(&conflict.available)
				))
				.build(),
			CyclicDependency { .. } => builder
				.error_code("package::cyclic_dependency")
				.help("Packages cannot import themselves, directly or indirectly.")
				.build(),
			FetchTimeout { timeout_ms, .. } => builder
				.error_code("package::fetch_timeout")
				.help(&format!(
					"Each attempt was limited to {} ms. Raise `fetch.timeout_ms` or try again later.",
					timeout_ms
				))
				.build(),
			FetchFailed { .. } => builder.error_code("package::fetch_failed").build(),
			ChecksumMismatch { expected, found, .. } => builder
				.error_code("package::checksum_mismatch")
				.help(&format!(
					"Locked checksum {} but fetched {}. Delete the lock entry to accept the new contents.",
					expected, found
				))
				.build(),
			MalformedLock { .. } => builder.error_code("package::malformed_lock").build(),
			Io { error, .. } => builder.error_code("package::io").help(&error.to_string()).build(),
			Unsettled(_) => builder.error_code("package::unsettled").build(),
			Cancelled => builder
				.error_code("package::cancelled")
				.severity(miette::Severity::Advice)
				.build(),
		}
	}
}
