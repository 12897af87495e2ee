use cirn::elab::ElabError;
use thiserror::Error;

use super::compiler_diagnostic::*;
use crate::config::ConfigError;
use crate::package::PackageError;
use crate::registry::RegistryError;

/// General compiler error
///
/// Includes errors from all stages of the toolchain
#[derive(Debug, Error)]
pub enum CompilerError {
	#[error(transparent)]
	PackageError(#[from] PackageError),

	#[error(transparent)]
	RegistryError(#[from] RegistryError),

	#[error(transparent)]
	ElabError(#[from] ElabError),

	#[error(transparent)]
	ConfigError(#[from] ConfigError),

	#[error(transparent)]
	IoError(#[from] std::io::Error),

	#[error("File not found")]
	FileNotFound(String),

	#[error("Malformed source file `{file}`: {error}")]
	JsonError {
		file: String,
		#[source]
		error: serde_json::Error,
	},
}

impl CompilerError {
	/// Retryable errors may succeed when the operation is repeated
	pub fn is_retryable(&self) -> bool {
		match self {
			CompilerError::PackageError(e) => e.is_retryable(),
			_ => false,
		}
	}

	/// The run was cancelled or superseded by a newer one
	pub fn is_cancelled(&self) -> bool {
		matches!(
			self,
			CompilerError::PackageError(crate::package::PackageError::Cancelled)
				| CompilerError::ElabError(ElabError::Cancelled)
		)
	}
}

impl ProvidesCompilerDiagnostic for CompilerError {
	fn to_diagnostic(&self) -> CompilerDiagnostic {
		use CompilerError::*;
		match self {
			PackageError(package_error) => package_error.to_diagnostic(),

			RegistryError(registry_error) => registry_error.to_diagnostic(),

			ElabError(elab_error) => elab_error.to_diagnostic(),

			ConfigError(config_error) => config_error.to_diagnostic(),

			IoError(ref io_error) => CompilerDiagnosticBuilder::from_error(&self)
				.help(&io_error.to_string())
				.build(),
			JsonError { error, .. } => CompilerDiagnosticBuilder::from_error(&self)
				.error_code("io::json")
				.help(&format!("The parser produced invalid JSON at line {}", error.line()))
				.build(),
			FileNotFound(file_name) => CompilerDiagnosticBuilder::from_error(&self)
				.help(&format!("Make sure this file exists: {}", file_name))
				.build(),
		}
	}
}
