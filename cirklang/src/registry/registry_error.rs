use cirn::design::{DesignError, SourceLocation};
use thiserror::Error;

use crate::core::compiler_diagnostic::*;

/// Errors raised while turning source modules into a definition library
#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("Unknown definition `{name}`")]
	UnknownDefinition { name: String, location: SourceLocation },

	#[error("Unknown module `{module}`")]
	UnknownModule { module: String, location: SourceLocation },

	#[error("Module `{module}` is defined more than once in package `{package}`")]
	DuplicateModule {
		package: String,
		module: String,
		location: SourceLocation,
	},

	#[error("Reference `{name}` is ambiguous, it names both a local definition and an import")]
	AmbiguousReference {
		name: String,
		local: SourceLocation,
		imported: SourceLocation,
	},

	#[error("Unknown unit `{unit}`")]
	UnknownUnit { unit: String, location: SourceLocation },

	#[error("Unknown dimension `{name}`")]
	UnknownDimension { name: String, location: SourceLocation },

	#[error("Malformed path `{path}`")]
	MalformedPath { path: String, location: SourceLocation },

	#[error(transparent)]
	Design(#[from] DesignError),
}

impl RegistryError {
	pub fn locations(&self) -> Vec<SourceLocation> {
		use RegistryError::*;
		match self {
			UnknownDefinition { location, .. }
			| UnknownModule { location, .. }
			| DuplicateModule { location, .. }
			| UnknownUnit { location, .. }
			| UnknownDimension { location, .. }
			| MalformedPath { location, .. } => vec![location.clone()],
			AmbiguousReference { local, imported, .. } => vec![local.clone(), imported.clone()],
			Design(e) => e.locations(),
		}
	}
}

impl ProvidesCompilerDiagnostic for RegistryError {
	fn to_diagnostic(&self) -> CompilerDiagnostic {
		use RegistryError::*;
		let builder = CompilerDiagnosticBuilder::from_error(self).locations(&self.locations());
		match self {
			UnknownDefinition { .. } => builder
				.error_code("registry::unknown_definition")
				.help("Definitions are looked up in the current module, then in imports, then among the built-ins.")
				.build(),
			UnknownModule { .. } => builder
				.error_code("registry::unknown_module")
				.help("Import from `<module>` of the same package or from `<dependency>/<module>`.")
				.build(),
			DuplicateModule { .. } => builder.error_code("registry::duplicate_module").build(),
			AmbiguousReference { name, .. } => builder
				.error_code("registry::ambiguous_reference")
				.help(&format!("Rename the local `{}` or drop it from the import list.", name))
				.build(),
			UnknownUnit { .. } => builder
				.error_code("registry::unknown_unit")
				.help("Known units: Ω ohm V A F H Hz W s C J S K m %, with prefixes p n u µ m k M G.")
				.build(),
			UnknownDimension { .. } => builder
				.error_code("registry::unknown_dimension")
				.help("Use a dimension name such as `resistance` or `voltage`, or `text`/`bool`.")
				.build(),
			MalformedPath { .. } => builder
				.error_code("registry::malformed_path")
				.help("Paths are dot separated names, e.g. `R1.p1`.")
				.build(),
			Design(design_error) => design_error.to_diagnostic(),
		}
	}
}
