//! Diagnostics for errors and messages produced by the IR crate
use cirn::design::DesignError;
use cirn::elab::{ElabError, ElabMessage, ElabMessageKind, ElabMessageSeverity};
use miette::Severity;

use super::compiler_diagnostic::*;

impl ProvidesCompilerDiagnostic for DesignError {
	fn to_diagnostic(&self) -> CompilerDiagnostic {
		use DesignError::*;
		let builder = CompilerDiagnosticBuilder::from_error(self).locations(&self.locations());
		match self {
			InvalidName { .. } => builder
				.error_code("design::invalid_name")
				.help("Names must start with a letter or an underscore. Pin names may also be plain numbers.")
				.build(),
			InvalidDefinitionId(_) => builder.error_code("design::invalid_definition_id").build(),
			DuplicateDefinition(_) => builder
				.error_code("design::duplicate_definition")
				.help("Each definition in a module must have a unique name.")
				.build(),
			DuplicateField(_) => builder
				.error_code("design::duplicate_field")
				.help("Fields are inherited from the parent. Redeclare a field only to narrow its type.")
				.build(),
			TypeMismatch(_) => builder.error_code("design::type_mismatch").build(),
			CyclicInheritance(_) => builder
				.error_code("design::cyclic_inheritance")
				.help("A definition cannot inherit from itself, directly or indirectly.")
				.build(),
			RecursiveInstantiation(_) => builder
				.error_code("design::recursive_instantiation")
				.help("A definition cannot contain an instance of itself, directly or indirectly.")
				.build(),
		}
	}
}

impl ProvidesCompilerDiagnostic for ElabError {
	fn to_diagnostic(&self) -> CompilerDiagnostic {
		use ElabError::*;
		match self {
			Design(design_error) => design_error.to_diagnostic(),
			Cancelled => CompilerDiagnosticBuilder::from_error(self)
				.error_code("elab::cancelled")
				.severity(Severity::Advice)
				.build(),
			InvalidTop { .. } => CompilerDiagnosticBuilder::from_error(self)
				.error_code("elab::invalid_top")
				.help("The entry point must be a module or a component.")
				.build(),
			UnknownReference { .. } => CompilerDiagnosticBuilder::from_error(self)
				.error_code("elab::unknown_reference")
				.locations(&self.locations())
				.build(),
			TypeMismatch { .. } => CompilerDiagnosticBuilder::from_error(self)
				.error_code("elab::type_mismatch")
				.locations(&self.locations())
				.help("A retype may only replace a class with one of its subclasses.")
				.build(),
			MissingPassResult(_) => CompilerDiagnosticBuilder::from_error(self)
				.error_code("elab::internal")
				.build(),
		}
	}
}

fn severity_of(severity: ElabMessageSeverity) -> Severity {
	match severity {
		ElabMessageSeverity::Info => Severity::Advice,
		ElabMessageSeverity::Warning => Severity::Warning,
		ElabMessageSeverity::Error => Severity::Error,
	}
}

impl ProvidesCompilerDiagnostic for ElabMessage {
	fn to_diagnostic(&self) -> CompilerDiagnostic {
		let kind = self.kind();
		let builder = CompilerDiagnosticBuilder::from_error(kind)
			.severity(severity_of(self.severity()))
			.error_code(kind.code())
			.locations(self.locations());

		let builder = match kind {
			ElabMessageKind::ParameterConflict { .. } => {
				builder.help("Assign the parameter only once, or move one of the assignments to a different scope.")
			},
			ElabMessageKind::IncompatibleConnection { .. } => {
				builder.help("Check the roles of both pins, e.g. two outputs cannot drive the same net.")
			},
			ElabMessageKind::UnitMismatch { .. } => builder.help("Only quantities of the same dimension can be added."),
			ElabMessageKind::CyclicParameterDependency { .. } => {
				builder.help("Parameters cannot depend on themselves, directly or indirectly.")
			},
			_ => builder,
		};

		match kind.rule() {
			Some(rule) => builder.help(&format!("Reported by check `{}`, configurable under `checks`", rule)),
			None => builder,
		}
		.build()
	}
}
