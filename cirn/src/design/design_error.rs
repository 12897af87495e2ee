use thiserror::Error;

use super::{DefinitionId, QualifiedName, SourceLocation};

#[derive(Clone, Debug)]
pub struct DefinitionNameConflictError {
	pub name: QualifiedName,
	pub first: SourceLocation,
	pub second: SourceLocation,
}

#[derive(Clone, Debug)]
pub struct FieldNameConflictError {
	pub definition: QualifiedName,
	pub field: String,
	pub first: SourceLocation,
	pub second: SourceLocation,
}

/// Something in `definition` was declared as `found` where `expected` was required
#[derive(Clone, Debug)]
pub struct TypeMismatchError {
	pub definition: QualifiedName,
	pub subject: String,
	pub expected: String,
	pub found: String,
	pub location: SourceLocation,
}

#[derive(Clone, Debug)]
pub struct CycleError {
	/// Definitions on the cycle, the first one repeated at the end
	pub cycle: Vec<QualifiedName>,
	pub location: SourceLocation,
}

impl CycleError {
	pub fn path(&self) -> String {
		self.cycle.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" -> ")
	}
}

impl From<DefinitionNameConflictError> for DesignError {
	fn from(err: DefinitionNameConflictError) -> Self {
		Self::DuplicateDefinition(Box::new(err))
	}
}

impl From<FieldNameConflictError> for DesignError {
	fn from(err: FieldNameConflictError) -> Self {
		Self::DuplicateField(Box::new(err))
	}
}

impl From<TypeMismatchError> for DesignError {
	fn from(err: TypeMismatchError) -> Self {
		Self::TypeMismatch(Box::new(err))
	}
}

/// Represents an error that can occur during library construction.
/// Elaboration errors are not accounted for here.
#[derive(Clone, Debug, Error)]
pub enum DesignError {
	#[error("Invalid name `{name}`")]
	InvalidName { name: String, location: SourceLocation },

	#[error("Invalid definition ID")]
	InvalidDefinitionId(DefinitionId),

	#[error("Definition `{}` is declared more than once", .0.name)]
	DuplicateDefinition(Box<DefinitionNameConflictError>),

	#[error("Field `{}` is declared more than once in `{}`", .0.field, .0.definition)]
	DuplicateField(Box<FieldNameConflictError>),

	#[error("Type mismatch in `{}`: {} must be {}, found {}", .0.definition, .0.subject, .0.expected, .0.found)]
	TypeMismatch(Box<TypeMismatchError>),

	#[error("Cyclic inheritance: {}", .0.path())]
	CyclicInheritance(Box<CycleError>),

	#[error("Recursive instantiation: {}", .0.path())]
	RecursiveInstantiation(Box<CycleError>),
}

impl DesignError {
	/// Source locations relevant to the error, most important first
	pub fn locations(&self) -> Vec<SourceLocation> {
		use DesignError::*;
		match self {
			InvalidName { location, .. } => vec![location.clone()],
			InvalidDefinitionId(_) => vec![],
			DuplicateDefinition(e) => vec![e.second.clone(), e.first.clone()],
			DuplicateField(e) => vec![e.second.clone(), e.first.clone()],
			TypeMismatch(e) => vec![e.location.clone()],
			CyclicInheritance(e) | RecursiveInstantiation(e) => vec![e.location.clone()],
		}
	}
}
