pub mod definition;
pub mod eval;
pub mod expression;
pub mod expression_ops;
pub mod library;
pub mod pin_role;
pub mod units;
mod design_error;
mod utils;

pub use definition::{
	Assignment, Connection, Definition, DefinitionKind, Field, FieldKind, ParamType, Provenance, Retype,
};
pub use design_error::{CycleError, DefinitionNameConflictError, DesignError, FieldNameConflictError, TypeMismatchError};
pub use eval::{EvalContext, EvalError, Value};
pub use expression::{BinaryOp, Expression};
pub use library::{AssignmentGroup, FlatDefinition, FlatField, Library, LibraryBuilder};
pub use pin_role::PinRole;
pub use units::{Dimension, Quantity, UnitError};
pub use utils::{find_cycle, is_name_valid, is_pin_name_valid};

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// References a definition in a library
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize)]
#[serde(transparent)]
pub struct DefinitionId {
	id: usize,
}

impl DefinitionId {
	pub(crate) fn new(id: usize) -> Self {
		Self { id }
	}

	/// Position of the definition in its library
	pub fn index(&self) -> usize {
		self.id
	}
}

/// Package the builtin classes live in
pub const BUILTIN_PACKAGE: &str = "<builtin>";

/// Fully qualified definition path: `package::module::Name`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
	pub package: String,
	pub module: String,
	pub name: String,
}

impl QualifiedName {
	pub fn new(package: &str, module: &str, name: &str) -> Self {
		Self {
			package: package.into(),
			module: module.into(),
			name: name.into(),
		}
	}

	pub fn builtin(name: &str) -> Self {
		Self::new(BUILTIN_PACKAGE, "", name)
	}

	pub fn is_builtin(&self) -> bool {
		self.package == BUILTIN_PACKAGE
	}
}

impl Display for QualifiedName {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.module.is_empty() {
			write!(f, "{}::{}", self.package, self.name)
		}
		else {
			write!(f, "{}::{}::{}", self.package, self.module, self.name)
		}
	}
}

impl Serialize for QualifiedName {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

/// Position in a source file. Missing locations default to an empty file name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
	#[serde(default)]
	pub file: String,
	#[serde(default)]
	pub line: u32,
	#[serde(default)]
	pub column: u32,
}

impl SourceLocation {
	pub fn new(file: &str, line: u32, column: u32) -> Self {
		Self {
			file: file.into(),
			line,
			column,
		}
	}

	pub fn is_known(&self) -> bool {
		!self.file.is_empty()
	}
}

impl Display for SourceLocation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.is_known() {
			write!(f, "{}:{}:{}", self.file, self.line, self.column)
		}
		else {
			write!(f, "<unknown>")
		}
	}
}
