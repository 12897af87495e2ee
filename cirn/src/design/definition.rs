use std::fmt::Display;

use serde::Serialize;

use super::{DefinitionId, Dimension, Expression, PinRole, QualifiedName, SourceLocation, Value};

/// Kind of a block definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
	Module,
	Component,
	Interface,
}

impl DefinitionKind {
	/// Components specialize modules, interfaces only derive from interfaces
	pub fn can_inherit_from(self, parent: DefinitionKind) -> bool {
		use DefinitionKind::*;
		matches!(
			(self, parent),
			(Module, Module) | (Component, Module) | (Component, Component) | (Interface, Interface)
		)
	}

	pub fn name(self) -> &'static str {
		match self {
			DefinitionKind::Module => "module",
			DefinitionKind::Component => "component",
			DefinitionKind::Interface => "interface",
		}
	}
}

impl Display for DefinitionKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

/// Where a definition came from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Provenance {
	pub package: String,
	/// Resolved revision, absent for the local project
	pub revision: Option<String>,
}

/// Declared type of a parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
	Quantity(Dimension),
	Text,
	Bool,
	/// Untyped attribute, accepts any value
	Attribute,
}

impl ParamType {
	pub fn accepts(&self, value: &Value) -> bool {
		match (self, value) {
			(ParamType::Attribute, _) => true,
			(ParamType::Quantity(dim), Value::Quantity(q)) => q.dimension == *dim,
			(ParamType::Text, Value::Text(_)) => true,
			(ParamType::Bool, Value::Bool(_)) => true,
			_ => false,
		}
	}

	/// Redeclaring an attribute with a concrete type (or the other way round) is allowed
	pub fn is_compatible_with(&self, other: &ParamType) -> bool {
		self == other || *self == ParamType::Attribute || *other == ParamType::Attribute
	}
}

impl Display for ParamType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ParamType::Quantity(dim) => write!(f, "{}", dim),
			ParamType::Text => write!(f, "text"),
			ParamType::Bool => write!(f, "bool"),
			ParamType::Attribute => write!(f, "attribute"),
		}
	}
}

impl Serialize for ParamType {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
	Pin { role: PinRole, required: bool },
	/// Logical net declared inside a block, connectable like a pin
	Signal { role: PinRole, net_name: Option<String> },
	Parameter { ty: ParamType, required: bool },
	/// Nested instance of another definition (module, component or interface)
	Child(DefinitionId),
}

impl FieldKind {
	pub fn kind_name(&self) -> &'static str {
		match self {
			FieldKind::Pin { .. } => "pin",
			FieldKind::Signal { .. } => "signal",
			FieldKind::Parameter { .. } => "parameter",
			FieldKind::Child(_) => "instance",
		}
	}

	pub fn is_port(&self) -> bool {
		matches!(self, FieldKind::Pin { .. } | FieldKind::Signal { .. })
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
	pub name: String,
	pub kind: FieldKind,
	pub location: SourceLocation,
}

/// Parameter assignment. Single-segment targets set the definition's own
/// default, longer ones override a descendant's parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
	pub target: Vec<String>,
	pub value: Expression,
	pub location: SourceLocation,
}

impl Assignment {
	pub fn is_local(&self) -> bool {
		self.target.len() == 1
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
	pub left: Vec<String>,
	pub right: Vec<String>,
	pub location: SourceLocation,
}

/// Replaces the class of a descendant instance
#[derive(Clone, Debug, PartialEq)]
pub struct Retype {
	pub target: Vec<String>,
	pub class: DefinitionId,
	pub location: SourceLocation,
}

/// Block definition as declared in source, before flattening
#[derive(Clone, Debug)]
pub struct Definition {
	pub(super) id: DefinitionId,
	pub(super) name: QualifiedName,
	pub(super) kind: DefinitionKind,
	pub(super) parent: Option<DefinitionId>,
	pub(super) fields: Vec<Field>,
	pub(super) assignments: Vec<Assignment>,
	pub(super) connections: Vec<Connection>,
	pub(super) retypes: Vec<Retype>,
	pub(super) provenance: Provenance,
	pub(super) location: SourceLocation,
}

impl Definition {
	pub(super) fn new(
		id: DefinitionId,
		name: QualifiedName,
		kind: DefinitionKind,
		provenance: Provenance,
		location: SourceLocation,
	) -> Self {
		Self {
			id,
			name,
			kind,
			parent: None,
			fields: vec![],
			assignments: vec![],
			connections: vec![],
			retypes: vec![],
			provenance,
			location,
		}
	}

	pub fn id(&self) -> DefinitionId {
		self.id
	}

	pub fn name(&self) -> &QualifiedName {
		&self.name
	}

	pub fn kind(&self) -> DefinitionKind {
		self.kind
	}

	pub fn parent(&self) -> Option<DefinitionId> {
		self.parent
	}

	pub fn fields(&self) -> &[Field] {
		&self.fields
	}

	pub fn assignments(&self) -> &[Assignment] {
		&self.assignments
	}

	pub fn connections(&self) -> &[Connection] {
		&self.connections
	}

	pub fn retypes(&self) -> &[Retype] {
		&self.retypes
	}

	pub fn provenance(&self) -> &Provenance {
		&self.provenance
	}

	pub fn location(&self) -> &SourceLocation {
		&self.location
	}

	pub fn is_builtin(&self) -> bool {
		self.name.is_builtin()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::design::Quantity;

	#[test]
	fn test_kind_inheritance() {
		use DefinitionKind::*;
		assert!(Component.can_inherit_from(Module));
		assert!(Component.can_inherit_from(Component));
		assert!(!Module.can_inherit_from(Component));
		assert!(!Interface.can_inherit_from(Module));
		assert!(!Module.can_inherit_from(Interface));
	}

	#[test]
	fn test_param_type() {
		let ohms = Value::Quantity(Quantity::new(10.0, Dimension::RESISTANCE));
		assert!(ParamType::Quantity(Dimension::RESISTANCE).accepts(&ohms));
		assert!(!ParamType::Quantity(Dimension::VOLTAGE).accepts(&ohms));
		assert!(ParamType::Attribute.accepts(&Value::Text("RC0402".into())));
		assert!(!ParamType::Bool.accepts(&Value::Text("true".into())));

		assert!(ParamType::Attribute.is_compatible_with(&ParamType::Text));
		assert!(!ParamType::Text.is_compatible_with(&ParamType::Bool));
	}
}
