use std::sync::Arc;

use crate::design::{
	Assignment, Connection, DefinitionId, DefinitionKind, Dimension, Expression, Field, FieldKind, Library,
	LibraryBuilder, ParamType, PinRole, Provenance, QualifiedName, Quantity, Retype, SourceLocation,
};

/// Builds small libraries in the `test::main` module
pub(crate) struct LibraryFixture {
	builder: LibraryBuilder,
	line: u32,
}

fn path(s: &str) -> Vec<String> {
	s.split('.').map(String::from).collect()
}

pub(crate) fn ohms(value: f64) -> Expression {
	Expression::quantity(Quantity::new(value, Dimension::RESISTANCE))
}

pub(crate) fn volts(value: f64) -> Expression {
	Expression::quantity(Quantity::new(value, Dimension::VOLTAGE))
}

impl LibraryFixture {
	pub fn new() -> Self {
		Self {
			builder: LibraryBuilder::new(),
			line: 0,
		}
	}

	fn location(&mut self) -> SourceLocation {
		self.line += 1;
		SourceLocation::new("test.json", self.line, 1)
	}

	pub fn declare(&mut self, name: &str, kind: DefinitionKind) -> DefinitionId {
		let location = self.location();
		let provenance = Provenance {
			package: "test".into(),
			revision: None,
		};
		self.builder
			.declare(QualifiedName::new("test", "main", name), kind, provenance, location)
			.unwrap()
	}

	fn with_pins(&mut self, name: &str, kind: DefinitionKind, pins: &[&str]) -> DefinitionId {
		let id = self.declare(name, kind);
		for pin in pins {
			self.pin(id, pin, PinRole::Passive, false);
		}
		id
	}

	pub fn component(&mut self, name: &str, pins: &[&str]) -> DefinitionId {
		self.with_pins(name, DefinitionKind::Component, pins)
	}

	pub fn module(&mut self, name: &str, pins: &[&str]) -> DefinitionId {
		self.with_pins(name, DefinitionKind::Module, pins)
	}

	pub fn interface(&mut self, name: &str, pins: &[&str]) -> DefinitionId {
		self.with_pins(name, DefinitionKind::Interface, pins)
	}

	pub fn derived_component(&mut self, name: &str, parent: DefinitionId) -> DefinitionId {
		let id = self.declare(name, DefinitionKind::Component);
		self.builder.set_parent(id, parent).unwrap();
		id
	}

	fn field(&mut self, def: DefinitionId, name: &str, kind: FieldKind) {
		let location = self.location();
		self.builder
			.add_field(
				def,
				Field {
					name: name.into(),
					kind,
					location,
				},
			)
			.unwrap();
	}

	pub fn pin(&mut self, def: DefinitionId, name: &str, role: PinRole, required: bool) {
		self.field(def, name, FieldKind::Pin { role, required });
	}

	pub fn signal(&mut self, def: DefinitionId, name: &str, net_name: Option<&str>) {
		let kind = FieldKind::Signal {
			role: PinRole::Passive,
			net_name: net_name.map(String::from),
		};
		self.field(def, name, kind);
	}

	pub fn param(&mut self, def: DefinitionId, name: &str, ty: ParamType, required: bool) {
		self.field(def, name, FieldKind::Parameter { ty, required });
	}

	pub fn child(&mut self, def: DefinitionId, name: &str, class: DefinitionId) {
		self.field(def, name, FieldKind::Child(class));
	}

	pub fn assign(&mut self, def: DefinitionId, target: &str, value: Expression) {
		let location = self.location();
		let assignment = Assignment {
			target: path(target),
			value,
			location,
		};
		self.builder.add_assignment(def, assignment).unwrap();
	}

	pub fn connect(&mut self, def: DefinitionId, left: &str, right: &str) {
		let location = self.location();
		let connection = Connection {
			left: path(left),
			right: path(right),
			location,
		};
		self.builder.add_connection(def, connection).unwrap();
	}

	pub fn retype(&mut self, def: DefinitionId, target: &str, class: DefinitionId) {
		let location = self.location();
		let retype = Retype {
			target: path(target),
			class,
			location,
		};
		self.builder.add_retype(def, retype).unwrap();
	}

	pub fn build(self) -> Arc<Library> {
		Arc::new(self.builder.build().unwrap())
	}
}
