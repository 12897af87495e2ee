use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use super::definition::{Definition, DefinitionKind, Field, FieldKind, ParamType, Provenance};
use super::design_error::{CycleError, DefinitionNameConflictError, FieldNameConflictError, TypeMismatchError};
use super::utils::{find_cycle, is_name_valid, is_pin_name_valid};
use super::{
	Assignment, Connection, DefinitionId, DesignError, QualifiedName, Retype, SourceLocation, BUILTIN_PACKAGE,
};

const BUILTINS: [(&str, DefinitionKind); 3] = [
	("Module", DefinitionKind::Module),
	("Component", DefinitionKind::Component),
	("Interface", DefinitionKind::Interface),
];

fn builtin_id(kind: DefinitionKind) -> DefinitionId {
	match kind {
		DefinitionKind::Module => DefinitionId::new(0),
		DefinitionKind::Component => DefinitionId::new(1),
		DefinitionKind::Interface => DefinitionId::new(2),
	}
}

/// Field of a flattened definition together with the definition declaring it
#[derive(Clone, Debug)]
pub struct FlatField {
	pub field: Field,
	pub declared_in: DefinitionId,
}

/// Assignments to one target made in one definition body
#[derive(Clone, Debug)]
pub struct AssignmentGroup {
	pub declared_in: DefinitionId,
	pub assignments: Vec<Assignment>,
}

/// Definition with its whole inheritance chain folded in. Parent declarations
/// come first, a child's declaration shadows the parent's by name.
#[derive(Clone, Debug)]
pub struct FlatDefinition {
	id: DefinitionId,
	fields: Vec<FlatField>,
	field_index: HashMap<String, usize>,
	defaults: BTreeMap<String, AssignmentGroup>,
	overrides: BTreeMap<Vec<String>, AssignmentGroup>,
	connections: Vec<Connection>,
	retypes: Vec<Retype>,
}

impl FlatDefinition {
	fn empty(id: DefinitionId) -> Self {
		Self {
			id,
			fields: vec![],
			field_index: HashMap::new(),
			defaults: BTreeMap::new(),
			overrides: BTreeMap::new(),
			connections: vec![],
			retypes: vec![],
		}
	}

	pub fn id(&self) -> DefinitionId {
		self.id
	}

	pub fn fields(&self) -> &[FlatField] {
		&self.fields
	}

	pub fn field(&self, name: &str) -> Option<&FlatField> {
		self.field_index.get(name).map(|&i| &self.fields[i])
	}

	/// Position of the field in declaration order
	pub fn field_position(&self, name: &str) -> Option<usize> {
		self.field_index.get(name).copied()
	}

	/// Default value assignments for an own parameter
	pub fn default_for(&self, name: &str) -> Option<&AssignmentGroup> {
		self.defaults.get(name)
	}

	/// Assignments overriding a descendant's parameter
	pub fn override_for(&self, target: &[String]) -> Option<&AssignmentGroup> {
		self.overrides.get(target)
	}

	pub fn overrides(&self) -> impl Iterator<Item = (&Vec<String>, &AssignmentGroup)> {
		self.overrides.iter()
	}

	pub fn connections(&self) -> &[Connection] {
		&self.connections
	}

	pub fn retypes(&self) -> &[Retype] {
		&self.retypes
	}

	fn push_field(&mut self, field: FlatField) {
		self.field_index.insert(field.field.name.clone(), self.fields.len());
		self.fields.push(field);
	}
}

/// Collects definitions before they are validated and flattened into a [`Library`]
pub struct LibraryBuilder {
	definitions: Vec<Definition>,
	by_name: HashMap<QualifiedName, DefinitionId>,
}

impl Default for LibraryBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl LibraryBuilder {
	pub fn new() -> Self {
		let mut builder = Self {
			definitions: vec![],
			by_name: HashMap::new(),
		};

		for (name, kind) in BUILTINS {
			let id = DefinitionId::new(builder.definitions.len());
			let provenance = Provenance {
				package: BUILTIN_PACKAGE.into(),
				revision: None,
			};
			let def = Definition::new(id, QualifiedName::builtin(name), kind, provenance, SourceLocation::default());
			builder.by_name.insert(def.name.clone(), id);
			builder.definitions.push(def);
		}

		let component = builtin_id(DefinitionKind::Component).index();
		builder.definitions[component].parent = Some(builtin_id(DefinitionKind::Module));
		builder
	}

	/// Built-in root class for the kind
	pub fn builtin(kind: DefinitionKind) -> DefinitionId {
		builtin_id(kind)
	}

	/// Declares a new empty definition inheriting from the built-in root of its kind
	pub fn declare(
		&mut self,
		name: QualifiedName,
		kind: DefinitionKind,
		provenance: Provenance,
		location: SourceLocation,
	) -> Result<DefinitionId, DesignError> {
		if !is_name_valid(&name.name) {
			return Err(DesignError::InvalidName {
				name: name.name,
				location,
			});
		}

		if let Some(existing) = self.by_name.get(&name) {
			return Err(DefinitionNameConflictError {
				first: self.definitions[existing.index()].location.clone(),
				name,
				second: location,
			}
			.into());
		}

		let id = DefinitionId::new(self.definitions.len());
		debug!("Declaring {} `{}` as {:?}", kind, name, id);
		let mut def = Definition::new(id, name.clone(), kind, provenance, location);
		def.parent = Some(builtin_id(kind));
		self.by_name.insert(name, id);
		self.definitions.push(def);
		Ok(id)
	}

	pub fn lookup(&self, name: &QualifiedName) -> Option<DefinitionId> {
		self.by_name.get(name).copied()
	}

	pub fn definition(&self, id: DefinitionId) -> Result<&Definition, DesignError> {
		self.definitions.get(id.index()).ok_or(DesignError::InvalidDefinitionId(id))
	}

	/// Built-in definitions cannot be modified
	fn definition_mut(&mut self, id: DefinitionId) -> Result<&mut Definition, DesignError> {
		match self.definitions.get_mut(id.index()) {
			Some(def) if !def.is_builtin() => Ok(def),
			_ => Err(DesignError::InvalidDefinitionId(id)),
		}
	}

	pub fn set_parent(&mut self, id: DefinitionId, parent: DefinitionId) -> Result<(), DesignError> {
		self.definition(parent)?;
		self.definition_mut(id)?.parent = Some(parent);
		Ok(())
	}

	pub fn add_field(&mut self, id: DefinitionId, field: Field) -> Result<(), DesignError> {
		let name_valid = if field.kind.is_port() {
			is_pin_name_valid(&field.name)
		}
		else {
			is_name_valid(&field.name)
		};

		if !name_valid {
			return Err(DesignError::InvalidName {
				name: field.name,
				location: field.location,
			});
		}

		if let FieldKind::Child(class) = field.kind {
			self.definition(class)?;
		}

		let def = self.definition_mut(id)?;
		if let Some(existing) = def.fields.iter().find(|f| f.name == field.name) {
			return Err(FieldNameConflictError {
				definition: def.name.clone(),
				field: field.name,
				first: existing.location.clone(),
				second: field.location,
			}
			.into());
		}

		def.fields.push(field);
		Ok(())
	}

	pub fn add_assignment(&mut self, id: DefinitionId, assignment: Assignment) -> Result<(), DesignError> {
		self.definition_mut(id)?.assignments.push(assignment);
		Ok(())
	}

	pub fn add_connection(&mut self, id: DefinitionId, connection: Connection) -> Result<(), DesignError> {
		self.definition_mut(id)?.connections.push(connection);
		Ok(())
	}

	pub fn add_retype(&mut self, id: DefinitionId, retype: Retype) -> Result<(), DesignError> {
		self.definition(retype.class)?;
		self.definition_mut(id)?.retypes.push(retype);
		Ok(())
	}

	/// Validates the inheritance and instantiation graphs and flattens every definition
	pub fn build(self) -> Result<Library, DesignError> {
		let definitions = self.definitions;

		let mut inheritance = DiGraphMap::<usize, ()>::new();
		for def in &definitions {
			inheritance.add_node(def.id.index());
		}
		for def in &definitions {
			if let Some(parent) = def.parent {
				inheritance.add_edge(def.id.index(), parent.index(), ());
			}
		}

		if let Some(cycle) = find_cycle(&inheritance) {
			return Err(DesignError::CyclicInheritance(Box::new(CycleError {
				location: definitions[cycle[0]].location.clone(),
				cycle: cycle.iter().map(|&i| definitions[i].name.clone()).collect(),
			})));
		}

		for def in &definitions {
			check_parent_kind(&definitions, def)?;
		}

		// Children before parents, so flatten in reverse
		let order = toposort(&inheritance, None).map_err(|cycle| DesignError::InvalidDefinitionId(DefinitionId::new(cycle.node_id())))?;

		let mut flat: Vec<Option<FlatDefinition>> = vec![None; definitions.len()];
		for &index in order.iter().rev() {
			let def = &definitions[index];
			let base = match def.parent {
				Some(parent) => flat[parent.index()].clone().ok_or(DesignError::InvalidDefinitionId(parent))?,
				None => FlatDefinition::empty(def.id),
			};
			flat[index] = Some(flatten(&definitions, def, base)?);
		}
		let flat: Vec<FlatDefinition> = flat.into_iter().flatten().collect();

		let mut instantiation = DiGraphMap::<usize, ()>::new();
		for f in &flat {
			instantiation.add_node(f.id.index());
		}
		for f in &flat {
			for ff in &f.fields {
				if let FieldKind::Child(class) = ff.field.kind {
					instantiation.add_edge(f.id.index(), class.index(), ());
				}
			}
			for retype in &f.retypes {
				instantiation.add_edge(f.id.index(), retype.class.index(), ());
			}
		}

		if let Some(cycle) = find_cycle(&instantiation) {
			return Err(DesignError::RecursiveInstantiation(Box::new(CycleError {
				location: definitions[cycle[0]].location.clone(),
				cycle: cycle.iter().map(|&i| definitions[i].name.clone()).collect(),
			})));
		}

		info!("Library built with {} definitions", definitions.len() - BUILTINS.len());
		Ok(Library {
			definitions,
			flat,
			by_name: self.by_name,
		})
	}
}

fn is_subtype(definitions: &[Definition], sub: DefinitionId, sup: DefinitionId) -> bool {
	let mut current = Some(sub);
	while let Some(id) = current {
		if id == sup {
			return true;
		}
		current = definitions.get(id.index()).and_then(|d| d.parent);
	}
	false
}

fn check_parent_kind(definitions: &[Definition], def: &Definition) -> Result<(), DesignError> {
	let Some(parent) = def.parent.map(|p| &definitions[p.index()]) else {
		return Ok(());
	};

	if def.kind.can_inherit_from(parent.kind) {
		return Ok(());
	}

	let expected = match def.kind {
		DefinitionKind::Module => "module",
		DefinitionKind::Component => "module or component",
		DefinitionKind::Interface => "interface",
	};

	Err(TypeMismatchError {
		definition: def.name.clone(),
		subject: format!("parent `{}`", parent.name),
		expected: expected.into(),
		found: parent.kind.to_string(),
		location: def.location.clone(),
	}
	.into())
}

fn describe_field(definitions: &[Definition], kind: &FieldKind) -> String {
	match kind {
		FieldKind::Pin { role, .. } => format!("{} pin", role),
		FieldKind::Signal { .. } => "signal".into(),
		FieldKind::Parameter { ty, .. } => format!("{} parameter", ty),
		FieldKind::Child(class) => match definitions.get(class.index()) {
			Some(def) => format!("instance of `{}`", def.name),
			None => "instance".into(),
		},
	}
}

/// Merges a redeclared field into the flattened table, keeping the inherited position
fn redeclare(definitions: &[Definition], def: &Definition, existing: &mut FlatField, field: &Field) -> Result<(), DesignError> {
	use FieldKind::*;
	let compatible = match (&existing.field.kind, &field.kind) {
		(Pin { role: a, .. }, Pin { role: b, .. }) => a == b,
		(Signal { .. }, Signal { .. }) => true,
		(Parameter { ty: a, .. }, Parameter { ty: b, .. }) => a.is_compatible_with(b),
		(Child(a), Child(b)) => is_subtype(definitions, *b, *a),
		_ => false,
	};

	if !compatible {
		return Err(TypeMismatchError {
			definition: def.name.clone(),
			subject: format!("field `{}`", field.name),
			expected: describe_field(definitions, &existing.field.kind),
			found: describe_field(definitions, &field.kind),
			location: field.location.clone(),
		}
		.into());
	}

	let mut field = field.clone();
	if let (Parameter { ty: old, .. }, Parameter { ty, .. }) = (&existing.field.kind, &mut field.kind) {
		if *ty == ParamType::Attribute {
			*ty = *old;
		}
	}

	*existing = FlatField {
		field,
		declared_in: def.id,
	};
	Ok(())
}

fn flatten(definitions: &[Definition], def: &Definition, mut flat: FlatDefinition) -> Result<FlatDefinition, DesignError> {
	flat.id = def.id;

	for field in &def.fields {
		let existing = flat.field_index.get(&field.name).copied();
		match existing {
			Some(index) => redeclare(definitions, def, &mut flat.fields[index], field)?,
			None => flat.push_field(FlatField {
				field: field.clone(),
				declared_in: def.id,
			}),
		}
	}

	let mut defaults: BTreeMap<String, Vec<Assignment>> = BTreeMap::new();
	let mut overrides: BTreeMap<Vec<String>, Vec<Assignment>> = BTreeMap::new();
	for assignment in &def.assignments {
		if !assignment.is_local() {
			overrides.entry(assignment.target.clone()).or_default().push(assignment.clone());
			continue;
		}

		let name = &assignment.target[0];
		let existing = flat.field(name).map(|f| f.field.kind.clone());
		match existing {
			Some(FieldKind::Parameter { .. }) => {},
			Some(other) => {
				return Err(TypeMismatchError {
					definition: def.name.clone(),
					subject: format!("assignment target `{}`", name),
					expected: "parameter".into(),
					found: describe_field(definitions, &other),
					location: assignment.location.clone(),
				}
				.into())
			},
			None => {
				debug!("`{}` declares attribute `{}` by assignment", def.name, name);
				flat.push_field(FlatField {
					field: Field {
						name: name.clone(),
						kind: FieldKind::Parameter {
							ty: ParamType::Attribute,
							required: false,
						},
						location: assignment.location.clone(),
					},
					declared_in: def.id,
				});
			},
		}
		defaults.entry(name.clone()).or_default().push(assignment.clone());
	}

	for (name, assignments) in defaults {
		flat.defaults.insert(
			name,
			AssignmentGroup {
				declared_in: def.id,
				assignments,
			},
		);
	}

	for (target, assignments) in overrides {
		flat.overrides.insert(
			target,
			AssignmentGroup {
				declared_in: def.id,
				assignments,
			},
		);
	}

	flat.connections.extend(def.connections.iter().cloned());
	flat.retypes.extend(def.retypes.iter().cloned());
	Ok(flat)
}

/// Immutable, validated set of definitions with precomputed flattened field tables
#[derive(Debug)]
pub struct Library {
	definitions: Vec<Definition>,
	flat: Vec<FlatDefinition>,
	by_name: HashMap<QualifiedName, DefinitionId>,
}

impl Library {
	pub fn builtin(kind: DefinitionKind) -> DefinitionId {
		builtin_id(kind)
	}

	pub fn definition(&self, id: DefinitionId) -> Result<&Definition, DesignError> {
		self.definitions.get(id.index()).ok_or(DesignError::InvalidDefinitionId(id))
	}

	pub fn flat(&self, id: DefinitionId) -> Result<&FlatDefinition, DesignError> {
		self.flat.get(id.index()).ok_or(DesignError::InvalidDefinitionId(id))
	}

	pub fn lookup(&self, name: &QualifiedName) -> Option<DefinitionId> {
		self.by_name.get(name).copied()
	}

	/// User definitions, without the built-in roots
	pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
		self.definitions.iter().filter(|d| !d.is_builtin())
	}

	pub fn is_subtype(&self, sub: DefinitionId, sup: DefinitionId) -> bool {
		is_subtype(&self.definitions, sub, sup)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::design::{Dimension, Expression, PinRole, Quantity, Value};

	fn loc() -> SourceLocation {
		SourceLocation::new("main.json", 1, 1)
	}

	fn name(n: &str) -> QualifiedName {
		QualifiedName::new("test", "main", n)
	}

	fn pin(n: &str, role: PinRole) -> Field {
		Field {
			name: n.into(),
			kind: FieldKind::Pin { role, required: false },
			location: loc(),
		}
	}

	fn assign(target: &str, value: Expression) -> Assignment {
		Assignment {
			target: target.split('.').map(String::from).collect(),
			value,
			location: loc(),
		}
	}

	fn declare(builder: &mut LibraryBuilder, n: &str, kind: DefinitionKind) -> DefinitionId {
		builder.declare(name(n), kind, Provenance::default(), loc()).unwrap()
	}

	fn resistor(builder: &mut LibraryBuilder) -> DefinitionId {
		let id = declare(builder, "Resistor", DefinitionKind::Component);
		builder.add_field(id, pin("p1", PinRole::Passive)).unwrap();
		builder.add_field(id, pin("p2", PinRole::Passive)).unwrap();
		builder
			.add_field(
				id,
				Field {
					name: "resistance".into(),
					kind: FieldKind::Parameter {
						ty: ParamType::Quantity(Dimension::RESISTANCE),
						required: true,
					},
					location: loc(),
				},
			)
			.unwrap();
		builder
			.add_assignment(id, assign("resistance", Expression::quantity(Quantity::new(1000.0, Dimension::RESISTANCE))))
			.unwrap();
		id
	}

	#[test]
	fn test_flattening_inherits_and_shadows() {
		let mut builder = LibraryBuilder::new();
		let base = resistor(&mut builder);
		let small = declare(&mut builder, "Resistor0402", DefinitionKind::Component);
		builder.set_parent(small, base).unwrap();
		builder.add_assignment(small, assign("package", Expression::text("0402"))).unwrap();
		builder
			.add_assignment(small, assign("resistance", Expression::quantity(Quantity::new(10.0, Dimension::RESISTANCE))))
			.unwrap();
		let library = builder.build().unwrap();

		let flat = library.flat(small).unwrap();
		let names: Vec<&str> = flat.fields().iter().map(|f| f.field.name.as_str()).collect();
		assert_eq!(names, vec!["p1", "p2", "resistance", "package"]);
		assert_eq!(flat.field("p1").unwrap().declared_in, base);
		assert_eq!(
			flat.field("package").unwrap().field.kind,
			FieldKind::Parameter {
				ty: ParamType::Attribute,
				required: false
			}
		);

		let default = flat.default_for("resistance").unwrap();
		assert_eq!(default.declared_in, small);
		assert_eq!(
			default.assignments[0].value.const_eval().unwrap(),
			Value::Quantity(Quantity::new(10.0, Dimension::RESISTANCE))
		);

		assert!(library.is_subtype(small, base));
		assert!(library.is_subtype(small, Library::builtin(DefinitionKind::Module)));
		assert!(!library.is_subtype(base, small));
	}

	#[test]
	fn test_incompatible_redeclaration() {
		let mut builder = LibraryBuilder::new();
		let base = resistor(&mut builder);
		let derived = declare(&mut builder, "Broken", DefinitionKind::Component);
		builder.set_parent(derived, base).unwrap();
		builder.add_field(derived, pin("p1", PinRole::Output)).unwrap();

		match builder.build() {
			Err(DesignError::TypeMismatch(e)) => {
				assert_eq!(e.subject, "field `p1`");
				assert_eq!(e.expected, "passive pin");
				assert_eq!(e.found, "output pin");
			},
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn test_cyclic_inheritance() {
		let mut builder = LibraryBuilder::new();
		let a = declare(&mut builder, "A", DefinitionKind::Module);
		let b = declare(&mut builder, "B", DefinitionKind::Module);
		builder.set_parent(a, b).unwrap();
		builder.set_parent(b, a).unwrap();

		match builder.build() {
			Err(DesignError::CyclicInheritance(e)) => {
				assert_eq!(e.path(), "test::main::A -> test::main::B -> test::main::A");
			},
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn test_recursive_instantiation() {
		let mut builder = LibraryBuilder::new();
		let a = declare(&mut builder, "A", DefinitionKind::Module);
		builder
			.add_field(
				a,
				Field {
					name: "inner".into(),
					kind: FieldKind::Child(a),
					location: loc(),
				},
			)
			.unwrap();

		assert!(matches!(builder.build(), Err(DesignError::RecursiveInstantiation(_))));
	}

	#[test]
	fn test_parent_kind_mismatch() {
		let mut builder = LibraryBuilder::new();
		let module = declare(&mut builder, "Board", DefinitionKind::Module);
		let iface = declare(&mut builder, "Power", DefinitionKind::Interface);
		builder.set_parent(iface, module).unwrap();
		assert!(matches!(builder.build(), Err(DesignError::TypeMismatch(_))));
	}

	#[test]
	fn test_duplicates() {
		let mut builder = LibraryBuilder::new();
		let r = resistor(&mut builder);
		assert!(matches!(
			builder.declare(name("Resistor"), DefinitionKind::Module, Provenance::default(), loc()),
			Err(DesignError::DuplicateDefinition(_))
		));
		assert!(matches!(
			builder.add_field(r, pin("p1", PinRole::Passive)),
			Err(DesignError::DuplicateField(_))
		));
		assert!(matches!(
			builder.add_field(r, pin("not a pin", PinRole::Passive)),
			Err(DesignError::InvalidName { .. })
		));
	}

	#[test]
	fn test_assignment_to_pin() {
		let mut builder = LibraryBuilder::new();
		let r = resistor(&mut builder);
		builder.add_assignment(r, assign("p1", Expression::text("x"))).unwrap();
		assert!(matches!(builder.build(), Err(DesignError::TypeMismatch(_))));
	}

	#[test]
	fn test_builtins_are_immutable() {
		let mut builder = LibraryBuilder::new();
		let module = LibraryBuilder::builtin(DefinitionKind::Module);
		assert!(builder.add_field(module, pin("p1", PinRole::Passive)).is_err());
	}
}
