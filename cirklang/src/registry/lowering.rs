use cirn::design::{
	Assignment, BinaryOp, Connection, DefinitionId, DefinitionKind, Dimension, Expression, Field, FieldKind,
	LibraryBuilder, ParamType, Provenance, QualifiedName, Quantity, Retype, SourceLocation, UnitError, Value,
};
use log::debug;

use super::namespace::ModuleScope;
use super::{PackageSources, RegistryError};
use crate::ast::{BinaryOperator, BlockDef, BlockKind, Expr, SourceFile, Stmt};

fn kind_of(kind: BlockKind) -> DefinitionKind {
	match kind {
		BlockKind::Module => DefinitionKind::Module,
		BlockKind::Component => DefinitionKind::Component,
		BlockKind::Interface => DefinitionKind::Interface,
	}
}

fn op_of(op: BinaryOperator) -> BinaryOp {
	match op {
		BinaryOperator::Add => BinaryOp::Add,
		BinaryOperator::Sub => BinaryOp::Sub,
		BinaryOperator::Mul => BinaryOp::Mul,
		BinaryOperator::Div => BinaryOp::Div,
	}
}

/// Splits a dotted path into segments, rejecting empty ones
fn split_path(path: &str, location: &SourceLocation) -> Result<Vec<String>, RegistryError> {
	let segments: Vec<String> = path.split('.').map(String::from).collect();
	if segments.iter().any(|s| s.is_empty()) {
		return Err(RegistryError::MalformedPath {
			path: path.into(),
			location: location.clone(),
		});
	}
	Ok(segments)
}

/// Declared parameter type. No dimension means an untyped attribute.
pub(super) fn param_type(dimension: Option<&str>, location: &SourceLocation) -> Result<ParamType, RegistryError> {
	match dimension {
		None => Ok(ParamType::Attribute),
		Some("text") => Ok(ParamType::Text),
		Some("bool") => Ok(ParamType::Bool),
		Some(name) => Dimension::from_kind_name(name)
			.map(ParamType::Quantity)
			.ok_or_else(|| RegistryError::UnknownDimension {
				name: name.into(),
				location: location.clone(),
			}),
	}
}

pub(super) fn lower_expr(expr: &Expr) -> Result<Expression, RegistryError> {
	use Expr::*;
	Ok(match expr {
		Number { value, unit, location } => {
			let quantity = Quantity::from_literal(*value, unit.as_deref()).map_err(|e| match e {
				UnitError::UnknownUnit(unit) => RegistryError::UnknownUnit {
					unit,
					location: location.clone(),
				},
			})?;
			Expression::quantity(quantity)
		},
		String { value, .. } => Expression::text(value),
		Bool { value, .. } => Expression::Constant(Value::Bool(*value)),
		Ref { path, location } => Expression::Reference(split_path(path, location)?),
		Binary { op, lhs, rhs, .. } => Expression::Binary {
			op: op_of(*op),
			lhs: Box::new(lower_expr(lhs)?),
			rhs: Box::new(lower_expr(rhs)?),
		},
		Neg { operand, .. } => Expression::Negate(Box::new(lower_expr(operand)?)),
	})
}

/// Declares every definition of a module without its body
pub(super) fn declare_module(
	builder: &mut LibraryBuilder,
	package: &PackageSources,
	module: &str,
	file: &SourceFile,
) -> Result<(), RegistryError> {
	for def in &file.definitions {
		let name = QualifiedName::new(&package.name, module, &def.name);
		let provenance = Provenance {
			package: package.name.clone(),
			revision: package.revision.as_ref().map(|v| v.to_string()),
		};
		builder.declare(name, kind_of(def.kind), provenance, def.location.clone())?;
	}
	Ok(())
}

/// Lowers parents and bodies of the definitions of one module
pub(super) struct BodyLowering<'s, 'b> {
	pub scope: &'s ModuleScope<'b>,
}

impl BodyLowering<'_, '_> {
	fn id_of(&self, def: &BlockDef) -> Result<DefinitionId, RegistryError> {
		self.scope
			.local(&def.name)
			.ok_or_else(|| RegistryError::UnknownDefinition {
				name: def.name.clone(),
				location: def.location.clone(),
			})
	}

	/// Resolves every name the module uses. Done before the builder is borrowed mutably.
	pub fn lower(&self, file: &SourceFile) -> Result<Vec<LoweredDefinition>, RegistryError> {
		file.definitions
			.iter()
			.map(|def| -> Result<LoweredDefinition, RegistryError> {
				let id = self.id_of(def)?;
				let parent = match &def.parent {
					Some(parent) => Some(self.scope.resolve(parent, &def.location)?),
					None => None,
				};
				let items = def
					.body
					.iter()
					.map(|stmt| self.lower_stmt(stmt))
					.collect::<Result<Vec<_>, _>>()?
					.into_iter()
					.flatten()
					.collect();
				Ok(LoweredDefinition { id, parent, items })
			})
			.collect()
	}

	fn lower_stmt(&self, stmt: &Stmt) -> Result<Vec<BodyItem>, RegistryError> {
		use Stmt::*;
		let field = |name: &str, kind: FieldKind, location: &SourceLocation| {
			BodyItem::Field(Field {
				name: name.into(),
				kind,
				location: location.clone(),
			})
		};

		Ok(match stmt {
			Pin {
				name,
				role,
				required,
				location,
			} => {
				let required = required.unwrap_or(role.required_by_default());
				vec![field(name, FieldKind::Pin { role: *role, required }, location)]
			},
			Signal {
				name,
				role,
				net_name,
				location,
			} => vec![field(
				name,
				FieldKind::Signal {
					role: *role,
					net_name: net_name.clone(),
				},
				location,
			)],
			New { name, class, location } => {
				let class = self.scope.resolve(class, location)?;
				vec![field(name, FieldKind::Child(class), location)]
			},
			Param {
				name,
				dimension,
				default,
				required,
				location,
			} => {
				let ty = param_type(dimension.as_deref(), location)?;
				let mut items = vec![field(name, FieldKind::Parameter { ty, required: *required }, location)];
				if let Some(default) = default {
					items.push(BodyItem::Assignment(Assignment {
						target: vec![name.clone()],
						value: lower_expr(default)?,
						location: default.location().clone(),
					}));
				}
				items
			},
			Assign {
				target,
				value,
				location,
			} => vec![BodyItem::Assignment(Assignment {
				target: split_path(target, location)?,
				value: lower_expr(value)?,
				location: location.clone(),
			})],
			Connect { left, right, location } => vec![BodyItem::Connection(Connection {
				left: split_path(left, location)?,
				right: split_path(right, location)?,
				location: location.clone(),
			})],
			Retype {
				target,
				class,
				location,
			} => vec![BodyItem::Retype(cirn::design::Retype {
				target: split_path(target, location)?,
				class: self.scope.resolve(class, location)?,
				location: location.clone(),
			})],
		})
	}
}

pub(super) enum BodyItem {
	Field(Field),
	Assignment(Assignment),
	Connection(Connection),
	Retype(Retype),
}

/// Definition body with every name resolved, ready to be added to the builder
pub(super) struct LoweredDefinition {
	id: DefinitionId,
	parent: Option<DefinitionId>,
	items: Vec<BodyItem>,
}

impl LoweredDefinition {
	pub fn apply(self, builder: &mut LibraryBuilder) -> Result<(), RegistryError> {
		if let Some(parent) = self.parent {
			builder.set_parent(self.id, parent)?;
		}

		debug!("Lowering {} items into {:?}", self.items.len(), self.id);
		for item in self.items {
			match item {
				BodyItem::Field(field) => builder.add_field(self.id, field)?,
				BodyItem::Assignment(assignment) => builder.add_assignment(self.id, assignment)?,
				BodyItem::Connection(connection) => builder.add_connection(self.id, connection)?,
				BodyItem::Retype(retype) => builder.add_retype(self.id, retype)?,
			}
		}
		Ok(())
	}
}
