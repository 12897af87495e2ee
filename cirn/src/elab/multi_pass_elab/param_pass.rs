use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::design::{
	AssignmentGroup, EvalContext, EvalError, FieldKind, FlatDefinition, Library, ParamType, SourceLocation, Value,
};
use crate::elab::parameters::InstanceParameters;
use crate::elab::{
	ElabError, ElabMessageKind, InstanceId, InstanceTree, ParamProvenance, ParamState, Parameter, ParameterTable,
};

use super::full_elab::{FullElabCtx, PendingMessage};
use super::ElabPass;

type SlotKey = (InstanceId, String);

/// Memoised, cycle-aware parameter resolution over an instance tree
struct Solver<'a> {
	library: &'a Library,
	tree: &'a InstanceTree,
	flats: Vec<&'a FlatDefinition>,
	slots: HashMap<SlotKey, Parameter>,
	visiting: HashSet<SlotKey>,
	messages: Vec<PendingMessage>,
}

/// Evaluation scope of an assignment: references are relative to the assigning instance
struct AssignmentScope<'s, 'a> {
	solver: &'s mut Solver<'a>,
	instance: InstanceId,
}

impl EvalContext for AssignmentScope<'_, '_> {
	fn lookup(&mut self, path: &[String]) -> Result<Value, EvalError> {
		let unknown = || EvalError::UnknownReference(path.join("."));
		let (name, prefix) = path.split_last().ok_or_else(unknown)?;
		let target = self.solver.tree.descend(self.instance, prefix).ok_or_else(unknown)?;
		if !self.solver.declares_parameter(target, name) {
			return Err(unknown());
		}
		self.solver.resolve(target, name)
	}
}

impl<'a> Solver<'a> {
	fn new(library: &'a Library, tree: &'a InstanceTree) -> Result<Self, ElabError> {
		let flats = tree
			.instances()
			.iter()
			.map(|i| library.flat(i.definition))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self {
			library,
			tree,
			flats,
			slots: HashMap::new(),
			visiting: HashSet::new(),
			messages: vec![],
		})
	}

	fn declares_parameter(&self, instance: InstanceId, name: &str) -> bool {
		matches!(
			self.flats[instance.index()].field(name).map(|f| &f.field.kind),
			Some(FieldKind::Parameter { .. })
		)
	}

	fn display(&self, instance: InstanceId, name: &str) -> String {
		let path = &self.tree.instance(instance).path;
		if path.is_root() {
			name.into()
		}
		else {
			format!("{}.{}", path, name)
		}
	}

	fn resolve(&mut self, instance: InstanceId, name: &str) -> Result<Value, EvalError> {
		let key = (instance, name.to_string());
		if let Some(param) = self.slots.get(&key) {
			return param.value().cloned().ok_or_else(|| EvalError::Unresolved(self.display(instance, name)));
		}

		if self.visiting.contains(&key) {
			return Err(EvalError::Cyclic(self.display(instance, name)));
		}

		self.visiting.insert(key.clone());
		let param = self.compute(instance, name);
		self.visiting.remove(&key);

		let result = param.value().cloned().ok_or_else(|| EvalError::Unresolved(self.display(instance, name)));
		self.slots.insert(key, param);
		result
	}

	/// Nearest ancestor override wins, the definition default comes last
	fn winning_assignments(&self, instance: InstanceId, name: &str) -> Option<(InstanceId, usize, &'a AssignmentGroup)> {
		let path = self.tree.instance(instance).path.segments();
		for (distance, ancestor) in self.tree.ancestors(instance) {
			let depth = self.tree.instance(ancestor).path.depth();
			let mut target: Vec<String> = path[depth..].to_vec();
			target.push(name.into());

			let flat: &'a FlatDefinition = self.flats[ancestor.index()];
			if let Some(group) = flat.override_for(&target) {
				return Some((ancestor, distance, group));
			}
		}

		let flat: &'a FlatDefinition = self.flats[instance.index()];
		flat.default_for(name).map(|group| (instance, 0, group))
	}

	fn compute(&mut self, instance: InstanceId, name: &str) -> Parameter {
		let flat: &'a FlatDefinition = self.flats[instance.index()];
		let order = flat.field_position(name).unwrap_or_default();
		let (ty, required, declared_at) = match flat.field(name) {
			Some(f) => match &f.field.kind {
				FieldKind::Parameter { ty, required } => (*ty, *required, f.field.location.clone()),
				_ => (ParamType::Attribute, false, f.field.location.clone()),
			},
			None => (ParamType::Attribute, false, SourceLocation::default()),
		};

		let mut param = Parameter {
			name: name.into(),
			ty,
			required,
			state: ParamState::Unresolved,
			provenance: ParamProvenance::Unassigned,
			location: None,
			declared_at,
		};

		let Some((assigner, distance, group)) = self.winning_assignments(instance, name) else {
			return param;
		};

		let definition = match self.library.definition(group.declared_in) {
			Ok(def) => def.name().clone(),
			Err(_) => return param,
		};
		param.provenance = if distance == 0 {
			ParamProvenance::Default { definition }
		}
		else {
			ParamProvenance::Override {
				assigner: self.tree.instance(assigner).path.clone(),
				definition,
				distance,
			}
		};
		param.location = group.assignments.first().map(|a| a.location.clone());

		let mut values: Vec<Value> = vec![];
		for assignment in &group.assignments {
			let mut scope = AssignmentScope {
				solver: self,
				instance: assigner,
			};

			match assignment.value.eval(&mut scope) {
				Ok(value) if !ty.accepts(&value) => {
					self.report(
						ElabMessageKind::ParameterTypeMismatch {
							parameter: self.display(instance, name),
							expected: ty,
							found: value.type_name(),
						},
						instance,
						order,
						&assignment.location,
					);
				},
				Ok(value) => {
					if !values.iter().any(|v| v.same_as(&value)) {
						values.push(value);
					}
				},
				Err(error) => self.report_eval_error(error, instance, name, order, &assignment.location),
			}
		}

		param.state = match values.len() {
			0 => ParamState::Unresolved,
			1 => ParamState::Resolved {
				value: values.remove(0),
			},
			_ => {
				self.report(
					ElabMessageKind::ParameterConflict {
						parameter: self.display(instance, name),
						values: values.clone(),
					},
					instance,
					order,
					&group.assignments[0].location,
				);
				ParamState::Conflicting { values }
			},
		};

		debug!("Parameter `{}` is {:?}", self.display(instance, name), param.state);
		param
	}

	fn report(&mut self, kind: ElabMessageKind, instance: InstanceId, order: usize, location: &SourceLocation) {
		let path = &self.tree.instance(instance).path;
		self.messages.push(PendingMessage::new(kind, path, order, location));
	}

	/// Unresolved dependencies are not reported again, their root cause already was
	fn report_eval_error(
		&mut self,
		error: EvalError,
		instance: InstanceId,
		name: &str,
		order: usize,
		location: &SourceLocation,
	) {
		let parameter = self.display(instance, name);
		let kind = match error {
			EvalError::Unresolved(_) => return,
			EvalError::Cyclic(_) => ElabMessageKind::CyclicParameterDependency { parameter },
			EvalError::UnitMismatch { expression, lhs, rhs } => {
				ElabMessageKind::UnitMismatch { expression, lhs, rhs }
			},
			EvalError::UnknownReference(target) => ElabMessageKind::UnknownReference { target },
			error => ElabMessageKind::EvalError { parameter, error },
		};
		self.report(kind, instance, order, location);
	}

	/// Overrides must name an existing parameter of an existing descendant
	fn validate_overrides(&mut self) {
		for instance in self.tree.instances() {
			let flat: &'a FlatDefinition = self.flats[instance.id.index()];
			let order = flat.fields().len();
			for (target, group) in flat.overrides() {
				let Some((name, prefix)) = target.split_last() else {
					continue;
				};
				let location = &group.assignments[0].location;

				let kind = match self.tree.descend(instance.id, prefix) {
					None => ElabMessageKind::UnknownReference {
						target: target.join("."),
					},
					Some(t) if !self.declares_parameter(t, name) => ElabMessageKind::UnknownParameter {
						target: self.tree.instance(t).path.to_string(),
						parameter: name.clone(),
					},
					Some(_) => continue,
				};
				self.messages.push(PendingMessage::new(kind, &instance.path, order, location));
			}
		}
	}

	fn solve(mut self) -> (ParameterTable, Vec<PendingMessage>) {
		let tree = self.tree;
		for instance in tree.instances() {
			let flat: &'a FlatDefinition = self.flats[instance.id.index()];
			for flat_field in flat.fields() {
				if let FieldKind::Parameter { .. } = flat_field.field.kind {
					// Failures are recorded in the slot and the messages
					let _ = self.resolve(instance.id, &flat_field.field.name);
				}
			}
		}

		self.validate_overrides();

		let mut table = ParameterTable::default();
		for instance in tree.instances() {
			let flat: &'a FlatDefinition = self.flats[instance.id.index()];
			let parameters = flat
				.fields()
				.iter()
				.filter_map(|f| self.slots.remove(&(instance.id, f.field.name.clone())))
				.collect();
			table.push(InstanceParameters {
				instance: instance.id,
				path: instance.path.clone(),
				parameters,
			});
		}

		(table, self.messages)
	}
}

/// Resolves every parameter of every instance
pub(super) struct ParamPass;

impl ElabPass<FullElabCtx> for ParamPass {
	fn name(&self) -> &'static str {
		"ParamPass"
	}

	fn run(&mut self, mut ctx: FullElabCtx) -> Result<FullElabCtx, ElabError> {
		let library = ctx.library();
		let tree = ctx.instance_tree.take().ok_or(ElabError::MissingPassResult("ParamPass"))?;

		let (table, messages) = Solver::new(&library, &tree)?.solve();
		let resolved = table
			.iter()
			.flat_map(|e| e.parameters.iter())
			.filter(|p| p.value().is_some())
			.count();
		info!("Resolved {} parameters, {} messages", resolved, messages.len());

		ctx.add_messages(messages);
		ctx.parameters = Some(table);
		ctx.instance_tree = Some(tree);
		Ok(ctx)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::design::{Dimension, Expression, Quantity};
	use crate::elab::{CancellationToken, ElabMessageSeverity, ElabOutcome, Elaborator, FullElaborator};
	use crate::test_utils::{ohms, volts, LibraryFixture};

	fn resistance() -> ParamType {
		ParamType::Quantity(Dimension::RESISTANCE)
	}

	fn elaborate(fx: LibraryFixture, top: crate::design::DefinitionId) -> ElabOutcome {
		FullElaborator::new(fx.build())
			.elaborate(top, &CancellationToken::new())
			.unwrap()
	}

	fn kinds(outcome: &ElabOutcome) -> Vec<&ElabMessageKind> {
		outcome.report.messages().iter().map(|m| m.kind()).collect()
	}

	#[test]
	fn test_default_and_override() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		fx.param(resistor, "resistance", resistance(), true);
		fx.assign(resistor, "resistance", ohms(1e3));
		let board = fx.module("Board", &[]);
		fx.child(board, "R1", resistor);
		fx.child(board, "R2", resistor);
		fx.assign(board, "R2.resistance", ohms(10e3));

		let outcome = elaborate(fx, board);
		let design = outcome.design.unwrap();
		let r1 = design.parameter("R1.resistance").unwrap();
		let r2 = design.parameter("R2.resistance").unwrap();
		assert!(r1.value().unwrap().same_as(&Value::Quantity(Quantity::new(1e3, Dimension::RESISTANCE))));
		assert!(r2.value().unwrap().same_as(&Value::Quantity(Quantity::new(10e3, Dimension::RESISTANCE))));
		assert!(matches!(r1.provenance, ParamProvenance::Default { .. }));
		assert!(matches!(r2.provenance, ParamProvenance::Override { distance: 1, .. }));
	}

	#[test]
	fn test_nearest_override_wins() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		fx.param(resistor, "resistance", resistance(), true);
		let divider = fx.module("Divider", &[]);
		fx.child(divider, "r", resistor);
		fx.assign(divider, "r.resistance", ohms(2e3));
		let board = fx.module("Board", &[]);
		fx.child(board, "div", divider);
		fx.assign(board, "div.r.resistance", ohms(5e3));

		let outcome = elaborate(fx, board);
		let design = outcome.design.unwrap();
		let param = design.parameter("div.r.resistance").unwrap();
		assert!(param.value().unwrap().same_as(&Value::Quantity(Quantity::new(2e3, Dimension::RESISTANCE))));
		match &param.provenance {
			ParamProvenance::Override { assigner, distance, .. } => {
				assert_eq!(assigner.to_string(), "div");
				assert_eq!(*distance, 1);
			},
			other => panic!("unexpected provenance {:?}", other),
		}
	}

	#[test]
	fn test_references_and_derived_units() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		fx.param(resistor, "resistance", resistance(), true);
		let board = fx.module("Board", &[]);
		fx.param(board, "supply", ParamType::Quantity(Dimension::VOLTAGE), true);
		fx.param(board, "current", ParamType::Quantity(Dimension::CURRENT), true);
		fx.assign(board, "supply", volts(5.0));
		fx.assign(board, "current", Expression::reference("supply") / Expression::reference("R1.resistance"));
		fx.child(board, "R1", resistor);
		fx.assign(board, "R1.resistance", ohms(1e3));

		let outcome = elaborate(fx, board);
		let design = outcome.design.unwrap();
		let current = design.parameter("current").unwrap();
		assert!(current.value().unwrap().same_as(&Value::Quantity(Quantity::new(5e-3, Dimension::CURRENT))));
	}

	#[test]
	fn test_unit_mismatch_is_reported() {
		let mut fx = LibraryFixture::new();
		let board = fx.module("Board", &[]);
		fx.param(board, "sum", ParamType::Attribute, false);
		fx.assign(board, "sum", ohms(10e3) + volts(5.0));

		let outcome = elaborate(fx, board);
		assert!(outcome.design.is_none());
		match kinds(&outcome)[..] {
			[ElabMessageKind::UnitMismatch { lhs, rhs, .. }] => {
				assert_eq!(*lhs, Dimension::RESISTANCE);
				assert_eq!(*rhs, Dimension::VOLTAGE);
			},
			ref other => panic!("unexpected messages {:?}", other),
		}
	}

	#[test]
	fn test_declared_dimension_is_enforced() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		fx.param(resistor, "resistance", resistance(), true);
		let board = fx.module("Board", &[]);
		fx.child(board, "R1", resistor);
		fx.assign(board, "R1.resistance", volts(3.3));

		let outcome = elaborate(fx, board);
		let kinds = kinds(&outcome);
		assert!(matches!(kinds[0], ElabMessageKind::ParameterTypeMismatch { .. }));
		assert!(matches!(kinds[1], ElabMessageKind::ParameterUnresolved { .. }));
	}

	#[test]
	fn test_conflict_at_same_specificity() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		fx.param(resistor, "resistance", resistance(), false);
		let board = fx.module("Board", &[]);
		fx.child(board, "R1", resistor);
		fx.assign(board, "R1.resistance", ohms(1e3));
		fx.assign(board, "R1.resistance", ohms(2e3));

		let outcome = elaborate(fx, board);
		assert!(outcome.report.has_errors());
		assert!(matches!(kinds(&outcome)[..], [ElabMessageKind::ParameterConflict { .. }]));
	}

	#[test]
	fn test_repeated_equal_assignment_is_not_a_conflict() {
		let mut fx = LibraryFixture::new();
		let board = fx.module("Board", &[]);
		fx.param(board, "r", resistance(), false);
		fx.assign(board, "r", ohms(1e3));
		fx.assign(board, "r", ohms(1e3));

		let outcome = elaborate(fx, board);
		assert!(outcome.report.messages().is_empty());
	}

	#[test]
	fn test_cycles_are_detected() {
		let mut fx = LibraryFixture::new();
		let board = fx.module("Board", &[]);
		fx.param(board, "a", resistance(), false);
		fx.param(board, "b", resistance(), false);
		fx.assign(board, "a", Expression::reference("b"));
		fx.assign(board, "b", Expression::reference("a"));

		let outcome = elaborate(fx, board);
		let cyclic: Vec<_> = kinds(&outcome)
			.into_iter()
			.filter(|k| matches!(k, ElabMessageKind::CyclicParameterDependency { .. }))
			.collect();
		assert_eq!(cyclic.len(), 1);
	}

	#[test]
	fn test_unknown_override_targets() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		let board = fx.module("Board", &[]);
		fx.child(board, "R1", resistor);
		fx.assign(board, "R1.capacitance", ohms(1.0));
		fx.assign(board, "R9.resistance", ohms(1.0));

		let outcome = elaborate(fx, board);
		let kinds = kinds(&outcome);
		assert!(kinds.iter().any(|k| matches!(k, ElabMessageKind::UnknownParameter { .. })));
		assert!(kinds.iter().any(|k| matches!(k, ElabMessageKind::UnknownReference { .. })));
	}

	#[test]
	fn test_unresolved_optional_parameter() {
		let mut fx = LibraryFixture::new();
		let board = fx.module("Board", &[]);
		fx.param(board, "tolerance", ParamType::Attribute, false);

		let outcome = elaborate(fx, board);
		assert_eq!(outcome.report.count(ElabMessageSeverity::Error), 0);
		let design = outcome.design.unwrap();
		assert_eq!(design.parameter("tolerance").unwrap().state, ParamState::Unresolved);
	}
}
