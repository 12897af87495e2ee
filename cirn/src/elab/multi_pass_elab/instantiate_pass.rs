use log::{debug, info};
use rayon::prelude::*;

use crate::design::{DefinitionId, FieldKind, Library, QualifiedName, Retype, SourceLocation};
use crate::elab::instance_tree::{InstanceNode, PortNode};
use crate::elab::{ElabError, InstancePath, InstanceTree, PortKind};

use super::{full_elab::FullElabCtx, ElabPass};

struct RetypeEntry {
	target: InstancePath,
	class: DefinitionId,
	location: SourceLocation,
}

/// Retypes visible while expanding a subtree, innermost scope last
struct RetypeScope<'a> {
	parent: Option<&'a RetypeScope<'a>>,
	entries: Vec<RetypeEntry>,
}

impl RetypeScope<'_> {
	fn root() -> Self {
		Self {
			parent: None,
			entries: vec![],
		}
	}

	/// The outermost retype of the path wins. Within one scope the last declaration wins.
	fn lookup(&self, path: &InstancePath) -> Option<(DefinitionId, SourceLocation)> {
		if let Some(outer) = self.parent.and_then(|p| p.lookup(path)) {
			return Some(outer);
		}

		self.entries
			.iter()
			.rev()
			.find(|e| &e.target == path)
			.map(|e| (e.class, e.location.clone()))
	}
}

struct Expander<'a> {
	library: &'a Library,
}

impl Expander<'_> {
	fn name_of(&self, id: DefinitionId) -> Result<QualifiedName, ElabError> {
		Ok(self.library.definition(id)?.name().clone())
	}

	/// Retype targets are resolved against declared classes
	fn check_retype_target(&self, owner: DefinitionId, retype: &Retype) -> Result<(), ElabError> {
		let mut class = owner;
		for segment in &retype.target {
			let flat = self.library.flat(class)?;
			match flat.field(segment).map(|f| &f.field.kind) {
				Some(FieldKind::Child(next)) => class = *next,
				_ => {
					return Err(ElabError::UnknownReference {
						scope: self.name_of(owner)?,
						target: retype.target.join("."),
						location: retype.location.clone(),
					})
				},
			}
		}
		Ok(())
	}

	fn expand(
		&self,
		definition: DefinitionId,
		name: String,
		path: InstancePath,
		location: SourceLocation,
		outer: &RetypeScope<'_>,
	) -> Result<InstanceNode, ElabError> {
		let def = self.library.definition(definition)?;
		let flat = self.library.flat(definition)?;

		let mut entries = vec![];
		for retype in flat.retypes() {
			self.check_retype_target(definition, retype)?;
			entries.push(RetypeEntry {
				target: path.join(&retype.target),
				class: retype.class,
				location: retype.location.clone(),
			});
		}
		let scope = RetypeScope {
			parent: Some(outer),
			entries,
		};

		let mut ports = vec![];
		let mut children = vec![];
		for flat_field in flat.fields() {
			let field = &flat_field.field;
			match &field.kind {
				FieldKind::Pin { role, required } => ports.push(PortNode {
					name: field.name.clone(),
					kind: PortKind::Pin,
					role: *role,
					required: *required,
					net_name: None,
					location: field.location.clone(),
				}),
				FieldKind::Signal { role, net_name } => ports.push(PortNode {
					name: field.name.clone(),
					kind: PortKind::Signal,
					role: *role,
					required: false,
					net_name: net_name.clone(),
					location: field.location.clone(),
				}),
				FieldKind::Parameter { .. } => {},
				FieldKind::Child(declared) => {
					let child_path = path.child(&field.name);
					let class = match scope.lookup(&child_path) {
						Some((class, retype_location)) => {
							if !self.library.is_subtype(class, *declared) {
								return Err(ElabError::TypeMismatch {
									path: child_path,
									expected: self.name_of(*declared)?,
									found: self.name_of(class)?,
									location: retype_location,
								});
							}
							debug!("Retyping `{}` to `{}`", child_path, self.name_of(class)?);
							class
						},
						None => *declared,
					};
					children.push((class, field.name.clone(), child_path, field.location.clone()));
				},
			}
		}

		// Siblings are independent, results are collected in declaration order
		let children: Vec<Result<InstanceNode, ElabError>> = children
			.into_par_iter()
			.map(|(class, name, child_path, location)| self.expand(class, name, child_path, location, &scope))
			.collect();
		let children = children.into_iter().collect::<Result<Vec<_>, _>>()?;

		Ok(InstanceNode {
			name,
			definition,
			definition_name: def.name().clone(),
			kind: def.kind(),
			location,
			ports,
			children,
		})
	}
}

/// Expands the top-level definition into the instance tree
pub(super) struct InstantiatePass;

impl ElabPass<FullElabCtx> for InstantiatePass {
	fn name(&self) -> &'static str {
		"InstantiatePass"
	}

	fn run(&mut self, mut ctx: FullElabCtx) -> Result<FullElabCtx, ElabError> {
		let library = ctx.library();
		let top = library.definition(ctx.top())?;
		let expander = Expander { library: &library };
		let root = expander.expand(
			ctx.top(),
			top.name().name.clone(),
			InstancePath::root(),
			top.location().clone(),
			&RetypeScope::root(),
		)?;

		let tree = InstanceTree::from_root(root);
		info!(
			"Instantiated `{}`: {} instances, {} ports",
			top.name(),
			tree.instances().len(),
			tree.ports().len()
		);
		ctx.instance_tree = Some(tree);
		Ok(ctx)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::design::DefinitionKind;
	use crate::elab::{CancellationToken, Elaborator, FullElaborator};
	use crate::test_utils::LibraryFixture;

	#[test]
	fn test_hierarchy_expansion() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		let divider = fx.module("Divider", &["top", "out", "bottom"]);
		fx.child(divider, "r_top", resistor);
		fx.child(divider, "r_bottom", resistor);
		let board = fx.module("Board", &[]);
		fx.child(board, "div", divider);
		let library = fx.build();

		let outcome = FullElaborator::new(library)
			.elaborate(board, &CancellationToken::new())
			.unwrap();
		let design = outcome.design.unwrap();
		let paths: Vec<String> = design.instances().iter().map(|i| i.path.to_string()).collect();
		assert_eq!(paths, vec!["<root>", "div", "div.r_top", "div.r_bottom"]);
		assert_eq!(design.ports().len(), 7);
		assert_eq!(design.port("div.r_bottom.p2").unwrap().owner, design.instance("div.r_bottom").unwrap().id);
		assert_eq!(design.instance("div.r_top").unwrap().kind, DefinitionKind::Component);
	}

	#[test]
	fn test_outermost_retype_wins() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		let small = fx.derived_component("Resistor0402", resistor);
		let tiny = fx.derived_component("Resistor0201", resistor);
		let divider = fx.module("Divider", &[]);
		fx.child(divider, "r", resistor);
		fx.retype(divider, "r", small);
		let board = fx.module("Board", &[]);
		fx.child(board, "div", divider);
		fx.retype(board, "div.r", tiny);
		let library = fx.build();

		let outcome = FullElaborator::new(library)
			.elaborate(board, &CancellationToken::new())
			.unwrap();
		let design = outcome.design.unwrap();
		assert_eq!(design.instance("div.r").unwrap().definition, tiny);
	}

	#[test]
	fn test_retype_must_be_subtype() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		let capacitor = fx.component("Capacitor", &["p1", "p2"]);
		let board = fx.module("Board", &[]);
		fx.child(board, "r", resistor);
		fx.retype(board, "r", capacitor);
		let library = fx.build();

		let result = FullElaborator::new(library).elaborate(board, &CancellationToken::new());
		assert!(matches!(result, Err(ElabError::TypeMismatch { .. })));
	}

	#[test]
	fn test_retype_unknown_target() {
		let mut fx = LibraryFixture::new();
		let resistor = fx.component("Resistor", &["p1", "p2"]);
		let board = fx.module("Board", &[]);
		fx.retype(board, "missing", resistor);
		let library = fx.build();

		let result = FullElaborator::new(library).elaborate(board, &CancellationToken::new());
		assert!(matches!(result, Err(ElabError::UnknownReference { .. })));
	}

	#[test]
	fn test_interface_is_not_a_valid_top() {
		let mut fx = LibraryFixture::new();
		let power = fx.interface("Power", &["vcc", "gnd"]);
		let library = fx.build();

		let result = FullElaborator::new(library).elaborate(power, &CancellationToken::new());
		assert!(matches!(result, Err(ElabError::InvalidTop { .. })));
	}

	#[test]
	fn test_cancelled_before_start() {
		let mut fx = LibraryFixture::new();
		let board = fx.module("Board", &["a"]);
		let library = fx.build();

		let token = CancellationToken::new();
		token.cancel();
		let result = FullElaborator::new(library).elaborate(board, &token);
		assert!(matches!(result, Err(ElabError::Cancelled)));
	}
}
