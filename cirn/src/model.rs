//! Elaborated design model handed to exporters
use serde::Serialize;

use crate::design::QualifiedName;
use crate::elab::{Connectivity, Instance, InstancePath, InstanceTree, Net, Parameter, ParameterTable, Port};

/// Fully resolved design. Immutable once built; a new elaboration produces a new model.
#[derive(Clone, Debug, Serialize)]
pub struct ElaboratedDesign {
	top: QualifiedName,
	#[serde(flatten)]
	tree: InstanceTree,
	parameters: ParameterTable,
	#[serde(flatten)]
	connectivity: Connectivity,
}

impl ElaboratedDesign {
	pub(crate) fn new(
		top: QualifiedName,
		tree: InstanceTree,
		parameters: ParameterTable,
		connectivity: Connectivity,
	) -> Self {
		Self {
			top,
			tree,
			parameters,
			connectivity,
		}
	}

	pub fn top(&self) -> &QualifiedName {
		&self.top
	}

	pub fn tree(&self) -> &InstanceTree {
		&self.tree
	}

	pub fn connectivity(&self) -> &Connectivity {
		&self.connectivity
	}

	pub fn instances(&self) -> &[Instance] {
		self.tree.instances()
	}

	/// Looks up an instance by its dotted hierarchy path, `""` is the top
	pub fn instance(&self, path: &str) -> Option<&Instance> {
		let id = self.tree.find(&InstancePath::parse(path))?;
		Some(self.tree.instance(id))
	}

	pub fn ports(&self) -> &[Port] {
		self.tree.ports()
	}

	pub fn port(&self, path: &str) -> Option<&Port> {
		let id = self.tree.find_port(&InstancePath::parse(path))?;
		Some(self.tree.port(id))
	}

	pub fn nets(&self) -> &[Net] {
		self.connectivity.nets()
	}

	/// Net the port at `path` belongs to
	pub fn net_of(&self, path: &str) -> Option<&Net> {
		let id = self.tree.find_port(&InstancePath::parse(path))?;
		self.connectivity.net_of(id)
	}

	/// Parameters of the instance at `path` in declaration order
	pub fn parameters(&self, path: &str) -> &[Parameter] {
		match self.tree.find(&InstancePath::parse(path)) {
			Some(id) => self.parameters.of(id),
			None => &[],
		}
	}

	/// Looks up a parameter by its full path, e.g. `R1.resistance`
	pub fn parameter(&self, path: &str) -> Option<&Parameter> {
		let path = InstancePath::parse(path);
		let name = path.name()?;
		let id = self.tree.find(&path.parent()?)?;
		self.parameters.get(id, name)
	}

	pub fn parameter_table(&self) -> &ParameterTable {
		&self.parameters
	}
}
