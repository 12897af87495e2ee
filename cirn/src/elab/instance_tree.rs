use std::collections::HashMap;
use std::fmt::Display;
use std::ops::Range;

use serde::Serialize;

use crate::design::{DefinitionId, DefinitionKind, PinRole, QualifiedName, SourceLocation};

/// Hierarchy path of an instance or port, relative to the top-level instance
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstancePath(Vec<String>);

impl InstancePath {
	pub fn root() -> Self {
		Self(vec![])
	}

	/// Parses a dotted path, an empty string is the root
	pub fn parse(path: &str) -> Self {
		if path.is_empty() || path == "<root>" {
			return Self::root();
		}
		Self(path.split('.').map(String::from).collect())
	}

	pub fn child(&self, name: &str) -> Self {
		let mut segments = self.0.clone();
		segments.push(name.into());
		Self(segments)
	}

	/// Appends a relative path
	pub fn join(&self, relative: &[String]) -> Self {
		let mut segments = self.0.clone();
		segments.extend(relative.iter().cloned());
		Self(segments)
	}

	pub fn segments(&self) -> &[String] {
		&self.0
	}

	pub fn depth(&self) -> usize {
		self.0.len()
	}

	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	pub fn name(&self) -> Option<&str> {
		self.0.last().map(|s| s.as_str())
	}

	pub fn parent(&self) -> Option<InstancePath> {
		if self.is_root() {
			return None;
		}
		Some(Self(self.0[..self.0.len() - 1].to_vec()))
	}
}

impl Display for InstancePath {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.is_root() {
			write!(f, "<root>")
		}
		else {
			write!(f, "{}", self.0.join("."))
		}
	}
}

impl Serialize for InstancePath {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

/// References an instance in an instance tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InstanceId(usize);

impl InstanceId {
	pub fn index(&self) -> usize {
		self.0
	}
}

/// References a port (pin or signal) in an instance tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PortId(usize);

impl PortId {
	pub fn index(&self) -> usize {
		self.0
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
	Pin,
	Signal,
}

/// Marks a port as a constituent of an interface instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InterfaceTag {
	pub instance: InstanceId,
	pub interface: QualifiedName,
	/// Position of the port within the interface, in declaration order
	pub index: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct Port {
	pub id: PortId,
	pub name: String,
	pub path: InstancePath,
	pub kind: PortKind,
	pub role: PinRole,
	pub required: bool,
	pub net_name: Option<String>,
	pub owner: InstanceId,
	pub interface: Option<InterfaceTag>,
	pub location: SourceLocation,
}

#[derive(Clone, Debug, Serialize)]
pub struct Instance {
	pub id: InstanceId,
	pub name: String,
	pub path: InstancePath,
	#[serde(skip)]
	pub definition: DefinitionId,
	#[serde(rename = "definition")]
	pub definition_name: QualifiedName,
	pub kind: DefinitionKind,
	pub parent: Option<InstanceId>,
	pub children: Vec<InstanceId>,
	pub ports: Vec<PortId>,
	pub location: SourceLocation,
	#[serde(skip)]
	subtree: Range<usize>,
	#[serde(skip)]
	port_range: Range<usize>,
}

/// Port as produced by subtree expansion, before ids are assigned
#[derive(Clone, Debug)]
pub(crate) struct PortNode {
	pub name: String,
	pub kind: PortKind,
	pub role: PinRole,
	pub required: bool,
	pub net_name: Option<String>,
	pub location: SourceLocation,
}

/// Expanded instance subtree, before ids are assigned
#[derive(Clone, Debug)]
pub(crate) struct InstanceNode {
	pub name: String,
	pub definition: DefinitionId,
	pub definition_name: QualifiedName,
	pub kind: DefinitionKind,
	pub location: SourceLocation,
	pub ports: Vec<PortNode>,
	pub children: Vec<InstanceNode>,
}

/// Arena of instances and ports. Ids are assigned in depth-first order, so
/// every subtree occupies a contiguous range of instance and port ids.
#[derive(Clone, Debug, Default, Serialize)]
pub struct InstanceTree {
	instances: Vec<Instance>,
	ports: Vec<Port>,
	#[serde(skip)]
	by_path: HashMap<InstancePath, InstanceId>,
	#[serde(skip)]
	port_by_path: HashMap<InstancePath, PortId>,
}

impl InstanceTree {
	/// Splices an expanded tree into the arena
	pub(crate) fn from_root(root: InstanceNode) -> Self {
		let mut tree = Self::default();
		tree.splice(root, None, InstancePath::root());
		tree.tag_interfaces();
		tree
	}

	fn splice(&mut self, node: InstanceNode, parent: Option<InstanceId>, path: InstancePath) -> InstanceId {
		let id = InstanceId(self.instances.len());
		let first_port = self.ports.len();
		self.by_path.insert(path.clone(), id);
		self.instances.push(Instance {
			id,
			name: node.name,
			path: path.clone(),
			definition: node.definition,
			definition_name: node.definition_name,
			kind: node.kind,
			parent,
			children: vec![],
			ports: vec![],
			location: node.location,
			subtree: id.0..id.0 + 1,
			port_range: first_port..first_port,
		});

		for port in node.ports {
			let port_id = PortId(self.ports.len());
			let port_path = path.child(&port.name);
			self.port_by_path.insert(port_path.clone(), port_id);
			self.ports.push(Port {
				id: port_id,
				name: port.name,
				path: port_path,
				kind: port.kind,
				role: port.role,
				required: port.required,
				net_name: port.net_name,
				owner: id,
				interface: None,
				location: port.location,
			});
			self.instances[id.0].ports.push(port_id);
		}

		for child in node.children {
			let child_path = path.child(&child.name);
			let child_id = self.splice(child, Some(id), child_path);
			self.instances[id.0].children.push(child_id);
		}

		let (subtree_end, port_end) = (self.instances.len(), self.ports.len());
		let instance = &mut self.instances[id.0];
		instance.subtree = id.0..subtree_end;
		instance.port_range = first_port..port_end;
		id
	}

	/// Tags ports with their nearest enclosing interface instance
	fn tag_interfaces(&mut self) {
		for index in (0..self.instances.len()).rev() {
			let instance = &self.instances[index];
			if instance.kind != DefinitionKind::Interface {
				continue;
			}

			let id = instance.id;
			let interface = instance.definition_name.clone();
			for (position, port) in instance.port_range.clone().enumerate() {
				let port = &mut self.ports[port];
				if port.interface.is_none() {
					port.interface = Some(InterfaceTag {
						instance: id,
						interface: interface.clone(),
						index: position,
					});
				}
			}
		}
	}

	pub fn root(&self) -> InstanceId {
		InstanceId(0)
	}

	pub fn instance(&self, id: InstanceId) -> &Instance {
		&self.instances[id.0]
	}

	pub fn port(&self, id: PortId) -> &Port {
		&self.ports[id.0]
	}

	pub fn instances(&self) -> &[Instance] {
		&self.instances
	}

	pub fn ports(&self) -> &[Port] {
		&self.ports
	}

	pub fn find(&self, path: &InstancePath) -> Option<InstanceId> {
		self.by_path.get(path).copied()
	}

	pub fn find_port(&self, path: &InstancePath) -> Option<PortId> {
		self.port_by_path.get(path).copied()
	}

	pub fn child(&self, id: InstanceId, name: &str) -> Option<InstanceId> {
		self.instance(id).children.iter().copied().find(|c| self.instance(*c).name == name)
	}

	/// Port declared directly on the instance
	pub fn own_port(&self, id: InstanceId, name: &str) -> Option<PortId> {
		self.instance(id).ports.iter().copied().find(|p| self.port(*p).name == name)
	}

	/// Follows a relative path of child names
	pub fn descend(&self, from: InstanceId, segments: &[String]) -> Option<InstanceId> {
		segments.iter().try_fold(from, |current, name| self.child(current, name))
	}

	/// Ids of all instances in the subtree, including the instance itself
	pub fn subtree_instances(&self, id: InstanceId) -> Range<usize> {
		self.instance(id).subtree.clone()
	}

	/// Ids of all ports in the subtree, in declaration order
	pub fn subtree_ports(&self, id: InstanceId) -> Range<usize> {
		self.instance(id).port_range.clone()
	}

	pub fn subtree_port_ids(&self, id: InstanceId) -> Vec<PortId> {
		self.subtree_ports(id).map(PortId).collect()
	}

	/// Ancestors of the instance with their distance, nearest first
	pub fn ancestors(&self, id: InstanceId) -> impl Iterator<Item = (usize, InstanceId)> + '_ {
		let mut current = self.instance(id).parent;
		let mut distance = 0;
		std::iter::from_fn(move || {
			let ancestor = current?;
			distance += 1;
			current = self.instance(ancestor).parent;
			Some((distance, ancestor))
		})
	}
}
