use serde::Serialize;

use super::PortId;

/// References a net in the connectivity graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NetId(usize);

impl NetId {
	pub(crate) fn new(id: usize) -> Self {
		Self(id)
	}

	pub fn index(&self) -> usize {
		self.0
	}
}

/// Equivalence class of electrically connected ports
#[derive(Clone, Debug, Serialize)]
pub struct Net {
	pub id: NetId,
	pub name: String,
	pub ports: Vec<PortId>,
}

/// Final nets plus merge statistics
#[derive(Clone, Debug, Default, Serialize)]
pub struct Connectivity {
	nets: Vec<Net>,
	#[serde(skip)]
	port_nets: Vec<NetId>,
	statements: usize,
	merges: usize,
}

impl Connectivity {
	pub(crate) fn new(nets: Vec<Net>, port_count: usize, statements: usize, merges: usize) -> Self {
		let mut port_nets = vec![NetId(0); port_count];
		for net in &nets {
			for port in &net.ports {
				port_nets[port.index()] = net.id;
			}
		}

		Self {
			nets,
			port_nets,
			statements,
			merges,
		}
	}

	pub fn nets(&self) -> &[Net] {
		&self.nets
	}

	pub fn net(&self, id: NetId) -> &Net {
		&self.nets[id.0]
	}

	pub fn net_of(&self, port: PortId) -> Option<&Net> {
		self.port_nets.get(port.index()).map(|id| &self.nets[id.0])
	}

	/// Number of connection statements that were applied
	pub fn statements(&self) -> usize {
		self.statements
	}

	/// Number of port pairs merged by the statements
	pub fn merges(&self) -> usize {
		self.merges
	}
}
