use std::collections::HashMap;
use std::ops::Range;

use log::{debug, info};
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;

use crate::design::{Connection, DefinitionKind, Library};
use crate::elab::{
	Connectivity, ElabError, ElabMessageKind, InstanceId, InstanceTree, Net, NetId, PortId, PortKind,
};

use super::full_elab::{FullElabCtx, PendingMessage};
use super::ElabPass;

/// Resolved end of a connection statement
#[derive(Clone, Copy, Debug)]
enum Endpoint {
	Port(PortId),
	Interface(InstanceId),
}

/// Port pairs produced by one accepted connection statement
struct Statement {
	owner: InstanceId,
	pairs: Vec<(PortId, PortId)>,
}

struct Connector<'a> {
	library: &'a Library,
	tree: &'a InstanceTree,
	messages: Vec<PendingMessage>,
}

impl<'a> Connector<'a> {
	fn endpoint(&self, owner: InstanceId, path: &[String]) -> Result<Result<Endpoint, ElabMessageKind>, ElabError> {
		let target = path.join(".");
		let Some((name, prefix)) = path.split_last()
		else {
			return Ok(Err(ElabMessageKind::UnknownReference { target }));
		};
		let Some(instance) = self.tree.descend(owner, prefix)
		else {
			return Ok(Err(ElabMessageKind::UnknownReference { target }));
		};

		if let Some(port) = self.tree.own_port(instance, name) {
			return Ok(Ok(Endpoint::Port(port)));
		}

		if let Some(child) = self.tree.child(instance, name) {
			return Ok(match self.tree.instance(child).kind {
				DefinitionKind::Interface => Ok(Endpoint::Interface(child)),
				_ => Err(ElabMessageKind::NotConnectable { target }),
			});
		}

		let flat = self.library.flat(self.tree.instance(instance).definition)?;
		Ok(match flat.field(name) {
			Some(_) => Err(ElabMessageKind::NotConnectable { target }),
			None => Err(ElabMessageKind::UnknownReference { target }),
		})
	}

	fn port_name(&self, port: PortId) -> String {
		self.tree.port(port).path.to_string()
	}

	fn instance_name(&self, instance: InstanceId) -> String {
		self.tree.instance(instance).path.to_string()
	}

	/// Expands both ends into index-aligned port pairs
	fn pair_up(&self, left: Endpoint, right: Endpoint) -> Result<Vec<(PortId, PortId)>, ElabMessageKind> {
		match (left, right) {
			(Endpoint::Port(l), Endpoint::Port(r)) => Ok(vec![(l, r)]),
			(Endpoint::Interface(l), Endpoint::Interface(r)) => {
				let (li, ri) = (self.tree.instance(l), self.tree.instance(r));
				let mismatch = |reason: String| ElabMessageKind::InterfaceTypeMismatch {
					left: self.instance_name(l),
					right: self.instance_name(r),
					reason,
				};

				if li.definition != ri.definition {
					return Err(mismatch(format!(
						"`{}` and `{}` are different interfaces",
						li.definition_name, ri.definition_name
					)));
				}

				let (lp, rp) = (self.tree.subtree_port_ids(l), self.tree.subtree_port_ids(r));
				if lp.len() != rp.len() {
					return Err(mismatch(format!("{} pins vs {} pins", lp.len(), rp.len())));
				}

				Ok(lp.into_iter().zip(rp).collect())
			},
			(Endpoint::Port(p), Endpoint::Interface(i)) => Err(ElabMessageKind::InterfaceTypeMismatch {
				left: self.port_name(p),
				right: self.instance_name(i),
				reason: "a pin cannot be connected to an interface".into(),
			}),
			(Endpoint::Interface(i), Endpoint::Port(p)) => Err(ElabMessageKind::InterfaceTypeMismatch {
				left: self.instance_name(i),
				right: self.port_name(p),
				reason: "an interface cannot be connected to a pin".into(),
			}),
		}
	}

	fn statement(&mut self, owner: InstanceId, order: usize, connection: &Connection) -> Result<Option<Statement>, ElabError> {
		let path = self.tree.instance(owner).path.clone();
		let report = |messages: &mut Vec<PendingMessage>, kind| {
			messages.push(PendingMessage::new(kind, &path, order, &connection.location));
		};

		let left = self.endpoint(owner, &connection.left)?;
		let right = self.endpoint(owner, &connection.right)?;
		let (left, right) = match (left, right) {
			(Ok(l), Ok(r)) => (l, r),
			(l, r) => {
				for kind in [l.err(), r.err()].into_iter().flatten() {
					report(&mut self.messages, kind);
				}
				return Ok(None);
			},
		};

		let pairs = match self.pair_up(left, right) {
			Ok(pairs) => pairs,
			Err(kind) => {
				report(&mut self.messages, kind);
				return Ok(None);
			},
		};

		let mut accepted = vec![];
		for (l, r) in pairs {
			let (lp, rp) = (self.tree.port(l), self.tree.port(r));
			if lp.role.is_compatible_with(rp.role) {
				accepted.push((l, r));
				continue;
			}

			let kind = ElabMessageKind::IncompatibleConnection {
				left: lp.path.to_string(),
				left_role: lp.role,
				right: rp.path.to_string(),
				right_role: rp.role,
			};
			report(&mut self.messages, kind);
		}

		Ok(Some(Statement { owner, pairs: accepted }))
	}

	fn statements(&mut self) -> Result<Vec<Statement>, ElabError> {
		let mut statements = vec![];
		for instance in self.tree.instances() {
			let flat = self.library.flat(instance.definition)?;
			let first = flat.fields().len();
			for (index, connection) in flat.connections().iter().enumerate() {
				if let Some(statement) = self.statement(instance.id, first + index, connection)? {
					statements.push(statement);
				}
			}
		}
		Ok(statements)
	}
}

/// Union-find over the ports of one root subtree, indices relative to the range start
fn partition_union_find(ports: Range<usize>, pairs: Vec<(usize, usize)>) -> (Range<usize>, UnionFind<usize>) {
	let mut uf = UnionFind::new(ports.len());
	for (a, b) in pairs {
		uf.union(a - ports.start, b - ports.start);
	}
	(ports, uf)
}

/// Builds disjoint union-find structures per root subtree in parallel and
/// merges them into a single global structure
fn merge_nets(tree: &InstanceTree, statements: &[Statement]) -> Vec<usize> {
	let root = tree.root();
	let pairs_of = |owners: Range<usize>| -> Vec<(usize, usize)> {
		statements
			.iter()
			.filter(|s| owners.contains(&s.owner.index()))
			.flat_map(|s| s.pairs.iter().map(|(a, b)| (a.index(), b.index())))
			.collect()
	};

	let partitions: Vec<(Range<usize>, Vec<(usize, usize)>)> = tree
		.instance(root)
		.children
		.iter()
		.map(|child| (tree.subtree_ports(*child), pairs_of(tree.subtree_instances(*child))))
		.collect();

	let locals: Vec<(Range<usize>, UnionFind<usize>)> = partitions
		.into_par_iter()
		.map(|(ports, pairs)| partition_union_find(ports, pairs))
		.collect();

	let mut global = UnionFind::new(tree.ports().len());
	for (ports, uf) in &locals {
		for local in 0..ports.len() {
			global.union(ports.start + local, ports.start + uf.find(local));
		}
	}

	for statement in statements.iter().filter(|s| s.owner == root) {
		for (a, b) in &statement.pairs {
			global.union(a.index(), b.index());
		}
	}

	global.into_labeling()
}

/// Name requested by a port, scoped by the instance that declares it
pub(super) fn requested_net_name(tree: &InstanceTree, port: PortId) -> Option<String> {
	let port = tree.port(port);
	let name = port.net_name.as_ref()?;
	let owner = &tree.instance(port.owner).path;
	Some(if owner.is_root() {
		name.clone()
	}
	else {
		format!("{}.{}", owner, name)
	})
}

fn net_name(tree: &InstanceTree, ports: &[PortId]) -> String {
	if let Some(name) = ports.iter().filter_map(|p| requested_net_name(tree, *p)).min() {
		return name;
	}

	let signal = ports
		.iter()
		.map(|p| tree.port(*p))
		.filter(|p| p.kind == PortKind::Signal)
		.min_by_key(|p| (p.path.depth(), p.path.to_string()));
	if let Some(signal) = signal {
		return signal.path.to_string();
	}

	format!("net-{}", tree.port(ports[0]).path)
}

/// Nets ordered by their smallest port id
fn collect_nets(tree: &InstanceTree, labels: &[usize]) -> Vec<Net> {
	let mut by_label: HashMap<usize, usize> = HashMap::new();
	let mut members: Vec<Vec<PortId>> = vec![];
	for port in tree.ports() {
		let index = *by_label.entry(labels[port.id.index()]).or_insert_with(|| {
			members.push(vec![]);
			members.len() - 1
		});
		members[index].push(port.id);
	}

	members
		.into_iter()
		.enumerate()
		.map(|(index, ports)| Net {
			id: NetId::new(index),
			name: net_name(tree, &ports),
			ports,
		})
		.collect()
}

/// Merges ports into nets according to connection statements
pub(super) struct ConnectPass;

impl ElabPass<FullElabCtx> for ConnectPass {
	fn name(&self) -> &'static str {
		"ConnectPass"
	}

	fn run(&mut self, mut ctx: FullElabCtx) -> Result<FullElabCtx, ElabError> {
		let library = ctx.library();
		let tree = ctx.instance_tree.take().ok_or(ElabError::MissingPassResult("ConnectPass"))?;

		let mut connector = Connector {
			library: &library,
			tree: &tree,
			messages: vec![],
		};
		let statements = connector.statements()?;
		let messages = connector.messages;

		let merges = statements.iter().map(|s| s.pairs.len()).sum();
		let labels = merge_nets(&tree, &statements);
		let nets = collect_nets(&tree, &labels);
		for net in &nets {
			debug!("Net `{}` has {} ports", net.name, net.ports.len());
		}
		info!(
			"Built {} nets from {} statements ({} merges)",
			nets.len(),
			statements.len(),
			merges
		);

		ctx.add_messages(messages);
		ctx.connectivity = Some(Connectivity::new(nets, tree.ports().len(), statements.len(), merges));
		ctx.instance_tree = Some(tree);
		Ok(ctx)
	}
}
