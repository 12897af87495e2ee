use std::collections::BTreeMap;

use log::info;

use crate::design::Library;
use crate::elab::{
	Connectivity, ElabError, ElabMessageKind, InstancePath, InstanceTree, NetId, ParamState, ParameterTable,
	PortKind,
};

use super::connect_pass::requested_net_name;
use super::full_elab::{FullElabCtx, PendingMessage};
use super::ElabPass;

/// Runs every rule over the finished design. Rules never stop early, the
/// severity policy decides what the findings mean.
struct Checker<'a> {
	library: &'a Library,
	tree: &'a InstanceTree,
	parameters: &'a ParameterTable,
	connectivity: &'a Connectivity,
	messages: Vec<PendingMessage>,
}

impl Checker<'_> {
	/// Position of a field in the flattened table of its instance's definition
	fn field_order(&self, path: &InstancePath) -> usize {
		let position = path.parent().zip(path.name()).and_then(|(owner, name)| {
			let owner = self.tree.find(&owner)?;
			let flat = self.library.flat(self.tree.instance(owner).definition).ok()?;
			flat.field_position(name)
		});
		position.unwrap_or_default()
	}

	fn unconnected_pins(&mut self) {
		for net in self.connectivity.nets() {
			let [port] = net.ports[..]
			else {
				continue;
			};

			let port = self.tree.port(port);
			if port.kind == PortKind::Pin && port.required {
				let owner = &self.tree.instance(port.owner).path;
				let order = self.field_order(&port.path);
				self.messages.push(PendingMessage::new(
					ElabMessageKind::UnconnectedPin {
						pin: port.path.to_string(),
					},
					owner,
					order,
					&port.location,
				));
			}
		}
	}

	fn unresolved_parameters(&mut self) {
		for entry in self.parameters.iter() {
			let flat = self.library.flat(self.tree.instance(entry.instance).definition).ok();
			for param in &entry.parameters {
				if !param.required || param.state != ParamState::Unresolved {
					continue;
				}

				// Conflicts were already reported as errors when they were detected
				let parameter = if entry.path.is_root() {
					param.name.clone()
				}
				else {
					format!("{}.{}", entry.path, param.name)
				};
				let order = flat.and_then(|f| f.field_position(&param.name)).unwrap_or_default();
				self.messages.push(PendingMessage::new(
					ElabMessageKind::ParameterUnresolved { parameter },
					&entry.path,
					order,
					&param.declared_at,
				));
			}
		}
	}

	fn fan_out(&mut self) {
		for net in self.connectivity.nets() {
			if net.ports.len() <= 2 {
				continue;
			}

			for port in net.ports.iter().map(|p| self.tree.port(*p)) {
				if port.role.allows_fan_out() {
					continue;
				}

				let owner = &self.tree.instance(port.owner).path;
				let order = self.field_order(&port.path);
				self.messages.push(PendingMessage::new(
					ElabMessageKind::FanOut {
						pin: port.path.to_string(),
						net: net.name.clone(),
						ports: net.ports.len(),
					},
					owner,
					order,
					&port.location,
				));
			}
		}
	}

	fn multiple_drivers(&mut self) {
		for net in self.connectivity.nets() {
			let drivers: Vec<_> = net
				.ports
				.iter()
				.map(|p| self.tree.port(*p))
				.filter(|p| p.role.is_driver())
				.collect();
			if drivers.len() < 2 {
				continue;
			}

			let first = drivers[0];
			let owner = &self.tree.instance(first.owner).path;
			let order = self.field_order(&first.path);
			let mut msg = PendingMessage::new(
				ElabMessageKind::MultipleDrivers {
					net: net.name.clone(),
					drivers: drivers.iter().map(|d| d.path.to_string()).collect(),
				},
				owner,
				order,
				&first.location,
			);
			msg.locations = drivers.iter().map(|d| d.location.clone()).collect();
			self.messages.push(msg);
		}
	}

	/// Net-facing names must be unique within the scope that requests them
	fn duplicate_net_names(&mut self) {
		let mut requests: BTreeMap<(InstancePath, String), Vec<(NetId, usize)>> = BTreeMap::new();
		for net in self.connectivity.nets() {
			for port in net.ports.iter().map(|p| self.tree.port(*p)) {
				let Some(name) = &port.net_name
				else {
					continue;
				};

				let owner = self.tree.instance(port.owner).path.clone();
				let nets = requests.entry((owner, name.clone())).or_default();
				if !nets.iter().any(|(id, _)| *id == net.id) {
					nets.push((net.id, port.id.index()));
				}
			}
		}

		for ((owner, name), nets) in requests {
			if nets.len() < 2 {
				continue;
			}

			let names: Vec<String> = nets
				.iter()
				.map(|(id, _)| self.connectivity.net(*id).name.clone())
				.collect();
			let locations = nets
				.iter()
				.map(|(_, port)| self.tree.ports()[*port].location.clone())
				.collect();

			let first = &self.tree.ports()[nets[0].1];
			let mut msg = PendingMessage::new(
				ElabMessageKind::DuplicateNetName {
					name: requested_net_name(self.tree, first.id).unwrap_or(name),
					nets: names,
				},
				&owner,
				self.field_order(&first.path),
				&first.location,
			);
			msg.locations = locations;
			self.messages.push(msg);
		}
	}

	fn run(mut self) -> Vec<PendingMessage> {
		self.unconnected_pins();
		self.unresolved_parameters();
		self.duplicate_net_names();
		self.fan_out();
		self.multiple_drivers();
		self.messages
	}
}

/// Applies the consistency rules to the elaborated design
pub(super) struct CheckPass;

impl ElabPass<FullElabCtx> for CheckPass {
	fn name(&self) -> &'static str {
		"CheckPass"
	}

	fn run(&mut self, mut ctx: FullElabCtx) -> Result<FullElabCtx, ElabError> {
		let library = ctx.library();
		let missing = ElabError::MissingPassResult("CheckPass");
		let (Some(tree), Some(parameters), Some(connectivity)) =
			(&ctx.instance_tree, &ctx.parameters, &ctx.connectivity)
		else {
			return Err(missing);
		};

		let checker = Checker {
			library: &library,
			tree,
			parameters,
			connectivity,
			messages: vec![],
		};
		let messages = checker.run();
		info!("Checks found {} problems", messages.len());

		ctx.add_messages(messages);
		Ok(ctx)
	}
}
