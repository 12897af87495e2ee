use serde::Serialize;

use super::{InstanceId, InstancePath};
use crate::design::{ParamType, QualifiedName, SourceLocation, Value};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ParamState {
	Unresolved,
	Resolved { value: Value },
	/// Several assignments of equal precedence disagree
	Conflicting { values: Vec<Value> },
}

/// Where the value of a parameter came from
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ParamProvenance {
	Unassigned,
	Default {
		definition: QualifiedName,
	},
	Override {
		assigner: InstancePath,
		definition: QualifiedName,
		distance: usize,
	},
}

#[derive(Clone, Debug, Serialize)]
pub struct Parameter {
	pub name: String,
	#[serde(rename = "type")]
	pub ty: ParamType,
	pub required: bool,
	#[serde(flatten)]
	pub state: ParamState,
	pub provenance: ParamProvenance,
	/// Location of the winning assignment
	pub location: Option<SourceLocation>,
	pub declared_at: SourceLocation,
}

impl Parameter {
	pub fn value(&self) -> Option<&Value> {
		match &self.state {
			ParamState::Resolved { value } => Some(value),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceParameters {
	pub instance: InstanceId,
	pub path: InstancePath,
	pub parameters: Vec<Parameter>,
}

/// Resolved parameters of every instance, indexed by instance id
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct ParameterTable {
	instances: Vec<InstanceParameters>,
}

impl ParameterTable {
	pub(crate) fn push(&mut self, entry: InstanceParameters) {
		self.instances.push(entry);
	}

	/// Parameters of an instance in declaration order
	pub fn of(&self, instance: InstanceId) -> &[Parameter] {
		self.instances
			.get(instance.index())
			.map(|e| e.parameters.as_slice())
			.unwrap_or(&[])
	}

	pub fn get(&self, instance: InstanceId, name: &str) -> Option<&Parameter> {
		self.of(instance).iter().find(|p| p.name == name)
	}

	pub fn iter(&self) -> impl Iterator<Item = &InstanceParameters> {
		self.instances.iter()
	}
}
