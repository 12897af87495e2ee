use std::collections::BTreeMap;
use std::fmt::{Debug, Display};

use dyn_clone::DynClone;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::InstancePath;
use crate::design::{Dimension, EvalError, ParamType, PinRole, SourceLocation, Value};

/// Consistency rules applied to the finished design. Names are stable and
/// used in configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CheckRule {
	UnconnectedPin,
	UnresolvedParameter,
	DuplicateNetName,
	FanOut,
	MultipleDrivers,
}

impl CheckRule {
	pub const ALL: [CheckRule; 5] = [
		CheckRule::UnconnectedPin,
		CheckRule::UnresolvedParameter,
		CheckRule::DuplicateNetName,
		CheckRule::FanOut,
		CheckRule::MultipleDrivers,
	];

	pub fn name(self) -> &'static str {
		match self {
			CheckRule::UnconnectedPin => "unconnected-pin",
			CheckRule::UnresolvedParameter => "unresolved-parameter",
			CheckRule::DuplicateNetName => "duplicate-net-name",
			CheckRule::FanOut => "fan-out",
			CheckRule::MultipleDrivers => "multiple-drivers",
		}
	}

	pub fn from_name(name: &str) -> Option<CheckRule> {
		Self::ALL.into_iter().find(|r| r.name() == name)
	}

	pub fn default_level(self) -> RuleLevel {
		match self {
			CheckRule::UnconnectedPin => RuleLevel::Warning,
			CheckRule::UnresolvedParameter => RuleLevel::Error,
			CheckRule::DuplicateNetName => RuleLevel::Error,
			CheckRule::FanOut => RuleLevel::Error,
			CheckRule::MultipleDrivers => RuleLevel::Warning,
		}
	}
}

impl Display for CheckRule {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

/// Configured level of a check rule
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLevel {
	Off,
	Info,
	Warning,
	Error,
}

impl RuleLevel {
	pub fn severity(self) -> Option<ElabMessageSeverity> {
		match self {
			RuleLevel::Off => None,
			RuleLevel::Info => Some(ElabMessageSeverity::Info),
			RuleLevel::Warning => Some(ElabMessageSeverity::Warning),
			RuleLevel::Error => Some(ElabMessageSeverity::Error),
		}
	}
}

/// Decides the severity of elaboration messages
pub trait SeverityPolicy: DynClone + Debug + Send + Sync {
	/// Severity of a message kind, `None` suppresses the message
	fn severity(&self, kind: &ElabMessageKind) -> Option<ElabMessageSeverity>;
}

dyn_clone::clone_trait_object!(SeverityPolicy);

/// Built-in rule levels. Everything that is not a check rule is an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSeverityPolicy;

impl SeverityPolicy for DefaultSeverityPolicy {
	fn severity(&self, kind: &ElabMessageKind) -> Option<ElabMessageSeverity> {
		match kind.rule() {
			Some(rule) => rule.default_level().severity(),
			None => Some(ElabMessageSeverity::Error),
		}
	}
}

/// Rule levels set explicitly (e.g. from project configuration), defaults elsewhere
#[derive(Clone, Debug, Default)]
pub struct RuleSeverityPolicy {
	levels: BTreeMap<CheckRule, RuleLevel>,
}

impl RuleSeverityPolicy {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_level(mut self, rule: CheckRule, level: RuleLevel) -> Self {
		self.set_level(rule, level);
		self
	}

	pub fn set_level(&mut self, rule: CheckRule, level: RuleLevel) {
		self.levels.insert(rule, level);
	}

	pub fn level(&self, rule: CheckRule) -> RuleLevel {
		self.levels.get(&rule).copied().unwrap_or(rule.default_level())
	}
}

impl SeverityPolicy for RuleSeverityPolicy {
	fn severity(&self, kind: &ElabMessageKind) -> Option<ElabMessageSeverity> {
		match kind.rule() {
			Some(rule) => self.level(rule).severity(),
			None => Some(ElabMessageSeverity::Error),
		}
	}
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElabMessageSeverity {
	Info,
	Warning,
	Error,
}

#[derive(Clone, Debug, Error)]
pub enum ElabMessageKind {
	#[error("Evaluation of `{parameter}` failed: {error}")]
	EvalError {
		parameter: String,
		#[source]
		error: EvalError,
	},

	#[error("Dimension mismatch in `{expression}`: {lhs} vs {rhs}")]
	UnitMismatch {
		expression: String,
		lhs: Dimension,
		rhs: Dimension,
	},

	#[error("Parameter `{parameter}` is declared as {expected} but was assigned a {found}")]
	ParameterTypeMismatch {
		parameter: String,
		expected: ParamType,
		found: String,
	},

	#[error("Conflicting values for `{parameter}`: {}", .values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))]
	ParameterConflict { parameter: String, values: Vec<Value> },

	#[error("Required parameter `{parameter}` has no value")]
	ParameterUnresolved { parameter: String },

	#[error("Cyclic parameter dependency through `{parameter}`")]
	CyclicParameterDependency { parameter: String },

	#[error("Unknown reference `{target}`")]
	UnknownReference { target: String },

	#[error("`{target}` does not declare parameter `{parameter}`")]
	UnknownParameter { target: String, parameter: String },

	#[error("`{target}` is neither a pin nor an interface")]
	NotConnectable { target: String },

	#[error("Cannot connect `{left}` ({left_role}) to `{right}` ({right_role})")]
	IncompatibleConnection {
		left: String,
		left_role: PinRole,
		right: String,
		right_role: PinRole,
	},

	#[error("Cannot connect `{left}` to `{right}`: {reason}")]
	InterfaceTypeMismatch { left: String, right: String, reason: String },

	#[error("Required pin `{pin}` is not connected")]
	UnconnectedPin { pin: String },

	#[error("Net name `{name}` is requested by several nets: {}", .nets.join(", "))]
	DuplicateNetName { name: String, nets: Vec<String> },

	#[error("Point-to-point pin `{pin}` is on net `{net}` with {ports} ports")]
	FanOut { pin: String, net: String, ports: usize },

	#[error("Net `{net}` has more than one driver: {}", .drivers.join(", "))]
	MultipleDrivers { net: String, drivers: Vec<String> },
}

impl ElabMessageKind {
	/// Check rule the message belongs to, if any
	pub fn rule(&self) -> Option<CheckRule> {
		use ElabMessageKind::*;
		match self {
			UnconnectedPin { .. } => Some(CheckRule::UnconnectedPin),
			ParameterUnresolved { .. } => Some(CheckRule::UnresolvedParameter),
			DuplicateNetName { .. } => Some(CheckRule::DuplicateNetName),
			FanOut { .. } => Some(CheckRule::FanOut),
			MultipleDrivers { .. } => Some(CheckRule::MultipleDrivers),
			_ => None,
		}
	}

	/// Stable machine readable code
	pub fn code(&self) -> &'static str {
		use ElabMessageKind::*;
		match self {
			ElabMessageKind::EvalError { .. } => "elab::eval_error",
			UnitMismatch { .. } => "elab::unit_mismatch",
			ParameterTypeMismatch { .. } => "elab::parameter_type_mismatch",
			ParameterConflict { .. } => "elab::parameter_conflict",
			ParameterUnresolved { .. } => "elab::parameter_unresolved",
			CyclicParameterDependency { .. } => "elab::cyclic_parameter_dependency",
			UnknownReference { .. } => "elab::unknown_reference",
			UnknownParameter { .. } => "elab::unknown_parameter",
			NotConnectable { .. } => "elab::not_connectable",
			IncompatibleConnection { .. } => "elab::incompatible_connection",
			InterfaceTypeMismatch { .. } => "elab::interface_type_mismatch",
			UnconnectedPin { .. } => "check::unconnected_pin",
			DuplicateNetName { .. } => "check::duplicate_net_name",
			FanOut { .. } => "check::fan_out",
			MultipleDrivers { .. } => "check::multiple_drivers",
		}
	}
}

#[derive(Clone, Debug)]
pub struct ElabMessage {
	kind: ElabMessageKind,
	severity: ElabMessageSeverity,
	path: InstancePath,
	order: usize,
	locations: Vec<SourceLocation>,
}

impl ElabMessage {
	/// Creates a message unless the policy suppresses it
	pub fn new(
		kind: ElabMessageKind,
		path: InstancePath,
		order: usize,
		locations: Vec<SourceLocation>,
		policy: &dyn SeverityPolicy,
	) -> Option<Self> {
		let severity = policy.severity(&kind)?;
		Some(Self {
			kind,
			severity,
			path,
			order,
			locations,
		})
	}

	pub fn kind(&self) -> &ElabMessageKind {
		&self.kind
	}

	pub fn severity(&self) -> ElabMessageSeverity {
		self.severity
	}

	/// Hierarchy path of the instance the message is about
	pub fn path(&self) -> &InstancePath {
		&self.path
	}

	/// Statement or declaration order within the instance
	pub fn order(&self) -> usize {
		self.order
	}

	pub fn locations(&self) -> &[SourceLocation] {
		&self.locations
	}
}

impl Display for ElabMessage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?} in {}: {}", self.severity, self.path, self.kind)
	}
}

#[derive(Clone, Debug, Default)]
pub struct ElabReport {
	messages: Vec<ElabMessage>,
}

impl ElabReport {
	pub fn extend(&mut self, other: ElabReport) {
		for msg in other.messages {
			self.add_message(msg);
		}
	}

	pub fn add_message(&mut self, msg: ElabMessage) {
		debug!("Elab message: {}", msg);
		self.messages.push(msg);
	}

	pub fn messages(&self) -> &[ElabMessage] {
		&self.messages
	}

	pub fn has_errors(&self) -> bool {
		self.count(ElabMessageSeverity::Error) > 0
	}

	pub fn count(&self, severity: ElabMessageSeverity) -> usize {
		self.messages.iter().filter(|m| m.severity == severity).count()
	}

	/// Orders messages by hierarchy path, then statement order. Ties keep emission order.
	pub fn sort(&mut self) {
		self.messages.sort_by(|a, b| (&a.path, a.order).cmp(&(&b.path, b.order)));
	}
}
