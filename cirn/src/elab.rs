mod cancel;
mod elaborator;
mod instance_tree;
mod multi_pass_elab;
mod nets;
mod parameters;
mod report;

pub use cancel::CancellationToken;
pub use elaborator::Elaborator;
pub use instance_tree::{Instance, InstanceId, InstancePath, InstanceTree, InterfaceTag, Port, PortId, PortKind};
pub use multi_pass_elab::{ElabOutcome, FullElaborator};
pub use nets::{Connectivity, Net, NetId};
pub use parameters::{InstanceParameters, ParamProvenance, ParamState, Parameter, ParameterTable};
pub use report::{
	CheckRule, DefaultSeverityPolicy, ElabMessage, ElabMessageKind, ElabMessageSeverity, ElabReport, RuleLevel,
	RuleSeverityPolicy, SeverityPolicy,
};

use thiserror::Error;

use crate::design::{DefinitionKind, DesignError, QualifiedName, SourceLocation};

/// Fatal elaboration errors. Per-entity problems end up in the [`ElabReport`] instead.
#[derive(Clone, Debug, Error)]
pub enum ElabError {
	#[error("Elaboration was cancelled")]
	Cancelled,

	#[error("`{name}` is {kind} and cannot be elaborated as a top-level design")]
	InvalidTop { name: QualifiedName, kind: String },

	#[error("Unknown reference `{target}` in `{scope}`")]
	UnknownReference {
		scope: QualifiedName,
		target: String,
		location: SourceLocation,
	},

	#[error("`{path}` cannot be retyped to `{found}`, which is not a subtype of `{expected}`")]
	TypeMismatch {
		path: InstancePath,
		expected: QualifiedName,
		found: QualifiedName,
		location: SourceLocation,
	},

	#[error("Elaboration pass `{0}` requires results of an earlier pass")]
	MissingPassResult(&'static str),

	#[error(transparent)]
	Design(#[from] DesignError),
}

impl ElabError {
	pub fn locations(&self) -> Vec<SourceLocation> {
		match self {
			ElabError::UnknownReference { location, .. } | ElabError::TypeMismatch { location, .. } => {
				vec![location.clone()]
			},
			ElabError::Design(e) => e.locations(),
			_ => vec![],
		}
	}

	pub(crate) fn invalid_top(name: &QualifiedName, kind: DefinitionKind, builtin: bool) -> Self {
		let article = if kind == DefinitionKind::Interface { "an" } else { "a" };
		let kind = if builtin {
			format!("the built-in {}", kind)
		}
		else {
			format!("{} {}", article, kind)
		};
		ElabError::InvalidTop {
			name: name.clone(),
			kind,
		}
	}
}
