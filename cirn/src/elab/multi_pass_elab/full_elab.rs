use std::sync::Arc;

use log::info;

use crate::{
	design::{DefinitionId, DefinitionKind, Library, SourceLocation},
	elab::{
		CancellationToken, Connectivity, DefaultSeverityPolicy, ElabError, ElabMessage, ElabMessageKind,
		ElabMessageSeverity, ElabReport, Elaborator, InstancePath, InstanceTree, ParameterTable, SeverityPolicy,
	},
	model::ElaboratedDesign,
};

use super::{
	check_pass::CheckPass, connect_pass::ConnectPass, instantiate_pass::InstantiatePass, param_pass::ParamPass,
	ElabPassContext, MultiPassElaborator,
};

/// Message produced inside a pass before the severity policy is applied
pub(super) struct PendingMessage {
	pub kind: ElabMessageKind,
	pub path: InstancePath,
	pub order: usize,
	pub locations: Vec<SourceLocation>,
}

impl PendingMessage {
	pub fn new(kind: ElabMessageKind, path: &InstancePath, order: usize, location: &SourceLocation) -> Self {
		Self {
			kind,
			path: path.clone(),
			order,
			locations: vec![location.clone()],
		}
	}
}

pub(super) struct FullElabCtx {
	library: Arc<Library>,
	top: DefinitionId,
	cancel: CancellationToken,
	report: ElabReport,
	severity_policy: Box<dyn SeverityPolicy>,

	pub(super) instance_tree: Option<InstanceTree>,
	pub(super) parameters: Option<ParameterTable>,
	pub(super) connectivity: Option<Connectivity>,
}

impl FullElabCtx {
	fn new(
		library: Arc<Library>,
		top: DefinitionId,
		cancel: CancellationToken,
		severity_policy: Box<dyn SeverityPolicy>,
	) -> Self {
		Self {
			library,
			top,
			cancel,
			report: ElabReport::default(),
			severity_policy,
			instance_tree: None,
			parameters: None,
			connectivity: None,
		}
	}

	pub(super) fn add_message(&mut self, msg: PendingMessage) {
		if let Some(msg) = ElabMessage::new(msg.kind, msg.path, msg.order, msg.locations, &*self.severity_policy) {
			self.report.add_message(msg);
		}
	}

	pub(super) fn add_messages(&mut self, messages: Vec<PendingMessage>) {
		for msg in messages {
			self.add_message(msg);
		}
	}

	pub(super) fn library(&self) -> Arc<Library> {
		self.library.clone()
	}

	pub(super) fn top(&self) -> DefinitionId {
		self.top
	}
}

impl ElabPassContext for FullElabCtx {
	fn report(&self) -> &ElabReport {
		&self.report
	}

	fn cancel_token(&self) -> &CancellationToken {
		&self.cancel
	}
}

/// Result of a complete elaboration run
#[derive(Debug)]
pub struct ElabOutcome {
	pub report: ElabReport,
	/// Present only when the report contains no errors
	pub design: Option<ElaboratedDesign>,
}

/// Multi-pass elaborator with all passes
pub struct FullElaborator {
	library: Arc<Library>,
	severity_policy: Box<dyn SeverityPolicy>,
	elaborator: MultiPassElaborator<FullElabCtx>,
}

impl FullElaborator {
	/// Create a new FullElaborator with the default severity policy
	pub fn new(library: Arc<Library>) -> Self {
		Self::with_policy(library, Box::new(DefaultSeverityPolicy))
	}

	/// Create a new FullElaborator and add all passes
	pub fn with_policy(library: Arc<Library>, severity_policy: Box<dyn SeverityPolicy>) -> Self {
		let mut elaborator = MultiPassElaborator::new();
		elaborator.add_pass(Box::new(InstantiatePass));
		elaborator.add_pass(Box::new(ParamPass));
		elaborator.add_pass(Box::new(ConnectPass));
		elaborator.add_pass(Box::new(CheckPass));

		Self {
			library,
			severity_policy,
			elaborator,
		}
	}
}

impl Elaborator<ElabOutcome> for FullElaborator {
	fn elaborate(&mut self, top: DefinitionId, cancel: &CancellationToken) -> Result<ElabOutcome, ElabError> {
		let def = self.library.definition(top)?;
		if def.kind() == DefinitionKind::Interface || def.is_builtin() {
			return Err(ElabError::invalid_top(def.name(), def.kind(), def.is_builtin()));
		}

		info!("Elaborating `{}`", def.name());
		let name = def.name().clone();
		let ctx = FullElabCtx::new(self.library.clone(), top, cancel.clone(), self.severity_policy.clone());
		let ctx = self.elaborator.run(ctx)?;

		let FullElabCtx {
			mut report,
			instance_tree,
			parameters,
			connectivity,
			..
		} = ctx;
		report.sort();

		info!(
			"Elaboration of `{}` finished with {} errors and {} warnings",
			name,
			report.count(ElabMessageSeverity::Error),
			report.count(ElabMessageSeverity::Warning)
		);

		let design = match (report.has_errors(), instance_tree, parameters, connectivity) {
			(false, Some(tree), Some(parameters), Some(connectivity)) => {
				Some(ElaboratedDesign::new(name, tree, parameters, connectivity))
			},
			_ => None,
		};

		Ok(ElabOutcome { report, design })
	}
}
