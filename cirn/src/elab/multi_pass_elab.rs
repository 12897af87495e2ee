mod check_pass;
mod connect_pass;
mod full_elab;
mod instantiate_pass;
mod param_pass;

pub use full_elab::{ElabOutcome, FullElaborator};
use log::{debug, info};

use super::{CancellationToken, ElabError, ElabReport};

/// Elaboration pass context (for MultiPassElaborator)
pub trait ElabPassContext {
	fn report(&self) -> &ElabReport;
	fn cancel_token(&self) -> &CancellationToken;
}

/// Elaboration pass trait (for MultiPassElaborator)
pub trait ElabPass<Ctx>: Send
where
	Ctx: ElabPassContext,
{
	/// Returns name of the elaboration pass
	fn name(&self) -> &'static str;

	/// Ran before run() to initialize the pass
	fn init(&mut self, c: Ctx) -> Result<Ctx, ElabError> {
		Ok(c)
	}

	/// Runs the elaboration pass on the specified context
	fn run(&mut self, c: Ctx) -> Result<Ctx, ElabError>;
}

/// Runs a fixed sequence of passes over one context. Cancellation is
/// observed only between passes, so every pass runs to completion.
pub struct MultiPassElaborator<Ctx>
where
	Ctx: ElabPassContext,
{
	passes: Vec<Box<dyn ElabPass<Ctx>>>,
}

impl<Ctx> MultiPassElaborator<Ctx>
where
	Ctx: ElabPassContext,
{
	pub fn new() -> Self {
		Self { passes: vec![] }
	}

	/// Adds a new pass to the elaborator
	pub fn add_pass(&mut self, pass: Box<dyn ElabPass<Ctx>>) {
		info!("Registering elaboration pass: {}", pass.name());
		self.passes.push(pass);
	}

	/// Runs all passes in registration order
	pub fn run(&mut self, mut ctx: Ctx) -> Result<Ctx, ElabError> {
		for pass in &mut self.passes {
			if ctx.cancel_token().is_cancelled() {
				info!("Elaboration cancelled before pass: {}", pass.name());
				return Err(ElabError::Cancelled);
			}

			debug!("Running elaboration pass: {}", pass.name());
			ctx = pass.init(ctx)?;
			ctx = pass.run(ctx)?;
			debug!("Pass {} done, {} messages so far", pass.name(), ctx.report().messages().len());
		}

		ctx.cancel_token().check()?;
		Ok(ctx)
	}
}
