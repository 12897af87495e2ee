//! Single-flight elaboration: a new run cancels the one in progress and only
//! the most recent run may publish its result
use std::sync::{Arc, Mutex};

use cirn::elab::{CancellationToken, ElabError};
use log::{debug, info};

use crate::package::Resolver;
use crate::project::{Compilation, Project};
use crate::CompilerError;

#[derive(Default)]
struct SessionState {
	generation: u64,
	cancel: CancellationToken,
	latest: Option<Arc<Compilation>>,
}

pub struct ElabSession {
	project: Arc<Project>,
	resolver: Resolver,
	state: Mutex<SessionState>,
}

impl ElabSession {
	pub fn new(project: Arc<Project>, resolver: Resolver) -> Self {
		Self {
			project,
			resolver,
			state: Mutex::new(SessionState::default()),
		}
	}

	/// Starts a new generation and cancels the previous run
	fn begin(&self) -> (u64, CancellationToken) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		state.cancel.cancel();
		state.generation += 1;
		state.cancel = CancellationToken::new();
		debug!("Starting elaboration run #{}", state.generation);
		(state.generation, state.cancel.clone())
	}

	/// Runs the whole pipeline. A run superseded before it finishes
	/// is discarded and reported as cancelled.
	pub fn run(&self, entry: Option<&str>) -> Result<Arc<Compilation>, CompilerError> {
		let (generation, cancel) = self.begin();
		let result = self.project.compile(&self.resolver, entry, &cancel);

		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		if state.generation != generation {
			info!("Discarding result of superseded run #{}", generation);
			return Err(ElabError::Cancelled.into());
		}

		let compilation = Arc::new(result?);
		state.latest = Some(compilation.clone());
		Ok(compilation)
	}

	/// Cancels the run in progress, if any
	pub fn cancel(&self) {
		let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		state.cancel.cancel();
	}

	pub fn generation(&self) -> u64 {
		self.state.lock().unwrap_or_else(|e| e.into_inner()).generation
	}

	/// Result of the most recent successful run
	pub fn latest(&self) -> Option<Arc<Compilation>> {
		self.state.lock().unwrap_or_else(|e| e.into_inner()).latest.clone()
	}
}
