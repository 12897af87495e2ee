use log::debug;

use super::compiler_diagnostic::{CompilerDiagnostic, ProvidesCompilerDiagnostic};

/// Collects diagnostics of a compilation, errors are kept apart from the rest
#[derive(Clone, Debug, Default)]
pub struct DiagnosticBuffer {
	pub buffer: Vec<CompilerDiagnostic>,
	error_buffer: Vec<CompilerDiagnostic>,
}

impl DiagnosticBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sorts the diagnostic into the right buffer according to its severity
	pub fn push(&mut self, diag: impl ProvidesCompilerDiagnostic) {
		let diag = diag.to_diagnostic();
		debug!("Diagnostic: {}", diag);
		if diag.is_error() {
			self.push_error(diag);
		}
		else {
			self.push_diagnostic(diag);
		}
	}

	pub fn push_diagnostic(&mut self, diag: CompilerDiagnostic) {
		self.buffer.push(diag);
	}

	pub fn push_error(&mut self, diag: CompilerDiagnostic) {
		self.error_buffer.push(diag);
	}

	pub fn contains_errors(&self) -> bool {
		!self.error_buffer.is_empty()
	}

	pub fn errors(&self) -> &[CompilerDiagnostic] {
		&self.error_buffer
	}

	pub fn len(&self) -> usize {
		self.buffer.len() + self.error_buffer.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// All diagnostics, non-errors first
	pub fn iter(&self) -> impl Iterator<Item = &CompilerDiagnostic> {
		self.buffer.iter().chain(self.error_buffer.iter())
	}

	/// Prints the diagnostics and returns the last error
	pub fn print_diagnostics(self) -> miette::Result<()> {
		if !self.buffer.is_empty() {
			eprintln!("During elaboration the following diagnostics were generated:");
		}
		for diag in self.buffer {
			eprintln!("{:?}", miette::Report::new(diag));
		}

		let mut errors = self.error_buffer;
		let Some(last) = errors.pop()
		else {
			return Ok(());
		};

		eprintln!("During elaboration the following errors were generated:");
		for diag in errors {
			eprintln!("{:?}", miette::Report::new(diag));
		}
		Err(miette::Report::new(last))
	}
}

impl ProvidesCompilerDiagnostic for CompilerDiagnostic {
	fn to_diagnostic(&self) -> CompilerDiagnostic {
		self.clone()
	}
}
