use std::error::Error;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;

use cirn::design::SourceLocation;
use miette::{Diagnostic, Severity};

/// A generic compiler diagnostic message
#[derive(Clone, Debug)]
pub struct CompilerDiagnostic {
	severity: Severity,
	error_text: String,
	help_text: Option<String>,
	error_code: Option<String>,
	locations: Vec<SourceLocation>,
	causes: Vec<CompilerDiagnostic>,
}

/// Used to conveniently craft compiler error messages
pub struct CompilerDiagnosticBuilder {
	diag: CompilerDiagnostic,
}

impl From<CompilerDiagnostic> for CompilerDiagnosticBuilder {
	fn from(diag: CompilerDiagnostic) -> Self {
		Self { diag }
	}
}

impl CompilerDiagnosticBuilder {
	/// Creates an error diagnostic from an error type
	pub fn from_error<ErrorType>(err: &ErrorType) -> Self
	where
		ErrorType: Error,
	{
		Self::new_error(&err.to_string())
	}

	/// Creates a new error message
	pub fn new_error(msg: &str) -> Self {
		CompilerDiagnostic::new_error(msg).into()
	}

	/// Creates a new warning message
	pub fn new_warning(msg: &str) -> Self {
		CompilerDiagnostic::new_warning(msg).into()
	}

	/// Creates a new info message
	pub fn new_info(msg: &str) -> Self {
		CompilerDiagnostic::new_info(msg).into()
	}

	/// Overrides the severity
	pub fn severity(mut self, severity: Severity) -> Self {
		self.diag.severity = severity;
		self
	}

	/// Adds a source location. Unknown locations are skipped.
	pub fn location(mut self, location: &SourceLocation) -> Self {
		self.diag.add_location(location);
		self
	}

	pub fn locations<'a>(mut self, locations: impl IntoIterator<Item = &'a SourceLocation>) -> Self {
		for location in locations {
			self.diag.add_location(location);
		}
		self
	}

	/// Attaches an error code
	pub fn error_code(mut self, code: &str) -> Self {
		self.diag.set_error_code(code);
		self
	}

	/// Attaches a help message
	pub fn help(mut self, help: &str) -> Self {
		self.diag.set_help(help);
		self
	}

	/// Appends a diagnostic to the causal chain
	pub fn cause(mut self, cause: CompilerDiagnostic) -> Self {
		self.diag.causes.push(cause);
		self
	}

	/// Returns the new diagnostic
	pub fn build(self) -> CompilerDiagnostic {
		self.diag
	}
}

impl Display for CompilerDiagnostic {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.error_text)?;
		if let Some(location) = self.locations.first() {
			write!(f, " (at {})", location)?;
		}
		Ok(())
	}
}

impl Error for CompilerDiagnostic {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		None
	}
}

impl Diagnostic for CompilerDiagnostic {
	fn code<'a>(&'a self) -> Option<Box<(dyn std::fmt::Display + 'a)>> {
		self.error_code.as_ref().map(|c| Box::new(c) as Box<dyn Display + 'a>)
	}

	fn severity(&self) -> Option<miette::Severity> {
		Some(self.severity)
	}

	/// Help text followed by the remaining source locations
	fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
		let mut lines: Vec<String> = self.help_text.iter().cloned().collect();
		lines.extend(self.locations.iter().skip(1).map(|l| format!("see also {}", l)));
		if lines.is_empty() {
			return None;
		}
		Some(Box::new(lines.join("\n")))
	}

	fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
		if self.causes.is_empty() {
			return None;
		}
		Some(Box::new(self.causes.iter().map(|c| c as &dyn Diagnostic)))
	}
}

impl CompilerDiagnostic {
	/// Creates a new diagnostic message
	fn new(severity: miette::Severity, msg: &str) -> Self {
		Self {
			severity,
			help_text: None,
			error_text: msg.into(),
			error_code: None,
			locations: Vec::new(),
			causes: Vec::new(),
		}
	}

	/// Creates a new error diagnostic
	pub fn new_error(msg: &str) -> Self {
		Self::new(miette::Severity::Error, msg)
	}

	/// Creates a new warning diagnostic
	pub fn new_warning(msg: &str) -> Self {
		Self::new(miette::Severity::Warning, msg)
	}

	/// Creates a new info diagnostic
	pub fn new_info(msg: &str) -> Self {
		Self::new(miette::Severity::Advice, msg)
	}

	pub fn add_location(&mut self, location: &SourceLocation) {
		if location.is_known() {
			self.locations.push(location.clone());
		}
	}

	/// Sets the help message
	pub fn set_help(&mut self, help: &str) {
		self.help_text = Some(help.into());
	}

	/// Set the error code
	pub fn set_error_code(&mut self, code: &str) {
		self.error_code = Some(code.into());
	}

	pub fn message(&self) -> &str {
		&self.error_text
	}

	pub fn error_code_str(&self) -> Option<&str> {
		self.error_code.as_deref()
	}

	pub fn get_severity(&self) -> Severity {
		self.severity
	}

	pub fn is_error(&self) -> bool {
		self.severity == Severity::Error
	}

	pub fn get_locations(&self) -> &[SourceLocation] {
		&self.locations
	}

	pub fn causes(&self) -> &[CompilerDiagnostic] {
		&self.causes
	}
}

/// Indicates that type can provide a CompilerDiagnostic message.
/// All compiler error types must implement this trait.
pub trait ProvidesCompilerDiagnostic {
	/// Must be implemented by the error type
	fn to_diagnostic(&self) -> CompilerDiagnostic;

	/// Returns a diagnostic message builder - useful when you want to modify the message
	fn to_diagnostic_builder(&self) -> CompilerDiagnosticBuilder {
		self.to_diagnostic().into()
	}

	/// Returns a Miette report
	fn to_miette_report(&self) -> miette::Report {
		miette::Report::new(self.to_diagnostic())
	}
}

/// Implements ProvidesCompilerDiagnostic for reference types
/// for convenience
impl<T> ProvidesCompilerDiagnostic for &T
where
	T: ProvidesCompilerDiagnostic,
{
	fn to_diagnostic(&self) -> CompilerDiagnostic {
		(*self).to_diagnostic()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_builder() {
		let first = SourceLocation::new("a.json", 3, 1);
		let second = SourceLocation::new("b.json", 7, 2);
		let diag = CompilerDiagnosticBuilder::new_error("Something broke")
			.location(&first)
			.location(&SourceLocation::default())
			.location(&second)
			.error_code("test::broken")
			.help("Fix it")
			.cause(CompilerDiagnostic::new_info("Because"))
			.build();

		assert!(diag.is_error());
		assert_eq!(diag.to_string(), "Something broke (at a.json:3:1)");
		assert_eq!(diag.get_locations().len(), 2);
		assert_eq!(diag.help().unwrap().to_string(), "Fix it\nsee also b.json:7:2");
		assert_eq!(diag.code().unwrap().to_string(), "test::broken");
		assert_eq!(diag.related().unwrap().count(), 1);
	}
}
