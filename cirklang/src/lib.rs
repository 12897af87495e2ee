pub mod ast;
pub mod config;
pub mod core;
pub mod package;
pub mod project;
pub mod registry;
pub mod session;

pub use crate::core::{CompilerDiagnostic, CompilerError, DiagnosticBuffer, ProvidesCompilerDiagnostic};
pub use config::ProjectConfig;
pub use project::{Compilation, Project};
pub use session::ElabSession;
