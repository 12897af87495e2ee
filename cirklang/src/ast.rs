//! Abstract syntax of one source module, as handed over by the parser in JSON form
mod expression;
mod statement;

use std::path::Path;

use cirn::design::SourceLocation;
use serde::{Deserialize, Serialize};

pub use expression::{BinaryOperator, Expr};
pub use statement::Stmt;

use crate::CompilerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
	Module,
	Component,
	Interface,
}

/// `from <source> import <names>`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Import {
	pub names: Vec<String>,
	/// `<module>` of the same package or `<dependency>/<module>`
	pub from: String,
	#[serde(default)]
	pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
	pub name: String,
	pub kind: BlockKind,
	#[serde(default)]
	pub parent: Option<String>,
	#[serde(default)]
	pub body: Vec<Stmt>,
	#[serde(default)]
	pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
	pub path: String,
	#[serde(default)]
	pub imports: Vec<Import>,
	#[serde(default)]
	pub definitions: Vec<BlockDef>,
}

fn fill_location(location: &mut SourceLocation, file: &str) {
	if location.file.is_empty() {
		location.file = file.into();
	}
}

impl SourceFile {
	/// Parses the JSON form of a module. Nodes without a location point at the file itself.
	pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
		let mut file: SourceFile = serde_json::from_str(text)?;
		let path = file.path.clone();
		for import in &mut file.imports {
			fill_location(&mut import.location, &path);
		}
		for def in &mut file.definitions {
			fill_location(&mut def.location, &path);
			for stmt in &mut def.body {
				stmt.fill_locations(&path);
			}
		}
		Ok(file)
	}

	pub fn open(path: &Path) -> Result<Self, CompilerError> {
		if !path.exists() {
			return Err(CompilerError::FileNotFound(path.display().to_string()));
		}
		let text = std::fs::read_to_string(path)?;
		Self::from_json(&text).map_err(|error| CompilerError::JsonError {
			file: path.display().to_string(),
			error,
		})
	}

	/// Module name, derived from the file name (`src/power.json` is `power`)
	pub fn module_name(&self) -> String {
		Path::new(&self.path)
			.file_stem()
			.map(|s| s.to_string_lossy().into_owned())
			.unwrap_or_default()
	}
}
