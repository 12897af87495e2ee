use cirn::design::{PinRole, SourceLocation};
use serde::{Deserialize, Serialize};

use super::Expr;

/// Statement in the body of a block definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Stmt {
	Pin {
		name: String,
		#[serde(default)]
		role: PinRole,
		#[serde(default)]
		required: Option<bool>,
		#[serde(default)]
		location: SourceLocation,
	},
	Signal {
		name: String,
		#[serde(default)]
		role: PinRole,
		#[serde(default)]
		net_name: Option<String>,
		#[serde(default)]
		location: SourceLocation,
	},
	/// Nested instance `name = new Class`
	New {
		name: String,
		class: String,
		#[serde(default)]
		location: SourceLocation,
	},
	Param {
		name: String,
		/// Dimension name (`resistance`), `text`, `bool` or absent for untyped attributes
		#[serde(default)]
		dimension: Option<String>,
		#[serde(default)]
		default: Option<Expr>,
		#[serde(default)]
		required: bool,
		#[serde(default)]
		location: SourceLocation,
	},
	Assign {
		target: String,
		value: Expr,
		#[serde(default)]
		location: SourceLocation,
	},
	Connect {
		left: String,
		right: String,
		#[serde(default)]
		location: SourceLocation,
	},
	Retype {
		target: String,
		class: String,
		#[serde(default)]
		location: SourceLocation,
	},
}

impl Stmt {
	pub fn location(&self) -> &SourceLocation {
		use Stmt::*;
		match self {
			Pin { location, .. }
			| Signal { location, .. }
			| New { location, .. }
			| Param { location, .. }
			| Assign { location, .. }
			| Connect { location, .. }
			| Retype { location, .. } => location,
		}
	}

	pub(crate) fn fill_locations(&mut self, file: &str) {
		use Stmt::*;
		match self {
			Param { default, location, .. } => {
				if let Some(default) = default {
					default.fill_locations(file);
				}
				super::fill_location(location, file);
			},
			Assign { value, location, .. } => {
				value.fill_locations(file);
				super::fill_location(location, file);
			},
			Pin { location, .. }
			| Signal { location, .. }
			| New { location, .. }
			| Connect { location, .. }
			| Retype { location, .. } => super::fill_location(location, file),
		}
	}
}
