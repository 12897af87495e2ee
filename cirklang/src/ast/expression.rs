use cirn::design::SourceLocation;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
	Add,
	Sub,
	Mul,
	Div,
}

/// Parameter expression as produced by the parser
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
	Number {
		value: f64,
		#[serde(default)]
		unit: Option<String>,
		#[serde(default)]
		location: SourceLocation,
	},
	String {
		value: String,
		#[serde(default)]
		location: SourceLocation,
	},
	Bool {
		value: bool,
		#[serde(default)]
		location: SourceLocation,
	},
	/// Dotted path relative to the assigning block
	Ref {
		path: String,
		#[serde(default)]
		location: SourceLocation,
	},
	Binary {
		op: BinaryOperator,
		lhs: Box<Expr>,
		rhs: Box<Expr>,
		#[serde(default)]
		location: SourceLocation,
	},
	Neg {
		operand: Box<Expr>,
		#[serde(default)]
		location: SourceLocation,
	},
}

impl Expr {
	pub fn location(&self) -> &SourceLocation {
		use Expr::*;
		match self {
			Number { location, .. }
			| String { location, .. }
			| Bool { location, .. }
			| Ref { location, .. }
			| Binary { location, .. }
			| Neg { location, .. } => location,
		}
	}

	pub(crate) fn fill_locations(&mut self, file: &str) {
		use Expr::*;
		match self {
			Binary { lhs, rhs, location, .. } => {
				lhs.fill_locations(file);
				rhs.fill_locations(file);
				super::fill_location(location, file);
			},
			Neg { operand, location } => {
				operand.fill_locations(file);
				super::fill_location(location, file);
			},
			Number { location, .. } | String { location, .. } | Bool { location, .. } | Ref { location, .. } => {
				super::fill_location(location, file)
			},
		}
	}
}
