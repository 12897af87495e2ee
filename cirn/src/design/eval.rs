use std::fmt::Display;

use serde::Serialize;
use thiserror::Error;

use super::{BinaryOp, Dimension, Quantity};

/// Value of an evaluated parameter expression
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
	Quantity(Quantity),
	Text(String),
	Bool(bool),
}

impl Value {
	pub fn dimension(&self) -> Option<Dimension> {
		match self {
			Value::Quantity(q) => Some(q.dimension),
			_ => None,
		}
	}

	/// Human readable type of the value, used in messages
	pub fn type_name(&self) -> String {
		match self {
			Value::Quantity(q) => format!("{} quantity", q.dimension),
			Value::Text(_) => "text".into(),
			Value::Bool(_) => "bool".into(),
		}
	}

	/// Value equality with a tolerance for quantities
	pub fn same_as(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Quantity(a), Value::Quantity(b)) => a.same_as(b),
			_ => self == other,
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Quantity(q) => write!(f, "{}", q),
			Value::Text(s) => write!(f, "\"{}\"", s),
			Value::Bool(b) => write!(f, "{}", b),
		}
	}
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
	#[error("Dimension mismatch in `{expression}`: {lhs} vs {rhs}")]
	UnitMismatch {
		expression: String,
		lhs: Dimension,
		rhs: Dimension,
	},

	#[error("Operator `{op}` cannot be applied to {operand}")]
	InvalidOperand { op: BinaryOp, operand: String },

	#[error("Negation cannot be applied to {0}")]
	InvalidNegation(String),

	#[error("Dimension of `{0}` is out of range")]
	DimensionOverflow(String),

	#[error("Division by zero in `{0}`")]
	DivisionByZero(String),

	#[error("Unknown reference `{0}`")]
	UnknownReference(String),

	#[error("Referenced parameter `{0}` has no value")]
	Unresolved(String),

	#[error("Cyclic parameter dependency through `{0}`")]
	Cyclic(String),
}

/// Resolves references while evaluating expressions
pub trait EvalContext {
	fn lookup(&mut self, path: &[String]) -> Result<Value, EvalError>;
}

/// Context without any parameters in scope
pub struct ConstContext;

impl EvalContext for ConstContext {
	fn lookup(&mut self, path: &[String]) -> Result<Value, EvalError> {
		Err(EvalError::UnknownReference(path.join(".")))
	}
}
