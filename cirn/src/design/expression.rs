use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::eval::ConstContext;
use super::{EvalContext, EvalError, Quantity, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
}

impl Display for BinaryOp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let symbol = match self {
			BinaryOp::Add => "+",
			BinaryOp::Sub => "-",
			BinaryOp::Mul => "*",
			BinaryOp::Div => "/",
		};
		write!(f, "{}", symbol)
	}
}

/// Parameter value expression
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
	Constant(Value),
	/// Dotted reference to a parameter, relative to the assigning instance
	Reference(Vec<String>),
	Binary {
		op: BinaryOp,
		lhs: Box<Expression>,
		rhs: Box<Expression>,
	},
	Negate(Box<Expression>),
}

impl Expression {
	pub fn quantity(q: Quantity) -> Self {
		Expression::Constant(Value::Quantity(q))
	}

	pub fn text(s: &str) -> Self {
		Expression::Constant(Value::Text(s.into()))
	}

	pub fn reference(path: &str) -> Self {
		Expression::Reference(path.split('.').map(String::from).collect())
	}

	/// All references appearing in the expression
	pub fn references(&self) -> Vec<&[String]> {
		let mut refs = vec![];
		self.collect_references(&mut refs);
		refs
	}

	fn collect_references<'a>(&'a self, refs: &mut Vec<&'a [String]>) {
		match self {
			Expression::Constant(_) => {},
			Expression::Reference(path) => refs.push(path),
			Expression::Binary { lhs, rhs, .. } => {
				lhs.collect_references(refs);
				rhs.collect_references(refs);
			},
			Expression::Negate(operand) => operand.collect_references(refs),
		}
	}

	pub fn eval(&self, ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
		match self {
			Expression::Constant(v) => Ok(v.clone()),
			Expression::Reference(path) => ctx.lookup(path),
			Expression::Negate(operand) => match operand.eval(ctx)? {
				Value::Quantity(q) => Ok(Value::Quantity(Quantity::new(-q.value, q.dimension))),
				other => Err(EvalError::InvalidNegation(other.type_name())),
			},
			Expression::Binary { op, lhs, rhs } => {
				let lhs = lhs.eval(ctx)?;
				let rhs = rhs.eval(ctx)?;
				self.eval_binary(*op, lhs, rhs)
			},
		}
	}

	/// Evaluates an expression without references
	pub fn const_eval(&self) -> Result<Value, EvalError> {
		self.eval(&mut ConstContext)
	}

	fn eval_binary(&self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
		let (lhs, rhs) = match (lhs, rhs) {
			(Value::Quantity(l), Value::Quantity(r)) => (l, r),
			(Value::Quantity(_), other) | (other, _) => {
				return Err(EvalError::InvalidOperand {
					op,
					operand: other.type_name(),
				})
			},
		};

		let result = match op {
			BinaryOp::Add | BinaryOp::Sub => {
				if lhs.dimension != rhs.dimension {
					return Err(EvalError::UnitMismatch {
						expression: self.to_string(),
						lhs: lhs.dimension,
						rhs: rhs.dimension,
					});
				}
				let value = if op == BinaryOp::Add {
					lhs.value + rhs.value
				}
				else {
					lhs.value - rhs.value
				};
				Quantity::new(value, lhs.dimension)
			},
			BinaryOp::Mul => {
				let dimension = lhs
					.dimension
					.checked_mul(rhs.dimension)
					.ok_or_else(|| EvalError::DimensionOverflow(self.to_string()))?;
				Quantity::new(lhs.value * rhs.value, dimension)
			},
			BinaryOp::Div => {
				if rhs.value == 0.0 {
					return Err(EvalError::DivisionByZero(self.to_string()));
				}
				let dimension = lhs
					.dimension
					.checked_div(rhs.dimension)
					.ok_or_else(|| EvalError::DimensionOverflow(self.to_string()))?;
				Quantity::new(lhs.value / rhs.value, dimension)
			},
		};

		Ok(Value::Quantity(result))
	}
}

impl Display for Expression {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Expression::Constant(v) => write!(f, "{}", v),
			Expression::Reference(path) => write!(f, "{}", path.join(".")),
			Expression::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
			Expression::Negate(operand) => write!(f, "-{}", operand),
		}
	}
}
