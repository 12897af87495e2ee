use std::ops;

use super::{BinaryOp, Expression};

macro_rules! impl_binary_op_for_expression {
	($trait: ident, $trait_func: ident, $op: ident) => {
		impl ops::$trait<Expression> for Expression {
			type Output = Expression;

			fn $trait_func(self, rhs: Expression) -> Self::Output {
				Expression::Binary {
					op: BinaryOp::$op,
					lhs: Box::new(self),
					rhs: Box::new(rhs),
				}
			}
		}
	};
}

impl_binary_op_for_expression!(Add, add, Add);
impl_binary_op_for_expression!(Sub, sub, Sub);
impl_binary_op_for_expression!(Mul, mul, Mul);
impl_binary_op_for_expression!(Div, div, Div);

impl ops::Neg for Expression {
	type Output = Expression;

	fn neg(self) -> Self::Output {
		Expression::Negate(Box::new(self))
	}
}
