use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Electrical role of a pin or signal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinRole {
	#[default]
	Passive,
	Input,
	Output,
	Bidirectional,
	OpenCollector,
	PowerIn,
	PowerOut,
	/// Signal-class pin that may only ever be connected to exactly one other pin
	PointToPoint,
	NoConnect,
}

impl PinRole {
	pub const ALL: [PinRole; 9] = [
		PinRole::Passive,
		PinRole::Input,
		PinRole::Output,
		PinRole::Bidirectional,
		PinRole::OpenCollector,
		PinRole::PowerIn,
		PinRole::PowerOut,
		PinRole::PointToPoint,
		PinRole::NoConnect,
	];

	/// Symmetric compatibility matrix for directly connecting two roles
	pub fn is_compatible_with(self, other: PinRole) -> bool {
		use PinRole::*;
		match (self, other) {
			(NoConnect, _) | (_, NoConnect) => false,
			(Passive, _) | (_, Passive) => true,
			(Output | PowerOut, Output | PowerOut) => false,
			(OpenCollector, Output) | (Output, OpenCollector) => false,
			(PowerIn | PowerOut, PowerIn | PowerOut) => true,
			(PowerIn | PowerOut, _) | (_, PowerIn | PowerOut) => false,
			_ => true,
		}
	}

	/// Roles actively driving a net
	pub fn is_driver(self) -> bool {
		matches!(self, PinRole::Output | PinRole::PowerOut)
	}

	pub fn allows_fan_out(self) -> bool {
		self != PinRole::PointToPoint
	}

	/// Whether a pin with this role must be connected unless stated otherwise
	pub fn required_by_default(self) -> bool {
		matches!(self, PinRole::Input | PinRole::PowerIn)
	}

	pub fn name(self) -> &'static str {
		use PinRole::*;
		match self {
			Passive => "passive",
			Input => "input",
			Output => "output",
			Bidirectional => "bidirectional",
			OpenCollector => "open_collector",
			PowerIn => "power_in",
			PowerOut => "power_out",
			PointToPoint => "point_to_point",
			NoConnect => "no_connect",
		}
	}
}

impl Display for PinRole {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use rstest::rstest;

	#[test]
	fn test_matrix_is_symmetric() {
		for a in PinRole::ALL {
			for b in PinRole::ALL {
				assert_eq!(a.is_compatible_with(b), b.is_compatible_with(a), "{} vs {}", a, b);
			}
		}
	}

	#[rstest]
	#[case(PinRole::Passive, PinRole::Output, true)]
	#[case(PinRole::Passive, PinRole::PowerIn, true)]
	#[case(PinRole::Input, PinRole::Output, true)]
	#[case(PinRole::Output, PinRole::Output, false)]
	#[case(PinRole::PowerOut, PinRole::PowerOut, false)]
	#[case(PinRole::Output, PinRole::PowerOut, false)]
	#[case(PinRole::OpenCollector, PinRole::OpenCollector, true)]
	#[case(PinRole::OpenCollector, PinRole::Output, false)]
	#[case(PinRole::PowerIn, PinRole::PowerOut, true)]
	#[case(PinRole::PowerIn, PinRole::Input, false)]
	#[case(PinRole::PointToPoint, PinRole::Bidirectional, true)]
	#[case(PinRole::NoConnect, PinRole::Passive, false)]
	fn test_compatibility(#[case] a: PinRole, #[case] b: PinRole, #[case] expected: bool) {
		assert_eq!(a.is_compatible_with(b), expected);
	}

	#[test]
	fn test_role_properties() {
		assert!(PinRole::Output.is_driver());
		assert!(!PinRole::OpenCollector.is_driver());
		assert!(!PinRole::PointToPoint.allows_fan_out());
		assert!(PinRole::PowerIn.required_by_default());
		assert!(!PinRole::Passive.required_by_default());
	}
}
