use std::fmt::Display;
use std::ops;

use serde::Serialize;
use thiserror::Error;

const BASE_UNITS: [&str; 7] = ["kg", "m", "s", "A", "K", "mol", "cd"];

/// Physical dimension expressed as exponents of the SI base units
/// (kg, m, s, A, K, mol, cd)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Dimension {
	exponents: [i8; 7],
}

impl Dimension {
	pub const DIMENSIONLESS: Dimension = Dimension::new(0, 0, 0, 0, 0);
	pub const RESISTANCE: Dimension = Dimension::new(1, 2, -3, -2, 0);
	pub const CONDUCTANCE: Dimension = Dimension::new(-1, -2, 3, 2, 0);
	pub const VOLTAGE: Dimension = Dimension::new(1, 2, -3, -1, 0);
	pub const CURRENT: Dimension = Dimension::new(0, 0, 0, 1, 0);
	pub const CAPACITANCE: Dimension = Dimension::new(-1, -2, 4, 2, 0);
	pub const INDUCTANCE: Dimension = Dimension::new(1, 2, -2, -2, 0);
	pub const FREQUENCY: Dimension = Dimension::new(0, 0, -1, 0, 0);
	pub const TIME: Dimension = Dimension::new(0, 0, 1, 0, 0);
	pub const POWER: Dimension = Dimension::new(1, 2, -3, 0, 0);
	pub const ENERGY: Dimension = Dimension::new(1, 2, -2, 0, 0);
	pub const CHARGE: Dimension = Dimension::new(0, 0, 1, 1, 0);
	pub const TEMPERATURE: Dimension = Dimension::new(0, 0, 0, 0, 1);
	pub const LENGTH: Dimension = Dimension::new(0, 1, 0, 0, 0);

	pub const fn new(kg: i8, m: i8, s: i8, a: i8, k: i8) -> Self {
		Self {
			exponents: [kg, m, s, a, k, 0, 0],
		}
	}

	pub fn is_dimensionless(&self) -> bool {
		*self == Self::DIMENSIONLESS
	}

	/// Looks up a dimension by its kind name (e.g. `resistance`)
	pub fn from_kind_name(name: &str) -> Option<Dimension> {
		KINDS.iter().find(|(kind, _)| *kind == name).map(|(_, dim)| *dim)
	}

	/// Kind name of the dimension if it is one of the named ones
	pub fn kind_name(&self) -> Option<&'static str> {
		KINDS.iter().find(|(_, dim)| dim == self).map(|(kind, _)| *kind)
	}

	fn symbol(&self) -> Option<&'static str> {
		SYMBOLS.iter().find(|(dim, _)| dim == self).map(|(_, symbol)| *symbol)
	}
}

const KINDS: &[(&str, Dimension)] = &[
	("dimensionless", Dimension::DIMENSIONLESS),
	("resistance", Dimension::RESISTANCE),
	("conductance", Dimension::CONDUCTANCE),
	("voltage", Dimension::VOLTAGE),
	("current", Dimension::CURRENT),
	("capacitance", Dimension::CAPACITANCE),
	("inductance", Dimension::INDUCTANCE),
	("frequency", Dimension::FREQUENCY),
	("time", Dimension::TIME),
	("power", Dimension::POWER),
	("energy", Dimension::ENERGY),
	("charge", Dimension::CHARGE),
	("temperature", Dimension::TEMPERATURE),
	("length", Dimension::LENGTH),
];

/// Preferred display symbol for each named dimension
const SYMBOLS: &[(Dimension, &str)] = &[
	(Dimension::RESISTANCE, "Ω"),
	(Dimension::CONDUCTANCE, "S"),
	(Dimension::VOLTAGE, "V"),
	(Dimension::CURRENT, "A"),
	(Dimension::CAPACITANCE, "F"),
	(Dimension::INDUCTANCE, "H"),
	(Dimension::FREQUENCY, "Hz"),
	(Dimension::TIME, "s"),
	(Dimension::POWER, "W"),
	(Dimension::ENERGY, "J"),
	(Dimension::CHARGE, "C"),
	(Dimension::TEMPERATURE, "K"),
	(Dimension::LENGTH, "m"),
];

/// Unit symbols accepted in literals: (symbol, scale, dimension)
const UNITS: &[(&str, f64, Dimension)] = &[
	("Ω", 1.0, Dimension::RESISTANCE),
	("ohm", 1.0, Dimension::RESISTANCE),
	("ohms", 1.0, Dimension::RESISTANCE),
	("S", 1.0, Dimension::CONDUCTANCE),
	("V", 1.0, Dimension::VOLTAGE),
	("A", 1.0, Dimension::CURRENT),
	("F", 1.0, Dimension::CAPACITANCE),
	("H", 1.0, Dimension::INDUCTANCE),
	("Hz", 1.0, Dimension::FREQUENCY),
	("s", 1.0, Dimension::TIME),
	("W", 1.0, Dimension::POWER),
	("J", 1.0, Dimension::ENERGY),
	("C", 1.0, Dimension::CHARGE),
	("K", 1.0, Dimension::TEMPERATURE),
	("m", 1.0, Dimension::LENGTH),
	("%", 0.01, Dimension::DIMENSIONLESS),
];

const PREFIXES: &[(&str, f64)] = &[
	("p", 1e-12),
	("n", 1e-9),
	("u", 1e-6),
	("µ", 1e-6),
	("μ", 1e-6),
	("m", 1e-3),
	("k", 1e3),
	("M", 1e6),
	("G", 1e9),
];

/// Prefixes used when formatting, largest first
const DISPLAY_PREFIXES: &[(&str, f64)] = &[
	("G", 1e9),
	("M", 1e6),
	("k", 1e3),
	("", 1.0),
	("m", 1e-3),
	("u", 1e-6),
	("n", 1e-9),
	("p", 1e-12),
];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UnitError {
	#[error("Unknown unit `{0}`")]
	UnknownUnit(String),
}

/// Parses a unit symbol (optionally with an SI prefix) into its scale and dimension.
/// An exact symbol match always wins over a prefixed interpretation, so `m` is meters.
pub fn parse_unit(symbol: &str) -> Result<(f64, Dimension), UnitError> {
	let symbol = symbol.trim();
	if symbol.is_empty() {
		return Ok((1.0, Dimension::DIMENSIONLESS));
	}

	if let Some((_, scale, dim)) = UNITS.iter().find(|(s, _, _)| *s == symbol) {
		return Ok((*scale, *dim));
	}

	for (prefix, prefix_scale) in PREFIXES {
		let Some(rest) = symbol.strip_prefix(prefix) else {
			continue;
		};

		if rest == "%" {
			continue;
		}

		if let Some((_, scale, dim)) = UNITS.iter().find(|(s, _, _)| *s == rest) {
			return Ok((prefix_scale * scale, *dim));
		}
	}

	Err(UnitError::UnknownUnit(symbol.into()))
}

impl Dimension {
	/// Product of two dimensions, `None` if an exponent leaves the `i8` range
	pub fn checked_mul(self, rhs: Dimension) -> Option<Dimension> {
		self.combine(rhs, i8::checked_add)
	}

	/// Quotient of two dimensions, `None` if an exponent leaves the `i8` range
	pub fn checked_div(self, rhs: Dimension) -> Option<Dimension> {
		self.combine(rhs, i8::checked_sub)
	}

	fn combine(self, rhs: Dimension, op: impl Fn(i8, i8) -> Option<i8>) -> Option<Dimension> {
		let mut exponents = self.exponents;
		for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
			*e = op(*e, r)?;
		}
		Some(Dimension { exponents })
	}
}

/// Saturates on overflow, expression evaluation uses the checked variant
impl ops::Mul for Dimension {
	type Output = Dimension;

	fn mul(self, rhs: Dimension) -> Dimension {
		let mut exponents = self.exponents;
		for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
			*e = e.saturating_add(r);
		}
		Dimension { exponents }
	}
}

/// Saturates on overflow, expression evaluation uses the checked variant
impl ops::Div for Dimension {
	type Output = Dimension;

	fn div(self, rhs: Dimension) -> Dimension {
		let mut exponents = self.exponents;
		for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
			*e = e.saturating_sub(r);
		}
		Dimension { exponents }
	}
}

impl Display for Dimension {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if let Some(kind) = self.kind_name() {
			return write!(f, "{}", kind);
		}

		let parts: Vec<String> = BASE_UNITS
			.iter()
			.zip(self.exponents)
			.filter(|(_, e)| *e != 0)
			.map(|(unit, e)| if e == 1 { unit.to_string() } else { format!("{}^{}", unit, e) })
			.collect();
		write!(f, "{}", parts.join("·"))
	}
}

impl Serialize for Dimension {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

/// Numeric value with a physical dimension, stored in base units
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Quantity {
	pub value: f64,
	pub dimension: Dimension,
}

impl Quantity {
	pub fn new(value: f64, dimension: Dimension) -> Self {
		Self { value, dimension }
	}

	pub fn dimensionless(value: f64) -> Self {
		Self::new(value, Dimension::DIMENSIONLESS)
	}

	/// Builds a quantity from a literal number and an optional unit symbol
	pub fn from_literal(value: f64, unit: Option<&str>) -> Result<Self, UnitError> {
		let (scale, dimension) = parse_unit(unit.unwrap_or(""))?;
		Ok(Self::new(value * scale, dimension))
	}

	/// Compares values with a relative tolerance
	pub fn same_as(&self, other: &Quantity) -> bool {
		if self.dimension != other.dimension {
			return false;
		}
		let scale = self.value.abs().max(other.value.abs());
		(self.value - other.value).abs() <= scale * 1e-12
	}
}

fn format_number(value: f64) -> String {
	let text = format!("{:.6}", value);
	let text = text.trim_end_matches('0').trim_end_matches('.');
	if text == "-0" {
		"0".into()
	}
	else {
		text.into()
	}
}

impl Display for Quantity {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.dimension.is_dimensionless() {
			return write!(f, "{}", format_number(self.value));
		}

		let Some(symbol) = self.dimension.symbol() else {
			return write!(f, "{} {}", format_number(self.value), self.dimension);
		};

		let magnitude = self.value.abs();
		let (prefix, scale) = DISPLAY_PREFIXES
			.iter()
			.find(|(_, scale)| magnitude >= *scale)
			.copied()
			.unwrap_or(("", 1.0));
		let (prefix, scale) = if magnitude == 0.0 { ("", 1.0) } else { (prefix, scale) };
		write!(f, "{}{}{}", format_number(self.value / scale), prefix, symbol)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_parse_plain_units() {
		assert_eq!(parse_unit("Ω"), Ok((1.0, Dimension::RESISTANCE)));
		assert_eq!(parse_unit("ohm"), Ok((1.0, Dimension::RESISTANCE)));
		assert_eq!(parse_unit("Hz"), Ok((1.0, Dimension::FREQUENCY)));
		assert_eq!(parse_unit("m"), Ok((1.0, Dimension::LENGTH)));
		assert_eq!(parse_unit(""), Ok((1.0, Dimension::DIMENSIONLESS)));
	}

	#[test]
	fn test_parse_prefixed_units() {
		let (scale, dim) = parse_unit("kΩ").unwrap();
		assert_eq!(dim, Dimension::RESISTANCE);
		assert_eq!(scale, 1e3);

		let (scale, dim) = parse_unit("uF").unwrap();
		assert_eq!(dim, Dimension::CAPACITANCE);
		assert_eq!(scale, 1e-6);

		let (scale, dim) = parse_unit("mV").unwrap();
		assert_eq!(dim, Dimension::VOLTAGE);
		assert_eq!(scale, 1e-3);

		let (_, dim) = parse_unit("MHz").unwrap();
		assert_eq!(dim, Dimension::FREQUENCY);
	}

	#[test]
	fn test_unknown_units() {
		assert_eq!(parse_unit("furlong"), Err(UnitError::UnknownUnit("furlong".into())));
		assert!(parse_unit("k%").is_err());
		assert!(parse_unit("k").is_err());
	}

	#[test]
	fn test_dimension_algebra() {
		assert_eq!(Dimension::VOLTAGE / Dimension::CURRENT, Dimension::RESISTANCE);
		assert_eq!(Dimension::VOLTAGE * Dimension::CURRENT, Dimension::POWER);
		assert_eq!(Dimension::RESISTANCE * Dimension::CAPACITANCE, Dimension::TIME);
		assert_eq!(Dimension::DIMENSIONLESS / Dimension::TIME, Dimension::FREQUENCY);
		assert_eq!(Dimension::RESISTANCE * Dimension::CONDUCTANCE, Dimension::DIMENSIONLESS);
	}

	#[test]
	fn test_dimension_overflow() {
		let mut dim = Dimension::VOLTAGE;
		for _ in 0..5 {
			dim = dim.checked_mul(dim).unwrap();
		}
		assert_eq!(dim.checked_mul(dim), None);
		assert_eq!(Dimension::DIMENSIONLESS.checked_div(dim).unwrap().checked_div(dim), None);
		assert_eq!(Dimension::VOLTAGE.checked_div(Dimension::CURRENT), Some(Dimension::RESISTANCE));
	}

	#[test]
	fn test_dimension_names() {
		assert_eq!(Dimension::from_kind_name("resistance"), Some(Dimension::RESISTANCE));
		assert_eq!(Dimension::from_kind_name("flux"), None);
		assert_eq!(Dimension::VOLTAGE.to_string(), "voltage");
		assert_eq!((Dimension::VOLTAGE * Dimension::VOLTAGE).to_string(), "kg^2·m^4·s^-6·A^-2");
	}

	#[test]
	fn test_quantity_display() {
		assert_eq!(Quantity::from_literal(10.0, Some("kΩ")).unwrap().to_string(), "10kΩ");
		assert_eq!(Quantity::from_literal(100.0, Some("nF")).unwrap().to_string(), "100nF");
		assert_eq!(Quantity::from_literal(3.3, Some("V")).unwrap().to_string(), "3.3V");
		assert_eq!(Quantity::new(0.0, Dimension::VOLTAGE).to_string(), "0V");
		assert_eq!(Quantity::dimensionless(2.5).to_string(), "2.5");
	}

	#[test]
	fn test_quantity_comparison() {
		let a = Quantity::from_literal(10.0, Some("kΩ")).unwrap();
		let b = Quantity::from_literal(10000.0, Some("Ω")).unwrap();
		let c = Quantity::from_literal(10.0, Some("kHz")).unwrap();
		assert!(a.same_as(&b));
		assert!(!a.same_as(&c));
	}
}
