pub mod design;
pub mod elab;
pub mod model;

#[cfg(test)]
mod test_utils;

pub use design::{
	DefinitionId, DefinitionKind, DesignError, Dimension, Expression, Library, LibraryBuilder, PinRole, QualifiedName,
	Quantity, SourceLocation, Value,
};
pub use elab::{CancellationToken, ElabError, ElabOutcome, ElabReport, Elaborator, FullElaborator};
pub use model::ElaboratedDesign;
