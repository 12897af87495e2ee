use crate::design::DefinitionId;

use super::{CancellationToken, ElabError};

/// Trait which must be implemented by all elaborators
pub trait Elaborator<R> {
	fn elaborate(&mut self, top: DefinitionId, cancel: &CancellationToken) -> Result<R, ElabError>;
}
