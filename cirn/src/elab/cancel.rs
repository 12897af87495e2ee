use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::ElabError;

/// Cooperative cancellation flag shared between a run and whoever may supersede it
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}

	pub fn check(&self) -> Result<(), ElabError> {
		if self.is_cancelled() {
			return Err(ElabError::Cancelled);
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_cancel_is_shared() {
		let token = CancellationToken::new();
		let clone = token.clone();
		assert!(token.check().is_ok());
		clone.cancel();
		assert!(token.is_cancelled());
		assert!(matches!(token.check(), Err(ElabError::Cancelled)));
	}
}
