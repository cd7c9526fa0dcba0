//! Error types for attachment rendering.

use thiserror::Error;

/// A failure rendering one diff's attachment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Links need a server root to point at.
    #[error("cannot build link for card {card_id}: no server root configured")]
    MissingServerRoot { card_id: String },

    /// Card and board links carry the board's team.
    #[error("cannot write notification for card {card_id}: board unknown")]
    MissingBoard { card_id: String },

    /// Writing template output failed.
    #[error("template output error: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Every render failure from one batch. Empty means success.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderErrors(Vec<RenderError>);

impl RenderErrors {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn push(&mut self, err: RenderError) {
        self.0.push(err);
    }

    /// Check if no failures were recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate the failures in the order they occurred.
    pub fn iter(&self) -> impl Iterator<Item = &RenderError> {
        self.0.iter()
    }

    /// `Ok(())` when empty, otherwise the aggregate as an error.
    pub fn into_result(self) -> Result<(), RenderErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for RenderErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "{}", self.0[0]),
            n => {
                write!(f, "{} errors occurred:", n)?;
                for err in &self.0 {
                    write!(f, "\n\t* {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RenderErrors {}
