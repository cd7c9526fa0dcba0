//! # corkboard-notify
//!
//! Turns block changes into human-readable chat attachments.
//!
//! - [`Diff`] describes one block's before/after state, its changed named
//!   properties, and nested child diffs (comments, card content).
//! - [`diffs_to_attachments`] renders a batch of diffs into [`Attachment`]s
//!   (pretext + ordered fields). Only card diffs produce attachments.
//!
//! Rendering is pure: the same diffs and options always yield the same
//! attachments. A failure rendering one card is collected into
//! [`RenderErrors`] and does not stop the rest of the batch.
//!
//! ```ignore
//! let outcome = diffs_to_attachments(&diffs, &MarkdownOpts::new("https://boards.example"));
//! for attachment in &outcome.attachments {
//!     println!("{}", attachment.pretext);
//! }
//! outcome.errors.into_result()?;
//! ```

pub mod diff;
pub mod error;
pub mod render;
pub mod templates;

pub use diff::{Change, Diff, PropDiff};
pub use error::{RenderError, RenderErrors};
pub use render::{Attachment, AttachmentField, RenderOutcome, diffs_to_attachments};
pub use templates::{CardTemplate, CardView, MarkdownOpts};
