//! Diff → chat attachment rendering.
//!
//! Field order in an attachment is user-visible and fixed: the `Title` field,
//! then one field per changed property, then `Comment` fields for added or
//! deleted comments, then `Comment` fields for changed card content.
//!
//! Old values are shown after the new value, struck through and code-quoted:
//! `new  ~~`old`~~` on one line for short fields, on their own paragraph for
//! content.

use serde::{Deserialize, Serialize};

use corkboard_types::BlockType;

use crate::diff::{Change, Diff};
use crate::error::{RenderError, RenderErrors};
use crate::templates::{CardTemplate, CardView, MarkdownOpts};

/// One titled value in an attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    #[serde(default)]
    pub short: bool,
}

impl AttachmentField {
    fn long(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: false,
        }
    }
}

/// A displayable summary of one card's change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub pretext: String,
    pub fallback: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
}

impl Attachment {
    fn with_pretext(pretext: String) -> Self {
        Self {
            fallback: pretext.clone(),
            pretext,
            fields: Vec::new(),
        }
    }
}

/// Attachments for every diff that rendered, plus every failure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    pub attachments: Vec<Attachment>,
    pub errors: RenderErrors,
}

impl RenderOutcome {
    /// The attachments, or the aggregate error if anything failed.
    pub fn into_result(self) -> Result<Vec<Attachment>, RenderErrors> {
        self.errors.into_result()?;
        Ok(self.attachments)
    }
}

/// Render a batch of diffs.
///
/// Only card diffs produce attachments; every other block type is skipped.
/// A card that fails to render is left out and its error collected; the rest
/// of the batch still renders.
pub fn diffs_to_attachments(diffs: &[Diff], opts: &MarkdownOpts) -> RenderOutcome {
    let mut outcome = RenderOutcome::default();
    for diff in diffs.iter().filter(|d| d.block_type == BlockType::Card) {
        match card_diff_to_attachment(diff, opts) {
            Ok(Some(attachment)) => outcome.attachments.push(attachment),
            Ok(None) => {}
            Err(err) => outcome.errors.push(err),
        }
    }
    outcome
}

fn card_diff_to_attachment(
    diff: &Diff,
    opts: &MarkdownOpts,
) -> Result<Option<Attachment>, RenderError> {
    let (Some(change), Some(view)) = (diff.change(), CardView::from_diff(diff, opts)) else {
        return Ok(None);
    };

    let (old, new) = match change {
        Change::Added(_) => {
            return Ok(Some(Attachment::with_pretext(CardTemplate::Added.render(&view)?)));
        }
        Change::Deleted(_) => {
            return Ok(Some(Attachment::with_pretext(CardTemplate::Deleted.render(&view)?)));
        }
        Change::Modified { old, new } => (old, new),
    };

    let mut attachment = Attachment::with_pretext(CardTemplate::Modified.render(&view)?);

    if new.title != old.title {
        attachment
            .fields
            .push(AttachmentField::long("Title", strike_inline(&new.title, &old.title)));
    }

    for prop in diff.prop_diffs.iter().filter(|p| p.is_changed()) {
        attachment.fields.push(AttachmentField::long(
            prop.name.clone(),
            strike_inline(&prop.new_value, &prop.old_value),
        ));
    }

    for child in diff.diffs.iter().filter(|c| c.block_type == BlockType::Comment) {
        let value = match child.change() {
            Some(Change::Added(comment)) => strip_newlines(&comment.title),
            Some(Change::Deleted(comment)) => strike(&strip_newlines(&comment.title)),
            _ => continue,
        };
        attachment.fields.push(AttachmentField::long("Comment", value));
    }

    for child in diff.diffs.iter().filter(|c| c.block_type != BlockType::Comment) {
        let new_title = child.new_block.as_ref().map_or("", |b| b.title.as_str());
        let old_title = child.old_block.as_ref().map_or("", |b| b.title.as_str());
        if new_title == old_title {
            continue;
        }
        let mut value = strip_newlines(new_title);
        if !old_title.is_empty() {
            value.push_str(&format!("\n\n{}\n", strike(&strip_newlines(old_title))));
        }
        attachment.fields.push(AttachmentField::long("Comment", value));
    }

    Ok(Some(attachment))
}

/// ``~~`text`~~``
fn strike(text: &str) -> String {
    format!("~~`{}`~~", text)
}

/// ``new  ~~`old`~~``
fn strike_inline(new: &str, old: &str) -> String {
    format!("{}  {}", new, strike(old))
}

/// Collapse line breaks to spaces and trim.
fn strip_newlines(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace('\n', " ")
        .trim()
        .to_string()
}
