//! Card notification templates.
//!
//! Each template is a pure function of a [`CardView`]. The view is built once
//! per diff and holds everything a template may print: who changed the card,
//! the card itself, and the board it lives on.

use std::fmt::Write;

use corkboard_types::{Block, Board};

use crate::diff::Diff;
use crate::error::RenderError;

/// Printed when a change has no known author.
pub const UNKNOWN_USER: &str = "unknown_user";

/// Options shared by every template in a render batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkdownOpts {
    /// Base URL links are built from, without a trailing slash.
    pub server_root: String,
}

impl MarkdownOpts {
    pub fn new(server_root: impl Into<String>) -> Self {
        let server_root: String = server_root.into();
        Self {
            server_root: server_root.trim_end_matches('/').to_string(),
        }
    }
}

/// Which card notification to write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardTemplate {
    Added,
    Deleted,
    Modified,
}

impl CardTemplate {
    /// Write the template for a view.
    pub fn render(&self, view: &CardView<'_>) -> Result<String, RenderError> {
        let mut out = String::new();
        match self {
            CardTemplate::Added => {
                writeln!(out, "{} has added the card {}", view.authors(), view.card_link()?)?;
            }
            CardTemplate::Deleted => {
                writeln!(out, "{} has deleted the card {}", view.authors(), view.card_link()?)?;
            }
            CardTemplate::Modified => {
                writeln!(
                    out,
                    "###### {} has modified the card {} on the board {}",
                    view.authors(),
                    view.card_link()?,
                    view.board_link()?
                )?;
            }
        }
        Ok(out)
    }
}

/// What a card template can print.
#[derive(Clone, Debug)]
pub struct CardView<'a> {
    card: &'a Block,
    board: Option<&'a Board>,
    authors: Vec<&'a str>,
    server_root: &'a str,
}

impl<'a> CardView<'a> {
    /// Build a view of the card a diff describes.
    ///
    /// Returns `None` for a degenerate diff.
    pub fn from_diff(diff: &'a Diff, opts: &'a MarkdownOpts) -> Option<Self> {
        let card = diff.latest()?;
        Some(Self {
            card,
            board: diff.board.as_ref(),
            authors: diff.authors.iter().map(String::as_str).collect(),
            server_root: &opts.server_root,
        })
    }

    /// `@user` mentions joined by `, `, or [`UNKNOWN_USER`].
    pub fn authors(&self) -> String {
        if self.authors.is_empty() {
            return UNKNOWN_USER.to_string();
        }
        self.authors
            .iter()
            .map(|a| format!("@{}", a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `[title](root/team/board/card)`. The team segment comes from the board.
    pub fn card_link(&self) -> Result<String, RenderError> {
        let root = self.root()?;
        let board = self.board()?;
        Ok(format!(
            "[{}]({}/{}/{}/{})",
            self.card.title, root, board.team_id, board.id, self.card.id
        ))
    }

    /// `[title](root/team/board)`.
    pub fn board_link(&self) -> Result<String, RenderError> {
        let root = self.root()?;
        let board = self.board()?;
        Ok(format!("[{}]({}/{}/{})", board.title, root, board.team_id, board.id))
    }

    fn board(&self) -> Result<&'a Board, RenderError> {
        self.board.ok_or_else(|| RenderError::MissingBoard {
            card_id: self.card.id.clone(),
        })
    }

    fn root(&self) -> Result<&str, RenderError> {
        if self.server_root.is_empty() {
            return Err(RenderError::MissingServerRoot {
                card_id: self.card.id.clone(),
            });
        }
        Ok(self.server_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> MarkdownOpts {
        MarkdownOpts::new("https://boards.example/")
    }

    fn board() -> Board {
        Board::new("t1", "Groceries").with_id("b1")
    }

    fn card() -> Block {
        Block::card("b1", "Buy milk").with_id("c1")
    }

    #[test]
    fn test_server_root_trailing_slash_trimmed() {
        assert_eq!(opts().server_root, "https://boards.example");
    }

    #[test]
    fn test_added_template() {
        let diff = Diff::between(None, Some(card()))
            .unwrap()
            .with_board(board())
            .with_author("amy");
        let opts = opts();
        let view = CardView::from_diff(&diff, &opts).unwrap();
        assert_eq!(
            CardTemplate::Added.render(&view).unwrap(),
            "@amy has added the card [Buy milk](https://boards.example/t1/b1/c1)\n"
        );
    }

    #[test]
    fn test_card_link_requires_board() {
        let diff = Diff::between(None, Some(card())).unwrap().with_author("amy");
        let opts = opts();
        let view = CardView::from_diff(&diff, &opts).unwrap();
        assert_eq!(
            view.card_link(),
            Err(RenderError::MissingBoard { card_id: "c1".into() })
        );
        assert_eq!(
            CardTemplate::Added.render(&view),
            Err(RenderError::MissingBoard { card_id: "c1".into() })
        );
    }

    #[test]
    fn test_deleted_template_unknown_author() {
        let diff = Diff::between(Some(card()), None).unwrap().with_board(board());
        let opts = opts();
        let view = CardView::from_diff(&diff, &opts).unwrap();
        assert_eq!(
            CardTemplate::Deleted.render(&view).unwrap(),
            "unknown_user has deleted the card [Buy milk](https://boards.example/t1/b1/c1)\n"
        );
    }

    #[test]
    fn test_modified_template_links_board() {
        let diff = Diff::between(Some(card()), Some(card()))
            .unwrap()
            .with_board(board())
            .with_author("bob")
            .with_author("amy");
        let opts = opts();
        let view = CardView::from_diff(&diff, &opts).unwrap();
        assert_eq!(
            CardTemplate::Modified.render(&view).unwrap(),
            "###### @amy, @bob has modified the card [Buy milk](https://boards.example/t1/b1/c1) \
             on the board [Groceries](https://boards.example/t1/b1)\n"
        );
    }

    #[test]
    fn test_modified_template_requires_board() {
        let diff = Diff::between(Some(card()), Some(card())).unwrap();
        let opts = opts();
        let view = CardView::from_diff(&diff, &opts).unwrap();
        assert_eq!(
            CardTemplate::Modified.render(&view),
            Err(RenderError::MissingBoard { card_id: "c1".into() })
        );
    }

    #[test]
    fn test_links_require_server_root() {
        let diff = Diff::between(None, Some(card())).unwrap();
        let opts = MarkdownOpts::default();
        let view = CardView::from_diff(&diff, &opts).unwrap();
        assert_eq!(
            CardTemplate::Added.render(&view),
            Err(RenderError::MissingServerRoot { card_id: "c1".into() })
        );
    }

    #[test]
    fn test_degenerate_diff_has_no_view() {
        let diff = Diff::default();
        let opts = opts();
        assert!(CardView::from_diff(&diff, &opts).is_none());
    }
}
