//! Generated identifiers for boards and blocks.
//!
//! Ids are plain strings on the wire. Generated ids are a one-letter kind
//! prefix followed by the 32 hex characters of a UUIDv7, so they sort by
//! creation time within a kind and the prefix tells a human what they are
//! looking at in logs.

use std::fmt;

/// What an id refers to. Determines the id prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdKind {
    Board,
    Card,
    Block,
}

impl IdKind {
    /// The single-character prefix for ids of this kind.
    pub fn prefix(&self) -> char {
        match self {
            IdKind::Board => 'b',
            IdKind::Card => 'c',
            IdKind::Block => 'a',
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdKind::Board => "board",
            IdKind::Card => "card",
            IdKind::Block => "block",
        };
        f.write_str(name)
    }
}

/// Create a new time-ordered id for the given kind.
pub fn new_id(kind: IdKind) -> String {
    format!("{}{}", kind.prefix(), uuid::Uuid::now_v7().as_simple())
}
