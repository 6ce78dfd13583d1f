//! Edits carrying caller-supplied metadata on every replacement.
//!
//! The annotated shapes mirror [`Replacement`](crate::Replacement) and
//! [`Edit`](crate::Edit) with a `data` payload per fragment. The payload
//! kind only has to be joinable ([`EditData`]); the engine uses
//! [`EditSource`] to remember which candidate a fragment descends from
//! through composition and rebase.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::edit::{compose_fragments, Fragment, InvalidEdit};
use crate::range::OffsetRange;
use crate::replacement::Replacement;
use crate::Edit;

/// Joinable metadata attached to annotated replacements.
///
/// `join` returns `None` when the two payloads cannot be merged into one.
pub trait EditData: Clone {
    fn join(&self, other: &Self) -> Option<Self>;
}

/// Payload for callers that do not need provenance. Always joins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidData;

impl EditData for VoidData {
    fn join(&self, _other: &Self) -> Option<Self> {
        Some(VoidData)
    }
}

/// Identifies the candidate edit a fragment descends from.
///
/// Joining succeeds only for fragments of the same candidate, so rebased
/// fragments can never be reattributed to the wrong one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditSource {
    pub index: usize,
}

impl EditSource {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl EditData for EditSource {
    fn join(&self, other: &Self) -> Option<Self> {
        (self.index == other.index).then_some(*self)
    }
}

impl fmt::Display for EditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "candidate {}", self.index)
    }
}

/// A [`Replacement`](crate::Replacement) with a data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedReplacement<T> {
    pub replace_range: OffsetRange,
    pub new_text: String,
    pub data: T,
}

impl<T: EditData> AnnotatedReplacement<T> {
    pub fn new(replace_range: OffsetRange, new_text: impl Into<String>, data: T) -> Self {
        Self {
            replace_range,
            new_text: new_text.into(),
            data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.replace_range.is_empty() && self.new_text.is_empty()
    }

    pub fn text_length_delta(&self) -> isize {
        self.new_text.len() as isize - self.replace_range.len() as isize
    }

    pub fn delta(&self, amount: isize) -> Self {
        Self {
            replace_range: self.replace_range.delta(amount),
            new_text: self.new_text.clone(),
            data: self.data.clone(),
        }
    }

    /// Drop the payload.
    pub fn to_replacement(&self) -> Replacement {
        Replacement::new(self.replace_range, self.new_text.clone())
    }
}

impl<T: EditData> Fragment for AnnotatedReplacement<T> {
    fn range(&self) -> OffsetRange {
        self.replace_range
    }

    fn text(&self) -> &str {
        &self.new_text
    }

    fn with_range(&self, range: OffsetRange) -> Self {
        Self {
            replace_range: range,
            new_text: self.new_text.clone(),
            data: self.data.clone(),
        }
    }

    fn with_range_and_text(&self, range: OffsetRange, text: String) -> Self {
        Self {
            replace_range: range,
            new_text: text,
            data: self.data.clone(),
        }
    }
}

/// An [`Edit`](crate::Edit) whose replacements carry a data payload.
///
/// Same invariant as the plain edit: strictly sorted, non-overlapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedEdit<T: EditData> {
    replacements: Vec<AnnotatedReplacement<T>>,
}

impl<T: EditData> AnnotatedEdit<T> {
    pub fn new(replacements: Vec<AnnotatedReplacement<T>>) -> Self {
        match Self::try_new(replacements) {
            Ok(edit) => edit,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_new(replacements: Vec<AnnotatedReplacement<T>>) -> Result<Self, InvalidEdit> {
        for i in 1..replacements.len() {
            if replacements[i].replace_range.start()
                < replacements[i - 1].replace_range.end_exclusive()
            {
                return Err(InvalidEdit { index: i });
            }
        }
        Ok(Self { replacements })
    }

    pub fn empty() -> Self {
        Self {
            replacements: Vec::new(),
        }
    }

    pub fn single(replacement: AnnotatedReplacement<T>) -> Self {
        Self {
            replacements: vec![replacement],
        }
    }

    pub fn replacements(&self) -> &[AnnotatedReplacement<T>] {
        &self.replacements
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn apply(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut pos = 0;
        for r in &self.replacements {
            result.push_str(&text[pos..r.replace_range.start()]);
            result.push_str(&r.new_text);
            pos = r.replace_range.end_exclusive();
        }
        result.push_str(&text[pos..]);
        result
    }

    pub fn normalize(&self) -> Self {
        Self {
            replacements: self
                .replacements
                .iter()
                .filter(|r| !r.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// The annotated equivalent of [`Edit::compose`](crate::Edit::compose).
    ///
    /// Fragments superseded by an `other` fragment are merged into it and
    /// the merged fragment carries `other`'s payload; `join` is not
    /// consulted. Producers are expected not to emit payload-bearing
    /// fragments that a later edit partially overwrites.
    pub fn compose(&self, other: &AnnotatedEdit<T>) -> AnnotatedEdit<T> {
        AnnotatedEdit::new(compose_fragments(&self.replacements, &other.replacements)).normalize()
    }

    /// Project back to a plain edit.
    pub fn to_edit(&self) -> Edit {
        Edit::new(self.replacements.iter().map(|r| r.to_replacement()).collect())
    }

    /// Project back to a plain edit, keeping only fragments whose payload
    /// matches `pred` (provenance selection).
    pub fn to_edit_filtered(&self, mut pred: impl FnMut(&T) -> bool) -> Edit {
        Edit::new(
            self.replacements
                .iter()
                .filter(|r| pred(&r.data))
                .map(|r| r.to_replacement())
                .collect(),
        )
    }
}
