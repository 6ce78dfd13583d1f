//! Ordered, validated sequences of replacements.
//!
//! An [`Edit`] is the unit the rest of the crate works in terms of: a sorted,
//! non-overlapping list of [`Replacement`]s, all expressed against the same
//! document. Edits are immutable; `compose`, `normalize`, and the rebase
//! operations all return fresh values.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::annotated::{AnnotatedEdit, AnnotatedReplacement, EditData};
use crate::range::{shift, OffsetRange};
use crate::replacement::Replacement;

/// Error returned by [`Edit::try_new`] when the replacement list is unsorted
/// or overlapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidEdit {
    /// Index of the first replacement that starts before its predecessor ends.
    pub index: usize,
}

impl fmt::Display for InvalidEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid edit: replacement {} overlaps or is out of order",
            self.index
        )
    }
}

impl std::error::Error for InvalidEdit {}

/// A strictly sorted, non-overlapping sequence of replacements.
///
/// Consecutive replacements satisfy `next.start >= prev.end_exclusive`
/// (touching is allowed, overlap is not). Constructing an edit that violates
/// this panics; [`Edit::try_new`] validates untrusted input softly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    replacements: Vec<Replacement>,
}

impl Edit {
    /// Create an edit, panicking if the replacements are unsorted or overlap.
    pub fn new(replacements: Vec<Replacement>) -> Self {
        match Self::try_new(replacements) {
            Ok(edit) => edit,
            Err(e) => panic!("{e}"),
        }
    }

    /// Create an edit, failing softly on unsorted or overlapping input.
    pub fn try_new(replacements: Vec<Replacement>) -> Result<Self, InvalidEdit> {
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

    pub fn single(replacement: Replacement) -> Self {
        Self {
            replacements: vec![replacement],
        }
    }

    pub fn replacements(&self) -> &[Replacement] {
        &self.replacements
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Apply all replacements in one left-to-right pass.
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

    /// Drop replacements that change nothing.
    pub fn normalize(&self) -> Edit {
        Edit {
            replacements: self
                .replacements
                .iter()
                .filter(|r| !r.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// The edit equivalent to applying `self` and then `other`.
    ///
    /// `other`'s offsets are interpreted against the document produced by
    /// `self`. For every document `s`:
    /// `other.apply(&self.apply(s)) == self.compose(other).apply(s)`.
    pub fn compose(&self, other: &Edit) -> Edit {
        Edit::new(compose_fragments(&self.replacements, &other.replacements)).normalize()
    }

    /// Compose replacements meant to be applied one after another.
    ///
    /// Each replacement's offsets are expressed against the document produced
    /// by the ones before it (the shape host change notifications arrive in).
    /// Maximal runs in reverse-start order are composed as one batch rather
    /// than pairwise, which keeps a burst of back-to-front emissions linear;
    /// the result is identical to folding `compose` one replacement at a
    /// time.
    pub fn compose_sequential_replacements(
        replacements: impl IntoIterator<Item = Replacement>,
    ) -> Edit {
        let mut result = Edit::empty();
        // Collected in the order seen, which within a run is descending start.
        let mut run: Vec<Replacement> = Vec::new();
        for r in replacements {
            let extends_run = match run.last() {
                Some(prev) => r.replace_range.end_exclusive() <= prev.replace_range.start(),
                None => true,
            };
            if !extends_run {
                result = result.compose(&flush_run(&mut run));
            }
            run.push(r);
        }
        if !run.is_empty() {
            result = result.compose(&flush_run(&mut run));
        }
        result
    }

    /// Shrink every replacement to its minimal diff against `original`.
    pub fn remove_common_suffix_and_prefix(&self, original: &str) -> Edit {
        Edit {
            replacements: self
                .replacements
                .iter()
                .map(|r| r.remove_common_suffix_and_prefix(original))
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    /// Transform `self` (authored against a shared baseline) to apply after
    /// `base` has already been applied to that baseline.
    ///
    /// Returns `None` if any of `self`'s replacements intersects or touches
    /// one of `base`'s.
    pub fn try_rebase(&self, base: &Edit) -> Option<Edit> {
        self.rebase_inner(base, RebaseConflicts::Abort)
    }

    /// Like [`Edit::try_rebase`], but conflicting replacements are silently
    /// dropped instead of aborting the whole call.
    pub fn rebase_skip_conflicting(&self, base: &Edit) -> Edit {
        self.rebase_inner(base, RebaseConflicts::Skip)
            .expect("skipping rebase never aborts")
    }

    fn rebase_inner(&self, base: &Edit, conflicts: RebaseConflicts) -> Option<Edit> {
        let mut result = Vec::new();
        let mut offset: isize = 0;
        let mut base_iter = base.replacements.iter().peekable();

        'own: for own in &self.replacements {
            while let Some(b) = base_iter.peek() {
                if own.replace_range.intersects_or_touches(b.replace_range) {
                    match conflicts {
                        RebaseConflicts::Abort => return None,
                        RebaseConflicts::Skip => continue 'own,
                    }
                }
                if own.replace_range.start() < b.replace_range.start() {
                    break;
                }
                offset += b.text_length_delta();
                base_iter.next();
            }
            result.push(own.delta(offset));
        }
        Some(Edit::new(result))
    }

    /// Map an arbitrary range through the edit.
    ///
    /// Any replacement overlapping or touching either boundary of `range`
    /// invalidates it. Otherwise each endpoint is shifted, independently, by
    /// the length deltas of the replacements lying fully before it.
    pub fn apply_to_offset_range(&self, range: OffsetRange) -> Option<OffsetRange> {
        let mut start_delta: isize = 0;
        let mut end_delta: isize = 0;
        for r in &self.replacements {
            let touches_start = r
                .replace_range
                .intersects_or_touches(OffsetRange::empty_at(range.start()));
            let touches_end = r
                .replace_range
                .intersects_or_touches(OffsetRange::empty_at(range.end_exclusive()));
            if touches_start || touches_end {
                return None;
            }
            if r.replace_range.end_exclusive() < range.start() {
                start_delta += r.text_length_delta();
            }
            if r.replace_range.end_exclusive() < range.end_exclusive() {
                end_delta += r.text_length_delta();
            }
        }
        Some(OffsetRange::new(
            shift(range.start(), start_delta),
            shift(range.end_exclusive(), end_delta),
        ))
    }

    /// Map a single offset through the edit. Offsets inside a replaced
    /// region land at the end of that region's new text.
    pub fn apply_to_offset(&self, offset: usize) -> usize {
        let mut delta: isize = 0;
        for r in &self.replacements {
            if r.replace_range.end_exclusive() <= offset {
                delta += r.text_length_delta();
            } else if r.replace_range.start() < offset {
                return shift(r.replace_range.start(), delta) + r.new_text.len();
            } else {
                break;
            }
        }
        shift(offset, delta)
    }

    /// The ranges the replacement texts occupy in the result document.
    pub fn new_ranges(&self) -> Vec<OffsetRange> {
        let mut ranges = Vec::with_capacity(self.replacements.len());
        let mut delta: isize = 0;
        for r in &self.replacements {
            let start = shift(r.replace_range.start(), delta);
            ranges.push(OffsetRange::of_start_and_length(start, r.new_text.len()));
            delta += r.text_length_delta();
        }
        ranges
    }

    /// The edit that undoes `self`: applying it to `self.apply(original)`
    /// restores `original`.
    pub fn inverse(&self, original: &str) -> Edit {
        let mut result = Vec::with_capacity(self.replacements.len());
        let mut delta: isize = 0;
        for r in &self.replacements {
            let start = shift(r.replace_range.start(), delta);
            result.push(Replacement::new(
                OffsetRange::of_start_and_length(start, r.new_text.len()),
                r.replace_range.substring(original),
            ));
            delta += r.text_length_delta();
        }
        Edit::new(result)
    }

    /// Lift into an annotated edit, tagging every replacement with
    /// `data(replacement)`.
    pub fn map_data<T: EditData>(&self, mut data: impl FnMut(&Replacement) -> T) -> AnnotatedEdit<T> {
        AnnotatedEdit::new(
            self.replacements
                .iter()
                .map(|r| AnnotatedReplacement {
                    replace_range: r.replace_range,
                    new_text: r.new_text.clone(),
                    data: data(r),
                })
                .collect(),
        )
    }
}

#[derive(Clone, Copy)]
enum RebaseConflicts {
    Abort,
    Skip,
}

/// Reverse a descending-start run into a valid batch edit.
fn flush_run(run: &mut Vec<Replacement>) -> Edit {
    run.reverse();
    Edit::new(std::mem::take(run))
}

/// Behavior the compose walk needs from a replacement, shared between plain
/// and annotated edits.
pub(crate) trait Fragment: Clone {
    fn range(&self) -> OffsetRange;
    fn text(&self) -> &str;
    /// Same payload, new range.
    fn with_range(&self, range: OffsetRange) -> Self;
    /// Same payload, new range and text (used when fragments merge; the
    /// payload of the *superseding* fragment wins).
    fn with_range_and_text(&self, range: OffsetRange, text: String) -> Self;

    fn text_length_delta(&self) -> isize {
        self.text().len() as isize - self.range().len() as isize
    }

    fn is_no_op(&self) -> bool {
        self.range().is_empty() && self.text().is_empty()
    }
}

impl Fragment for Replacement {
    fn range(&self) -> OffsetRange {
        self.replace_range
    }

    fn text(&self) -> &str {
        &self.new_text
    }

    fn with_range(&self, range: OffsetRange) -> Self {
        Replacement::new(range, self.new_text.clone())
    }

    fn with_range_and_text(&self, range: OffsetRange, text: String) -> Self {
        Replacement::new(range, text)
    }
}

/// The running-delta merge behind `compose`, generic over plain and
/// annotated replacements.
///
/// Walks `second`'s replacements in order, keeping a cumulative delta for
/// how far `first` has shifted downstream positions. `first` replacements
/// ending strictly before the current `second` replacement pass through
/// unchanged; every `first` replacement whose text, as placed in the
/// intermediate document, intersects or touches the `second` range is
/// consumed into one merged replacement carrying the `second` payload. The
/// merged text keeps whatever the consumed fragments produced outside the
/// superseding range (a prefix of the first consumed text, a suffix of the
/// last), which is what makes the compose law hold for partial overlaps.
///
/// A `first` text that extends past the end of the current `second` range is
/// split: the covered part joins the merge, the surviving remainder goes
/// back on the queue (as an insertion at the original end) so a later
/// `second` replacement can still consume it.
pub(crate) fn compose_fragments<F: Fragment>(first: &[F], second: &[F]) -> Vec<F> {
    let mut queue: VecDeque<F> = first.iter().filter(|f| !f.is_no_op()).cloned().collect();
    let second: Vec<&F> = second.iter().filter(|f| !f.is_no_op()).collect();
    if queue.is_empty() {
        return second.into_iter().cloned().collect();
    }
    if second.is_empty() {
        return queue.into_iter().collect();
    }

    let mut result: Vec<F> = Vec::new();
    let mut delta: isize = 0;

    for other in second {
        // Copy over `first` replacements whose new text ends strictly
        // before `other` starts (not yet touching).
        while let Some(f) = queue.front() {
            let placed_end = shift(f.range().start(), delta) + f.text().len();
            if placed_end >= other.range().start() {
                break;
            }
            delta += f.text_length_delta();
            let f = queue.pop_front().expect("front was just peeked");
            result.push(f);
        }

        let delta_before = delta;
        let mut head: Option<F> = None;
        let mut tail: Option<F> = None;
        while let Some(f) = queue.front() {
            let placed_start = shift(f.range().start(), delta);
            if placed_start > other.range().end_exclusive() {
                break;
            }
            let placed_end = placed_start + f.text().len();
            let mut f = queue.pop_front().expect("front was just peeked");
            let mut split = false;
            if placed_end > other.range().end_exclusive() {
                // `other` ends inside this text: keep the covered part here
                // and return the surviving remainder to the queue.
                let cut = f.text().len() - (placed_end - other.range().end_exclusive());
                let surviving = f.with_range_and_text(
                    OffsetRange::empty_at(f.range().end_exclusive()),
                    f.text()[cut..].to_string(),
                );
                f = f.with_range_and_text(f.range(), f.text()[..cut].to_string());
                queue.push_front(surviving);
                split = true;
            }
            delta += f.text_length_delta();
            if head.is_none() {
                head = Some(f.clone());
            }
            tail = Some(f);
            if split {
                break;
            }
        }

        match (head, tail) {
            (None, _) => result.push(other.with_range(other.range().delta(-delta))),
            (Some(head), Some(tail)) => {
                // The part of the first consumed text that `other` does not
                // cover survives in front of its replacement text. (The
                // split above guarantees nothing survives past the end.)
                let mut text = String::new();
                let head_placed_start = shift(head.range().start(), delta_before);
                if other.range().start() > head_placed_start {
                    text.push_str(&head.text()[..other.range().start() - head_placed_start]);
                }
                text.push_str(other.text());

                let start = head
                    .range()
                    .start()
                    .min(shift(other.range().start(), -delta_before));
                let end = (tail.range().end_exclusive() as isize)
                    .max(other.range().end_exclusive() as isize - delta)
                    as usize;
                result.push(other.with_range_and_text(OffsetRange::new(start, end), text));
            }
            (Some(_), None) => unreachable!("head is only set together with tail"),
        }
    }

    result.extend(queue);
    result
}
