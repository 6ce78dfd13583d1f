//! Change observer: turns host change notifications into one baseline edit.

use restitch_core::{Edit, Replacement};

/// Accumulates everything a user has done to a document since a baseline
/// snapshot was taken.
///
/// Host editors report changes as replacements against the progressively
/// updated document, in event order; [`EditTracker::push_changes`] folds
/// them into a single [`Edit`] against the baseline. One tracker per
/// document, owned by whoever owns the document session.
#[derive(Debug, Clone)]
pub struct EditTracker {
    baseline: String,
    edit_since: Edit,
}

impl EditTracker {
    pub fn new(baseline: impl Into<String>) -> Self {
        Self {
            baseline: baseline.into(),
            edit_since: Edit::empty(),
        }
    }

    /// The snapshot all accumulated edits are expressed against.
    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    /// Everything that happened since the baseline, as one edit.
    pub fn edit_since(&self) -> &Edit {
        &self.edit_since
    }

    /// Fold a batch of host changes into the accumulated edit.
    ///
    /// The changes must be in event order, each expressed against the
    /// document as it stood after the previous one (sequential semantics).
    pub fn push_changes(&mut self, changes: &[Replacement]) {
        let batch = Edit::compose_sequential_replacements(changes.iter().cloned());
        self.edit_since = self.edit_since.compose(&batch);
    }

    /// The live document text implied by the accumulated edits.
    pub fn current_document(&self) -> String {
        self.edit_since.apply(&self.baseline)
    }

    /// Re-anchor on a fresh snapshot, discarding the accumulated edit.
    pub fn rebaseline(&mut self, current: impl Into<String>) {
        self.baseline = current.into();
        self.edit_since = Edit::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restitch_core::OffsetRange;

    #[test]
    fn test_changes_accumulate_against_baseline() {
        let mut tracker = EditTracker::new("hello world");
        tracker.push_changes(&[Replacement::new(OffsetRange::new(0, 5), "goodbye")]);
        assert_eq!(tracker.current_document(), "goodbye world");
        // Offsets of the second batch are against the updated document.
        tracker.push_changes(&[Replacement::new(OffsetRange::new(8, 13), "moon")]);
        assert_eq!(tracker.current_document(), "goodbye moon");
        assert_eq!(tracker.baseline(), "hello world");
        assert_eq!(tracker.edit_since().apply("hello world"), "goodbye moon");
    }

    #[test]
    fn test_sequential_batch_in_one_notification() {
        let mut tracker = EditTracker::new("hello world");
        // Two deletes reported in one batch, the second against the text
        // left over after the first.
        tracker.push_changes(&[
            Replacement::delete(OffsetRange::new(0, 6)),
            Replacement::delete(OffsetRange::new(0, 5)),
        ]);
        assert_eq!(tracker.current_document(), "");
    }

    #[test]
    fn test_rebaseline_resets() {
        let mut tracker = EditTracker::new("one");
        tracker.push_changes(&[Replacement::insert(3, " two")]);
        tracker.rebaseline(tracker.current_document());
        assert_eq!(tracker.baseline(), "one two");
        assert!(tracker.edit_since().is_empty());
    }
}
