//! Opt-in end-to-end verification of rebased candidates.
//!
//! Compares what each original candidate produced on the baseline document
//! with what its rebased form produces on the current document. The check is
//! deliberately not part of the default protocol: a user edit that is merely
//! independent of a candidate (say, a rename elsewhere in the file) changes
//! the surrounding document and trips the comparison without any real
//! conflict. Test harnesses can call this directly, or switch it on through
//! [`RebaseConfig::verify_rebased_edits`](crate::RebaseConfig).

use std::fmt;

use crate::rebase::{RebaseRequest, RebasedCandidate};

/// A rebased candidate no longer reproduces its original result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationMismatch {
    pub candidate_index: usize,
}

impl fmt::Display for VerificationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rebased candidate {} does not reproduce its original result",
            self.candidate_index
        )
    }
}

impl std::error::Error for VerificationMismatch {}

/// Check every surviving candidate end to end.
pub fn verify_rebased_candidates(
    req: &RebaseRequest<'_>,
    rebased: &[RebasedCandidate],
) -> Result<(), VerificationMismatch> {
    for candidate in rebased {
        let mismatch = VerificationMismatch {
            candidate_index: candidate.rebased_edit_index,
        };
        let Some(original) = req.candidate_edits.get(candidate.rebased_edit_index) else {
            return Err(mismatch);
        };
        let expected = original.apply(req.original_document);
        let actual = candidate.rebased_edit.apply(req.current_document);
        if expected != actual {
            return Err(mismatch);
        }
    }
    Ok(())
}
