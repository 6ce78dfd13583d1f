//! The rebase protocol.
//!
//! Reconciles candidate edits authored against a baseline snapshot with the
//! edits a user actually made since that snapshot, producing replacements
//! valid against the current document or a precise failure reason.
//!
//! The protocol runs in a fixed order: consistency check, user-edit
//! minimization, edit-window check, detail materialization, flattening,
//! the core interval-merge rebase with fuzzy agreement matching, regrouping
//! by provenance, and re-synthesis against the current document. Domain
//! failures come back as values; only caller bugs in the algebra itself
//! panic, and none of those can be reached through a validated request.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use restitch_core::{
    AnnotatedEdit, AnnotatedReplacement, Edit, EditSource, OffsetRange, Replacement,
};

use crate::config::{RebaseConfig, Resolution};
use crate::verify;

/// Everything one rebase call consumes. All state is caller-owned; the
/// engine never retains any of it.
#[derive(Debug, Clone)]
pub struct RebaseRequest<'a> {
    /// The document text the candidates were computed against.
    pub original_document: &'a str,
    /// Baseline region within which the candidates remain meaningful.
    pub edit_window: Option<OffsetRange>,
    /// One replacement per independent edit site (e.g. multi-cursor).
    pub candidate_edits: &'a [Replacement],
    /// Pre-computed fine-grained sub-edits per candidate, already tagged
    /// with their origin index. Candidates without one get a synthesized
    /// single-fragment breakdown.
    pub detailed_edits: Option<&'a [Vec<AnnotatedReplacement<EditSource>>]>,
    /// All user edits since the baseline, composed into one edit.
    pub user_edit_since: &'a Edit,
    /// The live document text.
    pub current_document: &'a str,
    /// Cursor(s) in current-document coordinates; the first is primary.
    pub current_selection: &'a [OffsetRange],
}

/// A candidate that survived the rebase, expressed against the current
/// document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebasedCandidate {
    pub rebased_edit: Replacement,
    /// Index into the request's `candidate_edits`.
    pub rebased_edit_index: usize,
}

/// Why a rebase call produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RebaseFailure {
    /// The anchor region no longer contains the cursor.
    OutsideEditWindow,
    /// A genuine, policy-confirmed text conflict.
    RebaseFailed,
    /// The claimed edit history does not reconcile the baseline with the
    /// current document.
    InconsistentEdits,
    /// An unexpected error inside the rebase body; the input could not be
    /// processed at all.
    Error,
}

impl fmt::Display for RebaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RebaseFailure::OutsideEditWindow => "outside edit window",
            RebaseFailure::RebaseFailed => "rebase failed",
            RebaseFailure::InconsistentEdits => "inconsistent edits",
            RebaseFailure::Error => "error",
        };
        f.write_str(reason)
    }
}

/// Rebase every candidate in `req` onto the current document.
///
/// Returns the surviving candidates (no-op results are dropped), or the
/// first failure the protocol runs into. Every call is traced with its
/// outcome and wall-clock duration; unexpected internal errors are reported
/// as [`RebaseFailure::Error`] instead of crossing the boundary.
pub fn rebase_candidates(
    req: &RebaseRequest<'_>,
    config: &RebaseConfig,
) -> Result<Vec<RebasedCandidate>, RebaseFailure> {
    let started = Instant::now();
    let result = match rebase_body(req, config) {
        Ok(outcome) => outcome,
        Err(unexpected) => {
            tracing::warn!(error = %format!("{unexpected:#}"), "rebase hit an unexpected error");
            Err(RebaseFailure::Error)
        }
    };

    let duration_us = started.elapsed().as_micros() as u64;
    match &result {
        Ok(rebased) => {
            tracing::debug!(duration_us, rebased = rebased.len(), "rebase succeeded");
        }
        Err(RebaseFailure::OutsideEditWindow) => {
            tracing::debug!(duration_us, "rebase abandoned: edit window no longer contains the cursor");
        }
        Err(RebaseFailure::RebaseFailed) => {
            tracing::debug!(duration_us, "rebase failed: candidate conflicts with user edits");
        }
        Err(RebaseFailure::InconsistentEdits) => {
            tracing::debug!(duration_us, "rebase abandoned: edit history does not reconcile baseline with current document");
        }
        Err(RebaseFailure::Error) => {
            tracing::debug!(duration_us, "rebase errored");
        }
    }
    result
}

/// The protocol body. `Err` is the funnel for anything unexpected; domain
/// failures travel in the inner `Result`.
fn rebase_body(
    req: &RebaseRequest<'_>,
    config: &RebaseConfig,
) -> Result<Result<Vec<RebasedCandidate>, RebaseFailure>> {
    validate_request(req)?;

    // 1. The supplied history must actually explain the current document.
    if req.user_edit_since.apply(req.original_document) != req.current_document {
        return Ok(Err(RebaseFailure::InconsistentEdits));
    }

    // 2. Strip no-op prefixes/suffixes from the user edit so unchanged text
    // does not register as a conflict.
    let user_edit = req
        .user_edit_since
        .remove_common_suffix_and_prefix(req.original_document);

    // 3. Is the anchor region still where the user is typing?
    if let (Some(window), Some(primary)) = (req.edit_window, req.current_selection.first()) {
        match user_edit.apply_to_offset_range(window) {
            Some(mapped) if mapped.contains_range(*primary) => {}
            _ => return Ok(Err(RebaseFailure::OutsideEditWindow)),
        }
    }

    // 4 + 5. Materialize a detailed breakdown per candidate and flatten
    // them, in candidate order, into one combined annotated edit.
    let mut flat = AnnotatedEdit::empty();
    for (index, candidate) in req.candidate_edits.iter().enumerate() {
        let detail = match req.detailed_edits.and_then(|d| d.get(index)) {
            Some(fragments) if !fragments.is_empty() => AnnotatedEdit::try_new(fragments.clone())
                .with_context(|| format!("detailed edits for candidate {index} are unsorted"))?,
            _ => Edit::single(candidate.clone()).map_data(|_| EditSource::new(index)),
        };
        flat = flat.compose(&detail);
    }

    // 6. The core interval merge against the minimized user edit.
    let rebased = match rebase_fragments(flat.replacements(), user_edit.replacements(), config) {
        Some(fragments) => fragments,
        None => return Ok(Err(RebaseFailure::RebaseFailed)),
    };

    // 7. Partition the flat result by origin.
    let mut groups: BTreeMap<usize, Vec<AnnotatedReplacement<EditSource>>> = BTreeMap::new();
    for fragment in rebased {
        groups.entry(fragment.data.index).or_default().push(fragment);
    }

    // 8. Re-synthesize one replacement per candidate, splicing current
    // document text between non-adjacent fragments, and drop no-ops.
    let mut results = Vec::new();
    for (index, fragments) in groups {
        let merged = join_fragments(&fragments, req.current_document)?;
        let trimmed = merged.remove_common_suffix_and_prefix(req.current_document);
        if trimmed.is_empty() {
            continue;
        }
        results.push(RebasedCandidate {
            rebased_edit: trimmed,
            rebased_edit_index: index,
        });
    }

    // 9. Optional end-to-end re-check, off by default.
    if config.verify_rebased_edits {
        if let Err(mismatch) = verify::verify_rebased_candidates(req, &results) {
            tracing::debug!(%mismatch, "verification rejected rebased edits");
            return Ok(Err(RebaseFailure::InconsistentEdits));
        }
    }

    Ok(Ok(results))
}

/// The annotated two-pointer merge. User replacements strictly before a
/// candidate shift it; user replacements overlapping a candidate must pass
/// the agreement policy to be absorbed, and any other overlap is a conflict.
fn rebase_fragments(
    candidates: &[AnnotatedReplacement<EditSource>],
    user: &[Replacement],
    config: &RebaseConfig,
) -> Option<Vec<AnnotatedReplacement<EditSource>>> {
    let mut result = Vec::with_capacity(candidates.len());
    let mut offset: isize = 0;
    let mut user_iter = user.iter().peekable();

    for candidate in candidates {
        // User edits entirely before this candidate shift it wholesale.
        while let Some(u) = user_iter.peek() {
            if u.replace_range.intersects_or_touches(candidate.replace_range)
                || u.replace_range.start() >= candidate.replace_range.start()
            {
                break;
            }
            offset += u.text_length_delta();
            user_iter.next();
        }

        // User edits inside the candidate are only tolerated when the user
        // typed text the candidate already agrees with; each consumed edit
        // extends the candidate's end by its length delta, and matching
        // continues past the agreed-on stretch of candidate text.
        let offset_before = offset;
        let mut absorbed: isize = 0;
        let mut search_from = 0usize;
        while let Some(u) = user_iter.peek() {
            if !u.replace_range.intersects_or_touches(candidate.replace_range) {
                break;
            }
            let agreement = agreement_index(candidate, u, search_from, config)?;
            search_from = agreement + u.new_text.len();
            absorbed += u.text_length_delta();
            user_iter.next();
        }

        result.push(AnnotatedReplacement::new(
            candidate
                .replace_range
                .delta(offset_before)
                .delta_end(absorbed),
            candidate.new_text.clone(),
            candidate.data,
        ));
        offset = offset_before + absorbed;
    }
    Some(result)
}

/// Where, if anywhere acceptable, the user text appears inside the
/// candidate text. `None` is a conflict.
fn agreement_index(
    candidate: &AnnotatedReplacement<EditSource>,
    user: &Replacement,
    search_from: usize,
    config: &RebaseConfig,
) -> Option<usize> {
    // Anything but full containment with enough candidate text is a
    // conflict outright.
    if !candidate.replace_range.contains_range(user.replace_range) {
        return None;
    }
    if candidate.new_text.len() < user.new_text.len() {
        return None;
    }
    let remainder = candidate.new_text.get(search_from..)?;
    let index = remainder.find(&user.new_text)?;
    match config.resolution {
        Resolution::Lenient => Some(search_from + index),
        Resolution::Strict => {
            let accepted = index <= config.max_agreement_offset
                && (index == 0 || user.new_text.len() <= config.max_imperfect_agreement_length);
            accepted.then_some(search_from + index)
        }
    }
}

/// Merge a candidate's rebased fragments into one contiguous replacement,
/// filling the gaps between fragments with current document text.
fn join_fragments(
    fragments: &[AnnotatedReplacement<EditSource>],
    current: &str,
) -> Result<Replacement> {
    let (Some(first), Some(last)) = (fragments.first(), fragments.last()) else {
        bail!("candidate group is empty");
    };
    let mut text = String::new();
    for (i, fragment) in fragments.iter().enumerate() {
        text.push_str(&fragment.new_text);
        if let Some(next) = fragments.get(i + 1) {
            let gap = OffsetRange::new(
                fragment.replace_range.end_exclusive(),
                next.replace_range.start(),
            );
            text.push_str(checked_substring(gap, current)?);
        }
    }
    let range = first.replace_range.join(last.replace_range);
    checked_substring(range, current).context("rebased fragments fall outside the document")?;
    Ok(Replacement::new(range, text))
}

fn checked_substring(range: OffsetRange, document: &str) -> Result<&str> {
    validate_range(range, document)?;
    Ok(range.substring(document))
}

fn validate_range(range: OffsetRange, document: &str) -> Result<()> {
    if range.end_exclusive() > document.len() {
        bail!(
            "range {range} exceeds document length {}",
            document.len()
        );
    }
    if !document.is_char_boundary(range.start()) || !document.is_char_boundary(range.end_exclusive())
    {
        bail!("range {range} is not on character boundaries");
    }
    Ok(())
}

/// Reject malformed caller input up front so the algebra never panics
/// behind the engine boundary.
fn validate_request(req: &RebaseRequest<'_>) -> Result<()> {
    for (i, r) in req.user_edit_since.replacements().iter().enumerate() {
        validate_range(r.replace_range, req.original_document)
            .with_context(|| format!("user edit replacement {i}"))?;
    }
    for (i, candidate) in req.candidate_edits.iter().enumerate() {
        validate_range(candidate.replace_range, req.original_document)
            .with_context(|| format!("candidate edit {i}"))?;
    }
    if let Some(details) = req.detailed_edits {
        if details.len() > req.candidate_edits.len() {
            bail!(
                "{} detailed breakdowns supplied for {} candidates",
                details.len(),
                req.candidate_edits.len()
            );
        }
        for (i, fragments) in details.iter().enumerate() {
            for fragment in fragments {
                validate_range(fragment.replace_range, req.original_document)
                    .with_context(|| format!("detailed edits for candidate {i}"))?;
            }
        }
    }
    Ok(())
}
