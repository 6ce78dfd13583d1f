//! End-to-end scenarios for the rebase protocol.

use std::io;
use std::sync::{Arc, Mutex};

use restitch_core::{Edit, OffsetRange, Replacement};
use restitch_engine::session::{CacheKey, CompletionCache, EditTracker};
use restitch_engine::{
    rebase_candidates, verify_rebased_candidates, RebaseConfig, RebaseFailure, RebaseRequest,
};

fn replace(start: usize, end: usize, text: &str) -> Replacement {
    Replacement::new(OffsetRange::new(start, end), text)
}

fn request<'a>(
    original: &'a str,
    candidates: &'a [Replacement],
    user: &'a Edit,
    current: &'a str,
) -> RebaseRequest<'a> {
    RebaseRequest {
        original_document: original,
        edit_window: None,
        candidate_edits: candidates,
        detailed_edits: None,
        user_edit_since: user,
        current_document: current,
        current_selection: &[],
    }
}

/// The user prepends a comment; the candidate follows the text down.
#[test]
fn test_comment_inserted_above_candidate() {
    let original = "const x = 1;";
    let candidates = vec![replace(10, 11, "42")];
    let user = Edit::single(Replacement::insert(0, "// comment\n"));
    let current = user.apply(original);

    let rebased =
        rebase_candidates(&request(original, &candidates, &user, &current), &RebaseConfig::default())
            .unwrap();
    assert_eq!(rebased.len(), 1);
    assert_eq!(rebased[0].rebased_edit, replace(21, 22, "42"));
    assert_eq!(rebased[0].rebased_edit_index, 0);
}

/// The user rewrote the exact text the candidate wanted to change.
#[test]
fn test_user_overwrote_candidate_target() {
    let original = "const x = 1;";
    let candidates = vec![replace(10, 11, "42")];
    let user = Edit::single(replace(10, 11, "99"));
    let current = user.apply(original);

    assert_eq!(
        rebase_candidates(&request(original, &candidates, &user, &current), &RebaseConfig::default()),
        Err(RebaseFailure::RebaseFailed)
    );
}

/// Sequential host notifications collapse to a single baseline edit.
#[test]
fn test_sequential_deletes_compose_to_nothing() {
    let composed = Edit::compose_sequential_replacements(vec![
        Replacement::delete(OffsetRange::new(0, 6)),
        // Against the text remaining after the first delete.
        Replacement::delete(OffsetRange::new(0, 5)),
    ]);
    assert_eq!(composed.apply("hello world"), "");
}

/// The empty edit is the identity of the algebra.
#[test]
fn test_empty_edit_is_identity() {
    assert_eq!(Edit::empty().apply("anything"), "anything");
    assert!(Edit::empty().is_empty());
}

/// Disjoint candidate and user edits: the rebased result reproduces what
/// applying both edits to the baseline would have produced.
#[test]
fn test_disjoint_edits_both_apply() {
    let original = "aaa bbb ccc ddd";
    let candidates = vec![replace(12, 15, "DDD")];
    let user = Edit::single(replace(0, 3, "zzzz"));
    let current = user.apply(original);

    let rebased =
        rebase_candidates(&request(original, &candidates, &user, &current), &RebaseConfig::default())
            .unwrap();
    let both = Edit::new(vec![replace(0, 3, "zzzz"), replace(12, 15, "DDD")]);
    assert_eq!(rebased[0].rebased_edit.apply(&current), both.apply(original));
}

/// The window check fires even when the edits themselves rebase cleanly.
#[test]
fn test_window_invalidation_beats_clean_rebase() {
    let original = "const x = 1;\nrest();";
    let candidates = vec![replace(10, 11, "42")];
    let user = Edit::single(Replacement::insert(0, "// c\n"));
    let current = user.apply(original);
    let far_away = [OffsetRange::empty_at(current.len())];
    let req = RebaseRequest {
        edit_window: Some(OffsetRange::new(6, 12)),
        current_selection: &far_away,
        ..request(original, &candidates, &user, &current)
    };

    assert_eq!(
        rebase_candidates(&req, &RebaseConfig::default()),
        Err(RebaseFailure::OutsideEditWindow)
    );
}

/// The end-to-end re-check is off by default; switched on, it rejects even
/// clean rebases when independent user edits changed the document around
/// the candidate.
#[test]
fn test_verification_is_stricter_than_the_default_protocol() {
    let original = "const x = 1;";
    let candidates = vec![replace(10, 11, "42")];
    let user = Edit::single(Replacement::insert(0, "// comment\n"));
    let current = user.apply(original);
    let req = request(original, &candidates, &user, &current);

    // Default: succeeds.
    assert!(rebase_candidates(&req, &RebaseConfig::default()).is_ok());

    // The standalone routine reports the mismatch...
    let rebased = rebase_candidates(&req, &RebaseConfig::default()).unwrap();
    assert!(verify_rebased_candidates(&req, &rebased).is_err());

    // ...and the config switch folds it into the protocol as a failure.
    let verifying = RebaseConfig {
        verify_rebased_edits: true,
        ..RebaseConfig::default()
    };
    assert_eq!(
        rebase_candidates(&req, &verifying),
        Err(RebaseFailure::InconsistentEdits)
    );
}

/// With no user edits at all, verification holds and the candidate comes
/// back where it started (modulo minimization).
#[test]
fn test_verification_passes_without_user_edits() {
    let original = "const x = 1;";
    let candidates = vec![replace(10, 11, "42")];
    let user = Edit::empty();
    let verifying = RebaseConfig {
        verify_rebased_edits: true,
        ..RebaseConfig::default()
    };

    let rebased =
        rebase_candidates(&request(original, &candidates, &user, original), &verifying).unwrap();
    assert_eq!(rebased[0].rebased_edit, replace(10, 11, "42"));
}

/// Tracker and cache drive the engine the way a host integration would.
#[test]
fn test_tracker_feeds_cache_lookup() {
    let original = "const x = 1;";
    let mut tracker = EditTracker::new(original);
    let mut cache = CompletionCache::new(
        std::num::NonZeroUsize::new(8).unwrap(),
        RebaseConfig::default(),
    );
    let key = CacheKey::new("const x = ", ";");
    cache.insert(
        key.clone(),
        original,
        11,
        None,
        vec![replace(10, 11, "42")],
    );

    // The user types a comment, reported as two host change events.
    let first = vec![Replacement::insert(0, "// comment")];
    tracker.push_changes(&first);
    cache.push_user_edit(&Edit::compose_sequential_replacements(first));
    let second = vec![Replacement::insert(10, "\n")];
    tracker.push_changes(&second);
    cache.push_user_edit(&Edit::compose_sequential_replacements(second));

    let current = tracker.current_document();
    assert_eq!(current, "// comment\nconst x = 1;");

    let rebased = cache.lookup(&key, &current, &[]).unwrap().unwrap();
    assert_eq!(rebased[0].rebased_edit, replace(21, 22, "42"));
}

#[derive(Clone)]
struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Every call is traced with its outcome and duration, success or failure.
#[test]
fn test_every_call_is_traced_with_duration() {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let writer = CaptureWriter(buffer.clone());
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();

    let original = "const x = 1;";
    let candidates = vec![replace(10, 11, "42")];
    let ok_user = Edit::single(Replacement::insert(0, "// comment\n"));
    let ok_current = ok_user.apply(original);
    let bad_user = Edit::single(replace(10, 11, "99"));
    let bad_current = bad_user.apply(original);

    tracing::subscriber::with_default(subscriber, || {
        let _ = rebase_candidates(
            &request(original, &candidates, &ok_user, &ok_current),
            &RebaseConfig::default(),
        );
        let _ = rebase_candidates(
            &request(original, &candidates, &bad_user, &bad_current),
            &RebaseConfig::default(),
        );
    });

    let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("rebase succeeded"), "logs: {logs}");
    assert!(logs.contains("conflicts with user edits"), "logs: {logs}");
    let duration_lines = logs.lines().filter(|l| l.contains("duration_us")).count();
    assert_eq!(duration_lines, 2, "logs: {logs}");
}
