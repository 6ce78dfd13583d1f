//! Rebase engine for cached candidate edits.
//!
//! A candidate edit (say, an AI-generated completion) is computed against a
//! snapshot of a document. By the time it is ready to show, the user has
//! kept typing. This crate reconciles the two: [`rebase_candidates`] takes
//! the baseline, the candidates, the user's edits since, and the live
//! document, and produces candidates valid against the live document — or a
//! precise reason why it cannot ([`RebaseFailure`]).
//!
//! The engine is a pure function over caller-owned snapshots; the only side
//! effect is a `tracing` event per call. The [`session`] module provides the
//! per-document collaborators that feed it: an edit tracker and a bounded
//! completion cache with a sticky rebase-failed marker.

pub mod config;
pub mod rebase;
pub mod session;
pub mod verify;

pub use config::{RebaseConfig, Resolution};
pub use rebase::{rebase_candidates, RebaseFailure, RebaseRequest, RebasedCandidate};
pub use verify::{verify_rebased_candidates, VerificationMismatch};
