//! Immutable string-edit algebra.
//!
//! The building blocks for describing and transforming text changes as
//! values: [`OffsetRange`] intervals, single [`Replacement`]s, validated
//! [`Edit`] sequences with composition and rebasing, and annotated variants
//! that carry provenance through those transformations.
//!
//! Everything here is purely functional: no I/O, no shared state, and every
//! operation returns a fresh value. The rebase engine built on top lives in
//! the `restitch-engine` crate.

pub mod annotated;
pub mod edit;
pub mod range;
pub mod replacement;

pub use annotated::{AnnotatedEdit, AnnotatedReplacement, EditData, EditSource, VoidData};
pub use edit::{Edit, InvalidEdit};
pub use range::{InvalidRange, OffsetRange};
pub use replacement::Replacement;
