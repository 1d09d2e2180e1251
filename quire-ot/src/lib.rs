//! # quire-ot: operational transformation over plain byte buffers
//!
//! An [`Operation`] is a normalized sequence of [`Run`]s that walks a source
//! buffer from start to end:
//!
//! ```text
//! source:  H e l l o ␠ W o r l d !
//!          └─ Retain(6) ─┘└─ Retain(6) ─┘
//!                        ▲
//!                  Insert("wide ")
//! target:  H e l l o ␠ w i d e ␠ W o r l d !
//! ```
//!
//! ## Algebra
//!
//! | Function            | Law                                                  |
//! |---------------------|------------------------------------------------------|
//! | [`compose`]         | `apply(compose(a, b)) == apply(b, apply(a))`          |
//! | [`transform`]       | `apply(b', apply(a)) == apply(a', apply(b))` (TP1)    |
//! | [`Operation::inverse`] | `apply(inverse(op), apply(op, doc)) == doc`       |
//! | [`Operation::from_runs`] | normalization, idempotent                       |
//!
//! Every function is pure and returns a new value. Insert/insert ties in
//! [`transform`] are broken by a caller-supplied [`Side`], which must be
//! derived deterministically (e.g. from actor ids via [`Side::by_author`]).

mod cursor;
pub mod compose;
pub mod error;
pub mod operation;
pub mod transform;

pub use compose::compose;
pub use error::OtError;
pub use operation::{Operation, Run};
pub use transform::{transform, Side};
