//! Group membership.
//!
//! A [`MembershipView`] is the ordered list of [`ProcessRecord`]s bound to one
//! channel. The failure detector owns the authoritative copy and is the only
//! component that changes process states; everybody else works on snapshots.

pub mod process;
pub mod view;

pub use process::{ProcessId, ProcessRecord, ProcessState};
pub use view::{MembershipView, MembershipViewBuilder, MAX_MEMBERS};
