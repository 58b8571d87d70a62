//! Tierio mirrored store
//!
//! Coordinated write/read/delete across the two drives of a pair:
//! - writes land in a temp file and become visible only through an atomic
//!   rename, on the primary and the mirror, all-or-nothing
//! - reads are served from the primary only; the mirror is recovery-only
//! - deletes remove the item from both drives, optionally zero-overwriting
//!   the contents first

pub mod layout;
pub mod store;

pub use store::MirroredStore;
