//! `senseboard-profiles` — SQLite-backed personalization store.
//!
//! Maps a normalized member name to a small profile: display name, the
//! context lines the member has accumulated, and an updated-at stamp. The
//! rest of the server treats this crate as an opaque key→profile store;
//! personal-board prompts read `context_lines` and nothing else.

pub mod db;
pub mod error;
pub mod store;

pub use error::{ProfileError, Result};
pub use store::{Profile, ProfileStore};
