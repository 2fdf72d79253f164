//! Power-loss-resilient typed entry store for raw flash pages.
//!
//! Small configuration records live in one flash page as a flat sequence
//! of length-prefixed, word-aligned entries. Writes append; updates
//! invalidate the old copy by a bit-clearing tag flip; a redundant bank
//! page makes compaction survivable at any power-loss point.

pub mod error;
pub mod fixtures;
pub mod flash;
pub mod hooks;
pub mod record;
pub mod scan;
pub mod store;

pub use error::{Result, StoreError};
pub use flash::{FlashBackend, MemFlash};
pub use hooks::{NoHook, Phase, PhaseHook};
pub use record::{PageMeta, TAG_INVALID, TAG_LAST};
pub use store::{format_page, EntryRef, InfoStore, PageHandle};
