//! Canned flash and store builders shared by the test suites.

use crate::flash::MemFlash;
use crate::store::{format_page, InfoStore};

/// Two freshly formatted pages back to back: primary at address 0, bank
/// right after it.
pub fn dual_page_flash(page_size: usize) -> MemFlash {
    let mut flash = MemFlash::new(0, page_size * 2);
    format_page(&mut flash, 0, page_size).expect("format primary page");
    format_page(&mut flash, page_size as u32, page_size).expect("format bank page");
    flash
}

/// An initialized store over [`dual_page_flash`] pages.
pub fn mem_store(page_size: usize) -> InfoStore<MemFlash> {
    InfoStore::init(dual_page_flash(page_size), 0, page_size as u32, page_size)
        .expect("init over freshly formatted pages")
}
