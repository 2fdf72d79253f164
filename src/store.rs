//! The entry store engine: lookup, upsert with invalidate-old/append-new,
//! overflow-triggered compaction, and dual-page crash recovery.
//!
//! Crash-safety rests on two orderings, both enforced here:
//! 1. a new record is durable before the old copy is invalidated;
//! 2. compaction persists the rebuilt image to the bank page before the
//!    primary page, so `init` can restore the primary from the bank.

use crate::error::{Result, StoreError};
use crate::flash::FlashBackend;
use crate::hooks::{NoHook, Phase, PhaseHook};
use crate::record::{self, EntryHeader, PageMeta, HEADER_LEN, TAG_INVALID, TAG_LAST, WORD};
use crate::scan;

/// Caller-visible location of a stored entry: the page it lives in and
/// the byte offset of its payload within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    pub page: u32,
    pub offset: usize,
}

impl EntryRef {
    pub fn addr(&self) -> u32 {
        self.page + self.offset as u32
    }
}

/// Read-only view of one page image.
pub struct PageHandle<'a> {
    base: u32,
    bytes: &'a [u8],
}

impl<'a> PageHandle<'a> {
    pub fn addr(&self) -> u32 {
        self.base
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn meta(&self) -> PageMeta {
        PageMeta::read(self.bytes)
    }

    pub fn records(&self) -> scan::Records<'a> {
        scan::Records::new(self.bytes, self.meta())
    }
}

/// Erase a page and write a fresh metadata header, leaving an empty but
/// well-formed page (the erased tail past the metadata already reads as
/// the terminator). First-boot provisioning; `init` never formats.
pub fn format_page<F: FlashBackend>(
    flash: &mut F,
    page_addr: u32,
    page_size: usize,
) -> Result<()> {
    if page_size < PageMeta::LEN || page_addr as usize % page_size != 0 {
        return Err(StoreError::AddressInvalid(page_addr));
    }
    flash.erase(page_addr, page_size);
    flash.store(page_addr, &PageMeta::DEFAULT.to_bytes());
    Ok(())
}

/// The store handle. Owns the flash backend and the two page addresses;
/// every mutating operation takes `&mut self`, so exclusive access is
/// enforced by the type system rather than by convention.
#[derive(Debug)]
pub struct InfoStore<F: FlashBackend, H: PhaseHook = NoHook> {
    flash: F,
    hooks: H,
    primary: u32,
    bank: u32,
    page_size: usize,
}

impl<F: FlashBackend> InfoStore<F, NoHook> {
    /// Validate both page addresses and run recovery. See
    /// [`InfoStore::init_with_hooks`].
    pub fn init(flash: F, primary: u32, bank: u32, page_size: usize) -> Result<Self> {
        Self::init_with_hooks(flash, primary, bank, page_size, NoHook)
    }
}

impl<F: FlashBackend, H: PhaseHook> InfoStore<F, H> {
    /// Validate the page geometry, then make the primary page usable: if
    /// it lacks a reachable terminator the bank image is copied over it;
    /// if the bank lacks one too the store is gone for good and the
    /// caller gets [`StoreError::Unrecoverable`], which it must treat as
    /// a halt condition.
    ///
    /// Rejects page addresses that are not a multiple of `page_size`,
    /// and a `page_size` too small to hold a metadata header or not
    /// word-aligned, all before touching flash.
    pub fn init_with_hooks(
        mut flash: F,
        primary: u32,
        bank: u32,
        page_size: usize,
        hooks: H,
    ) -> Result<Self> {
        if page_size < PageMeta::LEN || page_size % WORD != 0 {
            return Err(StoreError::AddressInvalid(primary));
        }
        if primary as usize % page_size != 0 {
            return Err(StoreError::AddressInvalid(primary));
        }
        if bank as usize % page_size != 0 {
            return Err(StoreError::AddressInvalid(bank));
        }

        hooks.enter(Phase::Init);
        if Self::free_space_at(&flash, primary, page_size).is_none() {
            if Self::free_space_at(&flash, bank, page_size).is_none() {
                hooks.exit(Phase::Init);
                return Err(StoreError::Unrecoverable);
            }
            // Compaction writes the bank before the primary, so a valid
            // bank is the authoritative post-crash image.
            let image = flash.read(bank, page_size).to_vec();
            flash.erase(primary, page_size);
            flash.store(primary, &image);
        }
        hooks.exit(Phase::Init);

        Ok(Self {
            flash,
            hooks,
            primary,
            bank,
            page_size,
        })
    }

    fn free_space_at(flash: &F, page: u32, page_size: usize) -> Option<usize> {
        let bytes = flash.read(page, page_size);
        scan::find_free_space(bytes, PageMeta::read(bytes))
    }

    /// Read-only view of the current primary page image.
    pub fn primary(&self) -> PageHandle<'_> {
        PageHandle {
            base: self.primary,
            bytes: self.flash.read(self.primary, self.page_size),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Hand the backend back, consuming the store.
    pub fn into_flash(self) -> F {
        self.flash
    }

    /// Find the live entry of `tag` in the primary page.
    pub fn get(&self, tag: u16) -> Option<EntryRef> {
        self.entry_get(self.primary, tag)
    }

    /// Find the live entry of `tag` in an arbitrary page (primary or
    /// bank). No side effects; a miss is a normal outcome.
    pub fn entry_get(&self, page: u32, tag: u16) -> Option<EntryRef> {
        self.hooks.enter(Phase::Lookup);
        let bytes = self.flash.read(page, self.page_size);
        let meta = PageMeta::read(bytes);
        let found = scan::find_by_type(bytes, meta, tag).map(|offset| EntryRef {
            page,
            offset: offset + meta.entry_header_len as usize,
        });
        self.hooks.exit(Phase::Lookup);
        found
    }

    /// Payload bytes of a previously located entry, padding included.
    pub fn payload(&self, entry: &EntryRef) -> &[u8] {
        let bytes = self.flash.read(entry.page, self.page_size);
        let meta = PageMeta::read(bytes);
        let header_off = entry.offset - meta.entry_header_len as usize;
        let header = EntryHeader::read(bytes, header_off);
        &bytes[entry.offset..header_off + header.len_bytes()]
    }

    /// Upsert: append the new record, then invalidate the previous one
    /// of the same tag. When the page has no room left (one word stays
    /// reserved for a fresh terminator), the page is compacted with the
    /// new record substituted in place of the old.
    ///
    /// The payload is borrowed for the whole call while the store owns
    /// the flash exclusively, so a payload aliasing the primary page
    /// cannot be constructed by safe callers.
    pub fn put(&mut self, tag: u16, payload: &[u8]) -> Result<EntryRef> {
        if tag == TAG_INVALID || tag == TAG_LAST {
            return Err(StoreError::ReservedType(tag));
        }
        self.hooks.enter(Phase::Put);
        let result = self.put_inner(tag, payload);
        self.hooks.exit(Phase::Put);
        result
    }

    fn put_inner(&mut self, tag: u16, payload: &[u8]) -> Result<EntryRef> {
        let encoded_len = record::aligned_len(payload.len());

        let bytes = self.flash.read(self.primary, self.page_size);
        let meta = PageMeta::read(bytes);
        if meta.metadata_len as usize + encoded_len + HEADER_LEN > self.page_size {
            // Cannot fit even in an empty page; compaction would not help.
            return Err(StoreError::PageOverflow);
        }
        let old = scan::find_by_type(bytes, meta, tag);
        let free = scan::find_free_space(bytes, meta);

        match free {
            Some(free_off) if free_off + encoded_len + HEADER_LEN <= self.page_size => {
                // Fast path: one store covers the record and the
                // terminator word that follows it (all-ones, so the
                // erased cells are untouched), then the old copy is
                // invalidated. New-before-old is what keeps a crash
                // between the two writes from losing both copies.
                let mut image = record::encode(tag, payload);
                image.extend_from_slice(&[0xFF; HEADER_LEN]);
                self.flash.store(self.primary + free_off as u32, &image);
                if let Some(old_off) = old {
                    self.invalidate(old_off);
                }
                Ok(EntryRef {
                    page: self.primary,
                    offset: free_off + meta.entry_header_len as usize,
                })
            }
            _ => {
                let header_off = self
                    .rebuild(Some((tag, payload)))?
                    .expect("rebuild always places the replacement record");
                Ok(EntryRef {
                    page: self.primary,
                    offset: header_off + meta.entry_header_len as usize,
                })
            }
        }
    }

    /// Flip a record's type tag to `TAG_INVALID`. The length field is
    /// rewritten unchanged and the tag goes to all-zeroes, so the write
    /// only clears bits.
    fn invalidate(&mut self, header_off: usize) {
        self.hooks.enter(Phase::Invalidate);
        let bytes = self.flash.read(self.primary, self.page_size);
        let mut header = EntryHeader::read(bytes, header_off);
        header.tag = TAG_INVALID;
        let mut buf = [0u8; HEADER_LEN];
        header.write(&mut buf);
        self.flash.store(self.primary + header_off as u32, &buf);
        self.hooks.exit(Phase::Invalidate);
    }

    /// Rebuild both pages from the currently live entries, dropping
    /// invalidated ones. Running it twice in a row leaves bit-identical
    /// images.
    pub fn reset(&mut self) -> Result<()> {
        self.rebuild(None).map(|_| ())
    }

    /// Compaction: rebuild the page in a RAM scratch image, keeping the
    /// metadata header and every live record in scan order. When
    /// `replace` is given, the record of that tag is substituted with
    /// the new encoding (appended if the tag was not present), and its
    /// header offset in the new image is returned.
    ///
    /// Persist order is the crash-safety linchpin: bank first, then
    /// primary. A crash after the bank write leaves a valid bank for
    /// `init` to restore from; a crash before it leaves the original
    /// primary untouched.
    fn rebuild(&mut self, replace: Option<(u16, &[u8])>) -> Result<Option<usize>> {
        self.hooks.enter(Phase::Compact);
        let result = self.rebuild_inner(replace);
        self.hooks.exit(Phase::Compact);
        result
    }

    fn rebuild_inner(&mut self, replace: Option<(u16, &[u8])>) -> Result<Option<usize>> {
        let old = self.flash.read(self.primary, self.page_size).to_vec();
        let meta = PageMeta::read(&old);
        let meta_len = meta.metadata_len as usize;

        let mut image = vec![0xFF; self.page_size];
        image[..meta_len].copy_from_slice(&old[..meta_len]);
        let mut next = meta_len;
        let mut replaced_at = None;

        for (offset, header) in scan::Records::new(&old, meta) {
            if header.tag == TAG_LAST {
                break;
            }
            if header.tag == TAG_INVALID {
                continue;
            }
            if let Some((tag, payload)) = replace {
                if header.tag == tag {
                    next = Self::emit(&mut image, next, &record::encode(tag, payload))?;
                    replaced_at = Some(next - record::aligned_len(payload.len()));
                    continue;
                }
            }
            let len = header.len_bytes();
            next = Self::emit(&mut image, next, &old[offset..offset + len])?;
        }

        if replaced_at.is_none() {
            if let Some((tag, payload)) = replace {
                // The tag was not present in the old image; append the
                // new record after the survivors.
                next = Self::emit(&mut image, next, &record::encode(tag, payload))?;
                replaced_at = Some(next - record::aligned_len(payload.len()));
            }
        }
        // The all-ones tail past `next` already reads as the terminator.

        self.flash.erase(self.bank, self.page_size);
        self.flash.store(self.bank, &image);
        self.flash.erase(self.primary, self.page_size);
        self.flash.store(self.primary, &image);

        Ok(replaced_at)
    }

    /// Copy one record into the scratch image, keeping one word free for
    /// the terminator.
    fn emit(image: &mut [u8], next: usize, rec: &[u8]) -> Result<usize> {
        if next + rec.len() + HEADER_LEN > image.len() {
            return Err(StoreError::PageOverflow);
        }
        image[next..next + rec.len()].copy_from_slice(rec);
        Ok(next + rec.len())
    }
}
