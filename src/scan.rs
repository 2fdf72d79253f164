//! Bounded walk over a page's record sequence.
//!
//! The iterator never trusts a length field further than the page end and
//! caps the number of steps at `page_size / 2` (no record is smaller than
//! two words), so a corrupt `len_words` can neither loop forever nor walk
//! out of the page.

use crate::record::{EntryHeader, PageMeta, HEADER_LEN, TAG_LAST, WORD};

/// Iterator over `(header_offset, header)` pairs, starting right after
/// the metadata header. The terminator is yielded, then iteration stops;
/// a corrupt page simply ends early.
pub struct Records<'a> {
    page: &'a [u8],
    offset: usize,
    steps: usize,
    done: bool,
}

impl<'a> Records<'a> {
    pub fn new(page: &'a [u8], meta: PageMeta) -> Self {
        let start = meta.metadata_len as usize;
        // A misaligned or out-of-range entry region means the metadata
        // itself is corrupt; scan nothing rather than misparse.
        let done = start % WORD != 0 || start + HEADER_LEN > page.len();
        Self {
            page,
            offset: start,
            steps: 0,
            done,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = (usize, EntryHeader);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.steps += 1;
        if self.steps > self.page.len() / 2 || self.offset + HEADER_LEN > self.page.len() {
            self.done = true;
            return None;
        }

        let offset = self.offset;
        let header = EntryHeader::read(self.page, offset);
        if header.tag == TAG_LAST {
            self.done = true;
            return Some((offset, header));
        }
        if header.len_words == 0 || header.next_offset(offset) > self.page.len() {
            // Zero-length or page-crossing record: corrupt, stop here.
            self.done = true;
            return None;
        }
        self.offset = header.next_offset(offset);
        Some((offset, header))
    }
}

pub fn find_first(
    page: &[u8],
    meta: PageMeta,
    predicate: impl Fn(&EntryHeader) -> bool,
) -> Option<usize> {
    Records::new(page, meta)
        .find(|(_, header)| predicate(header))
        .map(|(offset, _)| offset)
}

pub fn find_by_type(page: &[u8], meta: PageMeta, tag: u16) -> Option<usize> {
    find_first(page, meta, |header| header.tag == tag)
}

/// Offset at which the next record may be appended: the reachable
/// terminator, or `None` when the page is corrupt or completely full.
pub fn find_free_space(page: &[u8], meta: PageMeta) -> Option<usize> {
    find_by_type(page, meta, TAG_LAST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{encode, PageMeta, TAG_INVALID};

    fn page_with(entries: &[(u16, &[u8])]) -> Vec<u8> {
        let mut page = vec![0xFF; 256];
        page[..PageMeta::LEN].copy_from_slice(&PageMeta::DEFAULT.to_bytes());
        let mut offset = PageMeta::LEN;
        for &(tag, payload) in entries {
            let rec = encode(tag, payload);
            page[offset..offset + rec.len()].copy_from_slice(&rec);
            offset += rec.len();
        }
        page
    }

    #[test]
    fn walks_records_and_stops_at_terminator() {
        let page = page_with(&[(1, &[0xAA; 4]), (2, &[0xBB; 8]), (3, &[])]);
        let seen: Vec<_> = Records::new(&page, PageMeta::DEFAULT).collect();
        assert_eq!(seen.len(), 4, "three records plus the terminator");
        assert_eq!(seen[0].0, 8);
        assert_eq!(seen[1].0, 16);
        assert_eq!(seen[2].0, 28);
        assert_eq!(seen[3].1.tag, TAG_LAST);
    }

    #[test]
    fn find_by_type_skips_other_tags() {
        let page = page_with(&[(1, &[0x11; 4]), (2, &[0x22; 4])]);
        assert_eq!(find_by_type(&page, PageMeta::DEFAULT, 2), Some(16));
        assert_eq!(find_by_type(&page, PageMeta::DEFAULT, 9), None);
    }

    #[test]
    fn find_by_type_sees_invalidated_headers_too() {
        // The scanner reports every record; filtering live ones is the
        // store's business.
        let page = page_with(&[(TAG_INVALID, &[0x11; 4]), (2, &[0x22; 4])]);
        assert_eq!(find_by_type(&page, PageMeta::DEFAULT, TAG_INVALID), Some(8));
    }

    #[test]
    fn free_space_is_the_terminator_offset() {
        let page = page_with(&[(1, &[0xAA; 4])]);
        assert_eq!(find_free_space(&page, PageMeta::DEFAULT), Some(16));
    }

    #[test]
    fn zero_length_record_ends_the_scan() {
        let mut page = page_with(&[(1, &[0xAA; 4])]);
        // Corrupt the first record's length to zero.
        page[8] = 0;
        page[9] = 0;
        assert_eq!(find_free_space(&page, PageMeta::DEFAULT), None);
    }

    #[test]
    fn page_crossing_record_ends_the_scan() {
        let mut page = page_with(&[(1, &[0xAA; 4])]);
        // Length field claiming far past the page end.
        page[8] = 0xF0;
        page[9] = 0x00;
        assert_eq!(find_free_space(&page, PageMeta::DEFAULT), None);
    }

    #[test]
    fn all_zero_page_is_corrupt() {
        let page = vec![0x00; 256];
        assert_eq!(find_free_space(&page, PageMeta::read(&page)), None);
    }

    #[test]
    fn erased_page_has_misaligned_meta_and_scans_empty() {
        let page = vec![0xFF; 256];
        let meta = PageMeta::read(&page);
        assert_eq!(meta.metadata_len, 0xFF);
        assert!(Records::new(&page, meta).next().is_none());
    }

    #[test]
    fn formatted_empty_page_reads_terminator_immediately() {
        let page = page_with(&[]);
        assert_eq!(find_free_space(&page, PageMeta::DEFAULT), Some(8));
    }
}
