//! Binary layout of the on-flash records: the page metadata header, the
//! per-entry header, and the encoder that builds a word-aligned record
//! image ready for a single `store` call.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, BytesMut};

/// Flash program granularity. Every header and record image starts on a
/// word boundary.
pub const WORD: usize = 4;

/// Size of an entry header: `len_words: u16` + `type_tag: u16`.
pub const HEADER_LEN: usize = 4;

/// Logically deleted record. All bits cleared, so flipping any live tag
/// to this value is a pure bit-clearing write.
pub const TAG_INVALID: u16 = 0x0000;

/// Terminator sentinel: everything past this record is unused. Matches
/// the erased flash pattern, so a freshly erased tail already reads as
/// the terminator without a single programmed bit.
pub const TAG_LAST: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Total record length (header + padded payload) in words, >= 1 for
    /// any well-formed record.
    pub len_words: u16,
    pub tag: u16,
}

impl EntryHeader {
    pub fn read(page: &[u8], offset: usize) -> Self {
        debug_assert_eq!(offset % WORD, 0);
        Self {
            len_words: LittleEndian::read_u16(&page[offset..offset + 2]),
            tag: LittleEndian::read_u16(&page[offset + 2..offset + 4]),
        }
    }

    pub fn write(&self, out: &mut [u8; HEADER_LEN]) {
        LittleEndian::write_u16(&mut out[0..2], self.len_words);
        LittleEndian::write_u16(&mut out[2..4], self.tag);
    }

    pub fn len_bytes(&self) -> usize {
        self.len_words as usize * WORD
    }

    /// Offset of the record immediately following this one. No bounds
    /// check; the scanner bounds the result against the page end.
    pub fn next_offset(&self, offset: usize) -> usize {
        offset + self.len_bytes()
    }
}

/// Total record size for a payload of `payload_len` bytes, rounded up to
/// a word boundary.
pub fn aligned_len(payload_len: usize) -> usize {
    (HEADER_LEN + payload_len + WORD - 1) & !(WORD - 1)
}

/// Build the record image: header, payload, then 0xFF padding up to the
/// word boundary so the padding bytes stay programmable later.
pub fn encode(tag: u16, payload: &[u8]) -> BytesMut {
    let total = aligned_len(payload.len());
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u16_le((total / WORD) as u16);
    buf.put_u16_le(tag);
    buf.put_slice(payload);
    buf.resize(total, 0xFF);
    buf
}

/// Fixed prefix at the start of every page. Written once when the page
/// is formatted; compaction rewrites it verbatim as part of the whole
/// page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    /// Byte length of this header; the entry region starts here.
    pub metadata_len: u8,
    /// Bytes added to a header offset to obtain the caller-visible
    /// entry address.
    pub entry_header_len: u8,
}

impl PageMeta {
    pub const LEN: usize = 8;

    pub const DEFAULT: PageMeta = PageMeta {
        metadata_len: Self::LEN as u8,
        entry_header_len: HEADER_LEN as u8,
    };

    pub fn read(page: &[u8]) -> Self {
        Self {
            metadata_len: page[0],
            entry_header_len: page[1],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0xFF; Self::LEN];
        buf[0] = self.metadata_len;
        buf[1] = self.entry_header_len;
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = EntryHeader {
            len_words: 3,
            tag: 0xA5C3,
        };
        let mut buf = [0u8; HEADER_LEN];
        header.write(&mut buf);
        assert_eq!(EntryHeader::read(&buf, 0), header);
    }

    #[test]
    fn encode_pads_to_word_boundary() {
        let rec = encode(0x0102, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        assert_eq!(rec.len(), 12);
        let header = EntryHeader::read(&rec, 0);
        assert_eq!(header.len_words, 3);
        assert_eq!(header.tag, 0x0102);
        assert_eq!(&rec[4..9], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        assert_eq!(&rec[9..12], &[0xFF; 3], "padding must stay erased");
    }

    #[test]
    fn encode_exact_word_payload_has_no_padding() {
        let rec = encode(7, &[1, 2, 3, 4]);
        assert_eq!(rec.len(), 8);
        assert_eq!(EntryHeader::read(&rec, 0).len_words, 2);
    }

    #[test]
    fn zero_payload_record_is_one_word() {
        let rec = encode(9, &[]);
        assert_eq!(rec.len(), HEADER_LEN);
        assert_eq!(EntryHeader::read(&rec, 0).len_words, 1);
    }

    #[test]
    fn next_offset_advances_by_record_length() {
        let header = EntryHeader {
            len_words: 4,
            tag: 1,
        };
        assert_eq!(header.next_offset(8), 24);
    }

    #[test]
    fn meta_round_trip_keeps_reserved_erased() {
        let bytes = PageMeta::DEFAULT.to_bytes();
        assert_eq!(bytes[0], 8);
        assert_eq!(bytes[1], 4);
        assert_eq!(&bytes[2..], &[0xFF; 6]);
        assert_eq!(PageMeta::read(&bytes), PageMeta::DEFAULT);
    }
}
