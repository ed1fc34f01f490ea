//! Byte-signature matching over buffers and over guarded host memory.

use tracing::debug;

use crate::memory::ReadMemory;

use super::signature::Pattern;

/// Bytes fetched per read while scanning host memory
pub const SCAN_CHUNK_SIZE: usize = 0x10000;

/// Half-open address range `[start, start + len)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub start: u64,
    pub len: u64,
}

impl ScanRange {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// The host's whole module image
    pub fn module<R: ReadMemory + ?Sized>(reader: &R) -> Self {
        Self::new(reader.base_address(), reader.image_size())
    }

    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len)
    }
}

/// Index of the first match at or after `from` inside `buffer`
pub fn find_in_buffer(buffer: &[u8], pattern: &Pattern, from: usize) -> Option<usize> {
    if pattern.is_empty() || buffer.len() < pattern.len() {
        return None;
    }
    let last = buffer.len() - pattern.len();
    if from > last {
        return None;
    }

    let Some((anchor_index, anchor_value)) = pattern.anchor() else {
        // All wildcards: matches the first position scanned.
        return Some(from);
    };

    let mut pos = from;
    while pos <= last {
        let haystack = &buffer[pos + anchor_index..=last + anchor_index];
        let found = memchr::memchr(anchor_value, haystack)?;
        let candidate = pos + found;
        if pattern.matches_at(&buffer[candidate..]) {
            return Some(candidate);
        }
        pos = candidate + 1;
    }

    None
}

/// Every match inside `buffer`, as absolute addresses starting at `base_addr`
pub fn find_all_in_buffer(buffer: &[u8], base_addr: u64, pattern: &Pattern) -> Vec<u64> {
    let mut results = Vec::new();
    let mut from = 0;
    while let Some(pos) = find_in_buffer(buffer, pattern, from) {
        results.push(base_addr + pos as u64);
        from = pos + 1;
    }
    results
}

/// First match of `pattern` inside `range` of host memory.
///
/// Memory is read in chunks; a chunk that cannot be read whole is retried page
/// by page, and pages that stay unreadable are treated as "no match here".
pub fn scan_first<R: ReadMemory + ?Sized>(
    reader: &R,
    range: ScanRange,
    pattern: &Pattern,
) -> Option<u64> {
    let mut found = None;
    scan_chunks(reader, range, pattern, |data, data_base| {
        found = find_in_buffer(data, pattern, 0).map(|pos| data_base + pos as u64);
        found.is_some()
    });
    found
}

/// Every match of `pattern` inside `range` of host memory, ascending
pub fn scan_all<R: ReadMemory + ?Sized>(reader: &R, range: ScanRange, pattern: &Pattern) -> Vec<u64> {
    let mut results = Vec::new();
    scan_chunks(reader, range, pattern, |data, data_base| {
        results.extend(find_all_in_buffer(data, data_base, pattern));
        false
    });
    results.sort_unstable();
    results.dedup();
    results
}

/// Feed `visit` contiguous readable spans of `range`, each prefixed with the
/// tail of the previous span so matches straddling a chunk boundary are seen.
/// `visit` returns `true` to stop early.
fn scan_chunks<R, F>(reader: &R, range: ScanRange, pattern: &Pattern, mut visit: F)
where
    R: ReadMemory + ?Sized,
    F: FnMut(&[u8], u64) -> bool,
{
    let keep = pattern.len().saturating_sub(1);
    let end = range.end();
    let mut cursor = range.start;
    let mut tail: Vec<u8> = Vec::new();
    let mut tail_end = cursor;

    while cursor < end {
        let size = ((end - cursor) as usize).min(SCAN_CHUNK_SIZE);

        let spans = match reader.read_bytes(cursor, size) {
            Ok(bytes) => vec![(cursor, bytes)],
            Err(_) => {
                debug!(
                    "Chunk at {:#x} ({:#x} bytes) not fully readable, falling back to pages",
                    cursor, size
                );
                reader.read_pages(cursor, size)
            }
        };

        for (span_base, bytes) in spans {
            if span_base != tail_end {
                // A gap of unreadable memory: nothing can match across it.
                tail.clear();
            }

            let mut data = Vec::with_capacity(tail.len() + bytes.len());
            data.extend_from_slice(&tail);
            data.extend_from_slice(&bytes);
            let data_base = span_base - tail.len() as u64;

            if visit(&data, data_base) {
                return;
            }

            tail = if data.len() > keep {
                data[data.len() - keep..].to_vec()
            } else {
                data
            };
            tail_end = span_base + bytes.len() as u64;
        }

        cursor += size as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;

    fn pattern(s: &str) -> Pattern {
        Pattern::parse(s).unwrap()
    }

    #[test]
    fn test_find_in_buffer_exact_and_wildcard() {
        let buffer = [0x90, 0x48, 0x8B, 0x05, 0x11, 0x22, 0x48, 0x8B, 0x06];
        assert_eq!(find_in_buffer(&buffer, &pattern("48 8b 05"), 0), Some(1));
        assert_eq!(find_in_buffer(&buffer, &pattern("48 8b ?"), 2), Some(6));
        assert_eq!(find_in_buffer(&buffer, &pattern("48 8b 07"), 0), None);
    }

    #[test]
    fn test_find_in_buffer_leading_wildcard() {
        let buffer = [0xE8, 0x00, 0xE8, 0x90];
        assert_eq!(find_in_buffer(&buffer, &pattern("? e8 90"), 0), Some(1));
    }

    #[test]
    fn test_all_wildcards_match_first_position() {
        let buffer = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(find_in_buffer(&buffer, &pattern("? ?"), 0), Some(0));
        assert_eq!(find_in_buffer(&buffer, &pattern("? ?"), 2), Some(2));
        assert_eq!(find_in_buffer(&buffer, &pattern("? ?"), 3), None);
    }

    #[test]
    fn test_find_all_in_buffer() {
        let buffer = [0xCC, 0xCC, 0xCC];
        assert_eq!(
            find_all_in_buffer(&buffer, 0x1000, &pattern("cc cc")),
            vec![0x1000, 0x1001]
        );
    }

    #[test]
    fn test_scan_finds_match_across_chunk_boundary() {
        let mut image = vec![0u8; SCAN_CHUNK_SIZE * 2];
        let at = SCAN_CHUNK_SIZE - 2;
        image[at..at + 4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let memory = MockMemoryBuilder::new().image(0x40_0000, image).build();

        let range = ScanRange::module(&memory);
        assert_eq!(
            scan_first(&memory, range, &pattern("de ad be ef")),
            Some(0x40_0000 + at as u64)
        );
    }

    #[test]
    fn test_scan_skips_unreadable_pages() {
        let mut first = vec![0u8; 0x1000];
        first[0x10..0x13].copy_from_slice(&[0x11, 0x22, 0x33]);
        let mut third = vec![0u8; 0x1000];
        third[0x20..0x23].copy_from_slice(&[0xAA, 0xBB, 0xCC]);

        let memory = MockMemoryBuilder::new()
            .image(0x40_0000, first)
            .reserved(0x40_1000, 0x1000)
            .data(0x40_2000, third)
            .build();

        let range = ScanRange::new(0x40_0000, 0x3000);
        assert_eq!(
            scan_first(&memory, range, &pattern("aa bb cc")),
            Some(0x40_2020)
        );
        assert_eq!(
            scan_all(&memory, range, &pattern("? 22 33")),
            vec![0x40_0010]
        );
    }

    #[test]
    fn test_scan_no_match_returns_none() {
        let memory = MockMemoryBuilder::new()
            .image(0x40_0000, vec![0x90; 0x2000])
            .build();
        assert_eq!(
            scan_first(&memory, ScanRange::module(&memory), &pattern("c3")),
            None
        );
    }
}
