//! Docker log stream decoding
//!
//! Services without a TTY return stdout/stderr multiplexed into frames:
//! `[stream, 0, 0, 0, len_be32...]` followed by `len` payload bytes.
//! TTY services return raw text.

const HEADER_LEN: usize = 8;

fn looks_multiplexed(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_LEN && bytes[0] <= 2 && bytes[1..4] == [0, 0, 0]
}

/// Strip stream framing and split into non-empty lines
pub fn demux_log_stream(bytes: &[u8]) -> Vec<String> {
    if !looks_multiplexed(bytes) {
        return split_lines(&String::from_utf8_lossy(bytes));
    }

    // Frames split on byte boundaries, so decode only once all payloads are joined
    let mut payload = Vec::with_capacity(bytes.len());
    let mut offset = 0;

    while offset + HEADER_LEN <= bytes.len() {
        let header = &bytes[offset..offset + HEADER_LEN];
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let start = offset + HEADER_LEN;
        // Truncated trailing frame: keep what arrived
        let end = (start + len).min(bytes.len());

        payload.extend_from_slice(&bytes[start..end]);
        offset = end;
    }

    split_lines(&String::from_utf8_lossy(&payload))
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
