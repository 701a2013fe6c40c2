//! Hex dump formatting

use std::fmt::Write;

/// Bytes per hex dump line
const LINE_LEN: usize = 16;

/// Format `data` as offset, hex bytes and printable ASCII, 16 bytes per line
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();

    for (i, line) in data.chunks(LINE_LEN).enumerate() {
        let _ = write!(out, "{:08x}:", i * LINE_LEN);
        for b in line {
            let _ = write!(out, " {:02x}", b);
        }
        for _ in line.len()..LINE_LEN {
            out.push_str("   ");
        }

        out.push_str("  |");
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }

    out
}
