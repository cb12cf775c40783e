//! Debug Utilities
//!
//! Formatting helpers for frame dumps and log lines.

/// Debug formatter for memory addresses
pub fn format_address(address: usize) -> String {
    format!("0x{:016X}", address)
}

/// Format `count` words starting at `start`, one per line
///
/// # Safety
///
/// `start .. start + count * WORD_SIZE` must be readable memory.
pub unsafe fn dump_words(start: usize, count: usize) -> String {
    let mut out = String::new();
    for i in 0..count {
        let addr = start + i * super::constants::WORD_SIZE;
        let word = (addr as *const usize).read_volatile();
        out.push_str(&format!("  {}: {}\n", format_address(addr), format_address(word)));
    }
    out
}
