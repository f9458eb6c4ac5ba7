//! Swap table parsing
//!
//! Two sources describe active swap areas:
//! - `swapon --show=NAME,TYPE,SIZE,USED,PRIO --bytes --noheadings --raw`
//! - `/proc/swaps`, used when swapon is unavailable

use crate::error::{Error, Result};
use crate::types::{SwapEntry, SwapKind};
use std::path::PathBuf;

/// Arguments for the swap table query
pub const SWAPON_SHOW_ARGS: [&str; 5] = [
    "swapon",
    "--show=NAME,TYPE,SIZE,USED,PRIO",
    "--bytes",
    "--noheadings",
    "--raw",
];

/// Parse `swapon --show` raw output.
///
/// Format (one area per line, sizes in bytes):
/// ```text
/// /dev/nvme0n1p3 partition 8589930496 0 -2
/// /swapfile file 17179865088 1048576 -3
/// /dev/zram0 partition 8589930496 4096 100
/// ```
pub fn parse_swapon(content: &str) -> Result<Vec<SwapEntry>> {
    let mut entries = Vec::new();

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(Error::Parse(format!(
                "Expected 5 swapon columns, got {}: {}",
                parts.len(),
                line
            )));
        }

        let path = unescape_raw(parts[0]);
        entries.push(SwapEntry {
            kind: classify(parts[1], &path),
            path: PathBuf::from(path),
            size_bytes: parse_u64(parts[2], "SIZE")?,
            used_bytes: parse_u64(parts[3], "USED")?,
            priority: parse_i32(parts[4], "PRIO")?,
        });
    }

    Ok(entries)
}

/// Parse `/proc/swaps`.
///
/// Format (sizes in KiB, spaces in names escaped as `\040`):
/// ```text
/// Filename                                Type            Size            Used            Priority
/// /swapfile                               file            8388604         0               -2
/// ```
pub fn parse_proc_swaps(content: &str) -> Result<Vec<SwapEntry>> {
    let mut entries = Vec::new();

    for line in content.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(Error::Parse(format!(
                "Expected 5 /proc/swaps columns, got {}: {}",
                parts.len(),
                line
            )));
        }

        let path = parts[0].replace("\\040", " ");
        entries.push(SwapEntry {
            kind: classify(parts[1], &path),
            path: PathBuf::from(path),
            size_bytes: parse_u64(parts[2], "Size")?.saturating_mul(1024),
            used_bytes: parse_u64(parts[3], "Used")?.saturating_mul(1024),
            priority: parse_i32(parts[4], "Priority")?,
        });
    }

    Ok(entries)
}

/// The largest swap area that can hold a hibernation image
pub fn hibernation_candidate(entries: &[SwapEntry]) -> Option<&SwapEntry> {
    entries
        .iter()
        .filter(|e| !e.is_zram())
        .max_by_key(|e| e.size_bytes)
}

/// TYPE column first, path type when the column is something else
fn classify(type_column: &str, path: &str) -> SwapKind {
    match type_column {
        "partition" => SwapKind::Partition,
        "file" => SwapKind::File,
        _ if path.starts_with("/dev/") => SwapKind::Partition,
        _ => SwapKind::File,
    }
}

/// Undo the `\xHH` escaping of util-linux raw output
fn unescape_raw(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1] == b'x'
            && bytes[i + 2].is_ascii_hexdigit()
            && bytes[i + 3].is_ascii_hexdigit()
        {
            if let Ok(byte) = u8::from_str_radix(&value[i + 2..i + 4], 16) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).to_string()
}

fn parse_u64(value: &str, column: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|e| Error::Parse(format!("Failed to parse {} '{}': {}", column, value, e)))
}

fn parse_i32(value: &str, column: &str) -> Result<i32> {
    value
        .parse::<i32>()
        .map_err(|e| Error::Parse(format!("Failed to parse {} '{}': {}", column, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_swapon_mixed() {
        let content = "/dev/nvme0n1p3 partition 8589930496 0 -2\n\
                       /swapfile file 17179865088 1048576 -3\n\
                       /dev/zram0 partition 8589930496 4096 100\n";

        let entries = parse_swapon(content).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].path, PathBuf::from("/dev/nvme0n1p3"));
        assert_eq!(entries[0].kind, SwapKind::Partition);
        assert_eq!(entries[0].priority, -2);

        assert_eq!(entries[1].kind, SwapKind::File);
        assert_eq!(entries[1].size_bytes, 17179865088);
        assert_eq!(entries[1].used_bytes, 1048576);

        assert!(entries[2].is_zram());
    }

    #[test]
    fn test_parse_swapon_empty() {
        assert!(parse_swapon("").unwrap().is_empty());
        assert!(parse_swapon("\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_swapon_escaped_name() {
        let entries = parse_swapon("/mnt/my\\x20swap file 1024 0 -2\n").unwrap();
        assert_eq!(entries[0].path, PathBuf::from("/mnt/my swap"));
    }

    #[test]
    fn test_parse_swapon_bad_columns() {
        let err = parse_swapon("/swapfile file 1024\n").unwrap_err();
        assert!(err.to_string().contains("Expected 5 swapon columns"));

        let err = parse_swapon("/swapfile file 1G 0 -2\n").unwrap_err();
        assert!(err.to_string().contains("SIZE"));
    }

    #[test]
    fn test_classify_by_path_when_type_unknown() {
        let entries = parse_swapon("/dev/sdb2 unknown 1024 0 -2\n/data/swap unknown 1024 0 -3\n")
            .unwrap();
        assert_eq!(entries[0].kind, SwapKind::Partition);
        assert_eq!(entries[1].kind, SwapKind::File);
    }

    #[test]
    fn test_parse_proc_swaps() {
        let content = "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n\
                       /swapfile                               file\t\t8388604\t\t0\t\t-2\n\
                       /dev/zram0                              partition\t8388604\t\t512\t\t100\n";

        let entries = parse_proc_swaps(content).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].size_bytes, 8388604 * 1024);
        assert_eq!(entries[0].kind, SwapKind::File);
        assert_eq!(entries[1].used_bytes, 512 * 1024);
    }

    #[test]
    fn test_parse_proc_swaps_header_only() {
        let content = "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n";
        assert!(parse_proc_swaps(content).unwrap().is_empty());
    }

    #[test]
    fn test_candidate_skips_zram() {
        let content = "/dev/zram0 partition 34359738368 0 100\n\
                       /dev/sda2 partition 2147479552 0 -2\n";
        let entries = parse_swapon(content).unwrap();

        let candidate = hibernation_candidate(&entries).unwrap();
        assert_eq!(candidate.path, PathBuf::from("/dev/sda2"));
    }

    #[test]
    fn test_candidate_none_with_only_zram() {
        let entries = parse_swapon("/dev/zram0 partition 8589930496 0 100\n").unwrap();
        assert!(hibernation_candidate(&entries).is_none());
    }
}
