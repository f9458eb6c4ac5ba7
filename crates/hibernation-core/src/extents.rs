//! Physical layout of swap files
//!
//! The kernel reads a hibernation image from a swap file without filesystem
//! support, by physical offset. These helpers parse the physical-extent
//! queries and derive the `resume_offset` value from them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Filesystem families that can hold a resumable swap file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsFamily {
    Ext,
    Xfs,
    Btrfs,
}

impl FsFamily {
    pub fn from_fstype(fstype: &str) -> Option<Self> {
        match fstype {
            "ext2" | "ext3" | "ext4" => Some(FsFamily::Ext),
            "xfs" => Some(FsFamily::Xfs),
            "btrfs" => Some(FsFamily::Btrfs),
            _ => None,
        }
    }
}

/// Filesystem holding the swap file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemInfo {
    pub fstype: String,
    pub uuid: String,
}

impl FilesystemInfo {
    /// Parse `findmnt -no FSTYPE,UUID -T <dir>`, e.g. `ext4 1b2c3d4e-...`
    pub fn parse_findmnt(content: &str) -> Result<Self> {
        let line = content
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::Parse("findmnt printed nothing".to_string()))?;

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [fstype, uuid] => Ok(Self {
                fstype: fstype.to_string(),
                uuid: uuid.to_string(),
            }),
            [fstype] => Err(Error::UnsupportedConfiguration(format!(
                "the {} filesystem holding the swap file has no UUID to resume from",
                fstype
            ))),
            _ => Err(Error::Parse(format!("Unexpected findmnt output: {}", line))),
        }
    }

    pub fn family(&self) -> Option<FsFamily> {
        FsFamily::from_fstype(&self.fstype)
    }
}

/// awk program turning `filefrag -v` output into a `resume_offset`.
///
/// Extents are merged when physically adjacent. The program prints the first
/// physical block converted to pages, or a reason and exits with
/// [`UNSUPPORTED_LAYOUT_EXIT`] when the file cannot be resumed from. It runs
/// inside the privileged batch, before the swap file is activated.
///
/// Input format:
/// ```text
/// Filesystem type is: ef53
/// File size of /swapfile is 8589934592 (2097152 blocks of 4096 bytes)
///  ext:     logical_offset:        physical_offset: length:   expected: flags:
///    0:        0..   32767:      34816..     67583:  32768:
///    1:    32768..   65535:      67584..    100351:  32768:             last,eof
/// /swapfile: 1 extent found
/// ```
pub const FILEFRAG_RESUME_OFFSET_AWK: &str = r#"BEGIN { FS = ":" }
/ blocks of / {
    n = split($0, w, " ")
    for (i = 2; i < n; i++) if (w[i - 1] == "blocks" && w[i] == "of") bs = w[i + 1] + 0
}
$1 ~ /^ *[0-9]+ *$/ && NF >= 4 {
    split($3, p, /\.\./)
    start = p[1] + 0
    if (extents == 0) { first = start; runs = 1 }
    else if (start != end + 1) runs++
    end = p[2] + 0
    extents++
    if ($NF ~ /unknown_loc|delalloc|inline|encoded|shared/) flagged = 1
}
END {
    if (bs == 0 || extents == 0) { print "filefrag listed no extents"; exit 2 }
    if (flagged) { print "swap file extents have no stable physical location"; exit 3 }
    if (runs > 1) { print "swap file is split into " runs " non-contiguous physical runs"; exit 3 }
    if ((first * bs) % 4096 != 0) { print "swap file does not start on a page boundary"; exit 3 }
    printf "%.0f\n", first * bs / 4096
}
"#;

/// Exit status of an offset query whose layout cannot be resumed from
pub const UNSUPPORTED_LAYOUT_EXIT: i32 = 3;

/// Offset in pages printed by an offset query, on its last non-empty line
pub fn parse_resume_offset(content: &str) -> Result<u64> {
    let value = content
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| Error::Parse("the offset query printed nothing".to_string()))?;

    value
        .parse::<u64>()
        .map_err(|e| Error::Parse(format!("Failed to parse resume offset '{}': {}", value, e)))
}
