//! Command lines for the external tools that change system state.
//! All of them run through the privileged boundary.

use crate::batch::RESUME_OFFSET;
use crate::host::PrivilegedRequest;
use crate::types::{ResumeParameter, MIB};
use std::path::Path;

/// fstab line activating a swap file at boot
pub fn fstab_line(path: &Path) -> String {
    format!("{} none swap defaults 0 0", path.display())
}

/// Whether fstab already has an entry for `path` (commented lines ignored)
pub fn fstab_has_entry(content: &str, path: &Path) -> bool {
    let path = path.to_string_lossy();
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .any(|l| l.split_whitespace().next() == Some(path.as_ref()))
}

pub fn fstab_append(fstab: &Path, swap_file: &Path) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "add the swap file to fstab",
        [
            "sh".to_string(),
            "-c".to_string(),
            "printf '%s\\n' \"$1\" >> \"$2\"".to_string(),
            "sh".to_string(),
            fstab_line(swap_file),
            fstab.display().to_string(),
        ],
    )
}

/// Delete fstab lines whose first field is `swap_file`.
/// The path is validated by config to contain no `|` or whitespace.
pub fn fstab_remove(fstab: &Path, swap_file: &Path) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "remove the swap file from fstab",
        [
            "sed".to_string(),
            "-i".to_string(),
            format!("\\|^{}[[:space:]]|d", swap_file.display()),
            fstab.display().to_string(),
        ],
    )
}

pub fn swapon(path: &Path) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "activate the swap file",
        ["swapon".to_string(), path.display().to_string()],
    )
}

pub fn swapoff(path: &Path) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "deactivate the swap file",
        ["swapoff".to_string(), path.display().to_string()],
    )
}

pub fn remove_file(path: &Path) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "delete the swap file",
        ["rm".to_string(), "-f".to_string(), path.display().to_string()],
    )
}

/// Fully allocated file of `size_bytes`, rounded up to MiB
pub fn allocate_file(path: &Path, size_bytes: u64) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "create the swap file",
        [
            "dd".to_string(),
            "if=/dev/zero".to_string(),
            format!("of={}", path.display()),
            "bs=1M".to_string(),
            format!("count={}", size_bytes.div_ceil(MIB)),
            "status=none".to_string(),
        ],
    )
}

/// btrfs creates a NOCOW file, sets its mode and writes the swap signature
pub fn btrfs_mkswapfile(path: &Path, size_bytes: u64) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "create the swap file",
        [
            "btrfs".to_string(),
            "filesystem".to_string(),
            "mkswapfile".to_string(),
            "--size".to_string(),
            format!("{}m", size_bytes.div_ceil(MIB)),
            path.display().to_string(),
        ],
    )
}

pub fn restrict_permissions(path: &Path) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "restrict swap file permissions",
        ["chmod".to_string(), "600".to_string(), path.display().to_string()],
    )
}

pub fn mkswap(path: &Path) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "format the swap area",
        ["mkswap".to_string(), path.display().to_string()],
    )
}

pub fn filefrag(path: &Path) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "query the swap file's physical extents",
        ["filefrag".to_string(), "-v".to_string(), path.display().to_string()],
    )
}

pub fn btrfs_map_swapfile(path: &Path) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "query the swap file's resume offset",
        [
            "btrfs".to_string(),
            "inspect-internal".to_string(),
            "map-swapfile".to_string(),
            "-r".to_string(),
            path.display().to_string(),
        ],
    )
}

/// Drop `resume` and `resume_offset` from every kernel entry
pub fn clear_resume_args(tool: &str) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "remove resume kernel arguments",
        [
            tool.to_string(),
            "--update-kernel=ALL".to_string(),
            "--remove-args=resume resume_offset".to_string(),
        ],
    )
}

pub fn set_resume_args(tool: &str, resume: &ResumeParameter) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "set resume kernel arguments",
        [
            tool.to_string(),
            "--update-kernel=ALL".to_string(),
            format!("--args={}", resume.to_args()),
        ],
    )
}

/// Resume arguments for a swap file whose offset is queried earlier in the same batch
pub fn set_resume_args_from_query(tool: &str, device: &str) -> PrivilegedRequest {
    PrivilegedRequest::new(
        "set resume kernel arguments",
        [
            tool.to_string(),
            "--update-kernel=ALL".to_string(),
            format!("--args=resume={} resume_offset={}", device, RESUME_OFFSET),
        ],
    )
}

pub fn regenerate_bootloader(argv: &[String]) -> PrivilegedRequest {
    PrivilegedRequest::new("regenerate the bootloader configuration", argv.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fstab_has_entry() {
        let content = "UUID=abc / ext4 defaults 1 1\n\
                       # /swapfile none swap defaults 0 0\n";
        assert!(!fstab_has_entry(content, Path::new("/swapfile")));

        let content = "UUID=abc / ext4 defaults 1 1\n/swapfile none swap defaults 0 0\n";
        assert!(fstab_has_entry(content, Path::new("/swapfile")));
        assert!(!fstab_has_entry(content, Path::new("/swap")));
    }

    #[test]
    fn test_fstab_append_passes_values_as_arguments() {
        let request = fstab_append(Path::new("/etc/fstab"), Path::new("/swapfile"));
        assert_eq!(request.program(), "sh");
        assert_eq!(request.argv[4], "/swapfile none swap defaults 0 0");
        assert_eq!(request.argv[5], "/etc/fstab");
    }

    #[test]
    fn test_fstab_remove_address() {
        let request = fstab_remove(Path::new("/etc/fstab"), Path::new("/swapfile"));
        assert_eq!(request.argv, vec!["sed", "-i", "\\|^/swapfile[[:space:]]|d", "/etc/fstab"]);
    }

    #[test]
    fn test_allocate_rounds_to_mib() {
        let request = allocate_file(Path::new("/swapfile"), 8 * 1024 * MIB + 1);
        assert!(request.argv.contains(&"count=8193".to_string()));
        assert!(request.argv.contains(&"of=/swapfile".to_string()));
    }

    #[test]
    fn test_resume_args() {
        let resume = ResumeParameter {
            device: "UUID=1b2c".to_string(),
            offset: Some(34816),
        };
        let request = set_resume_args("grubby", &resume);
        assert_eq!(
            request.argv,
            vec![
                "grubby",
                "--update-kernel=ALL",
                "--args=resume=UUID=1b2c resume_offset=34816"
            ]
        );

        let request = set_resume_args_from_query("grubby", "UUID=1b2c");
        assert_eq!(
            request.argv[2],
            "--args=resume=UUID=1b2c resume_offset={resume_offset}"
        );

        let request = clear_resume_args("grubby");
        assert_eq!(request.argv[2], "--remove-args=resume resume_offset");
    }
}
