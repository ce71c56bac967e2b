use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sysinfo::{DiskKind, Disks};

lazy_static! {
    /// Virtual and container filesystems never worth offering as a root.
    static ref PSEUDO_FILESYSTEMS: Regex = Regex::new(
        r"^(?i)(proc|sysfs|devtmpfs|devpts|tmpfs|cgroup2?|overlay|squashfs|autofs|fuse\..*|efivarfs|securityfs|debugfs|tracefs|nsfs)$"
    )
    .expect("pseudo filesystem pattern compiles");
}

fn is_pseudo_filesystem(file_system: &str) -> bool {
    PSEUDO_FILESYSTEMS.is_match(file_system)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRoot {
    pub mount_point: PathBuf,
    pub name: String,
    pub file_system: String,
    pub kind: String,
    pub total_space: u64,
    pub available_space: u64,
    pub is_removable: bool,
}

/// Mounted volumes a caller can offer as scan roots, sorted by mount point.
/// Falls back to the filesystem root (or the home directory) when the
/// platform reports no disks.
pub fn available_roots() -> Vec<ScanRoot> {
    let disks = Disks::new_with_refreshed_list();
    let mut roots: Vec<ScanRoot> = disks
        .list()
        .iter()
        .filter(|disk| !is_pseudo_filesystem(&disk.file_system().to_string_lossy()))
        .map(|disk| ScanRoot {
            mount_point: disk.mount_point().to_path_buf(),
            name: disk.name().to_string_lossy().to_string(),
            file_system: disk.file_system().to_string_lossy().to_string(),
            kind: match disk.kind() {
                DiskKind::SSD => "ssd",
                DiskKind::HDD => "hdd",
                DiskKind::Unknown(_) => "unknown",
            }
            .to_string(),
            total_space: disk.total_space(),
            available_space: disk.available_space(),
            is_removable: disk.is_removable(),
        })
        .collect();

    roots.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
    roots.dedup_by(|a, b| a.mount_point == b.mount_point);

    if roots.is_empty() {
        log::debug!("No disks reported, falling back to the filesystem root");
        roots.push(fallback_root());
    }
    roots
}

fn fallback_root() -> ScanRoot {
    let root = Path::new("/");
    let mount_point = if root.is_dir() {
        root.to_path_buf()
    } else {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
    };
    ScanRoot {
        name: mount_point.to_string_lossy().to_string(),
        mount_point,
        file_system: String::new(),
        kind: "unknown".into(),
        total_space: 0,
        available_space: 0,
        is_removable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_filesystems_are_filtered() {
        assert!(is_pseudo_filesystem("proc"));
        assert!(is_pseudo_filesystem("tmpfs"));
        assert!(is_pseudo_filesystem("fuse.portal"));
        assert!(!is_pseudo_filesystem("ext4"));
        assert!(!is_pseudo_filesystem("NTFS"));
        assert!(!is_pseudo_filesystem("apfs"));
    }

    #[test]
    fn always_offers_at_least_one_root() {
        let roots = available_roots();
        assert!(!roots.is_empty());
        assert!(roots.iter().all(|r| r.mount_point.is_absolute() || r.mount_point == Path::new(".")));
    }
}
