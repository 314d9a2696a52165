//! Detecting a root filesystem that lives in memory.

use std::path::Path;

/// Environment flag telling the engine not to `pivot_root`.
pub const DOCKER_RAMDISK: &str = "DOCKER_RAMDISK";

const RAMDISK_FS_TYPES: [&str; 2] = ["rootfs", "ramfs"];

/// Whether `mount_point` is mounted from an in-memory filesystem according
/// to `mountinfo` (`/proc/self/mountinfo` format).
#[must_use]
pub fn is_ramdisk(mountinfo: &str, mount_point: &Path) -> bool {
    let needle = format!(" / {} ", mount_point.display());
    mountinfo.lines().any(|line| {
        if !line.contains(&needle) {
            return false;
        }
        line.split_once(" - ")
            .and_then(|(_, tail)| tail.split_whitespace().next())
            .is_some_and(|fs_type| RAMDISK_FS_TYPES.contains(&fs_type))
    })
}

/// Read the mount table and check whether the persistent storage root is
/// a ramdisk.
///
/// An unreadable mount table counts as "not a ramdisk".
#[must_use]
pub fn storage_is_ramdisk(storage_root: &Path) -> bool {
    match std::fs::read_to_string("/proc/self/mountinfo") {
        Ok(mountinfo) => is_ramdisk(&mountinfo, storage_root),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot read mount table");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOTFS: &str = "\
1 1 0:2 / / rw - rootfs rootfs rw
17 1 0:16 / /sys rw,nosuid,nodev,noexec,relatime shared:7 - sysfs sysfs rw
";

    const EXT4: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
23 22 0:20 / /run rw,nosuid shared:5 - tmpfs tmpfs rw
";

    #[test]
    fn rootfs_root_is_ramdisk() {
        assert!(is_ramdisk(ROOTFS, Path::new("/")));
    }

    #[test]
    fn disk_root_is_not() {
        assert!(!is_ramdisk(EXT4, Path::new("/")));
    }

    #[test]
    fn storage_root_on_rootfs_is_ramdisk() {
        let mountinfo = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
31 22 0:2 / /var/lib/bockos rw shared:9 - rootfs rootfs rw
";
        assert!(is_ramdisk(mountinfo, Path::new("/var/lib/bockos")));
        assert!(!is_ramdisk(mountinfo, Path::new("/")));
        assert!(!is_ramdisk(EXT4, Path::new("/var/lib/bockos")));
    }

    #[test]
    fn other_mount_points_are_checked_separately() {
        assert!(!is_ramdisk(ROOTFS, Path::new("/sys")));
    }
}
