//! Mount table and fstab parsing.

use std::path::{Path, PathBuf};

/// One line of `/proc/mounts` or `/etc/fstab`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: PathBuf,
    pub target: PathBuf,
    pub fs_type: String,
}

/// Parse a mount table in fstab format, skipping comments and blank lines.
#[must_use]
pub fn parse_mount_table(text: &str) -> Vec<MountEntry> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let fs_type = fields.next().unwrap_or("auto");
            Some(MountEntry {
                source: PathBuf::from(unescape(source)),
                target: PathBuf::from(unescape(target)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// The entry currently mounted at `target`, if any. Later entries shadow
/// earlier ones, matching kernel stacking order.
#[must_use]
pub fn mounted_at<'a>(entries: &'a [MountEntry], target: &Path) -> Option<&'a MountEntry> {
    entries.iter().rev().find(|e| e.target == target)
}

/// Whether any entry targets `target`.
#[must_use]
pub fn has_entry_for(entries: &[MountEntry], target: &Path) -> bool {
    entries.iter().any(|e| e.target == target)
}

/// fstab line for the storage mount. `nofail` keeps boot going if the
/// device is unplugged.
#[must_use]
pub fn fstab_line(device: &Path, mount_point: &Path, fs_type: &str) -> String {
    format!(
        "{} {} {fs_type} defaults,nofail 0 2",
        escape(&device.to_string_lossy()),
        escape(&mount_point.to_string_lossy())
    )
}

/// Decode `\040`-style octal escapes used for whitespace in mount paths.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value =
                (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

fn escape(field: &str) -> String {
    field
        .replace('\\', "\\134")
        .replace(' ', "\\040")
        .replace('\t', "\\011")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_MOUNTS: &str = "\
/dev/mmcblk0p2 / ext4 rw,noatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/mmcblk0p1 /boot/firmware vfat rw,relatime 0 0
/dev/sda1 /mnt/ssd ext4 rw,relatime 0 0
";

    #[test]
    fn test_parse_proc_mounts() {
        let entries = parse_mount_table(PROC_MOUNTS);
        assert_eq!(entries.len(), 4);

        let ssd = mounted_at(&entries, Path::new("/mnt/ssd")).unwrap();
        assert_eq!(ssd.source, PathBuf::from("/dev/sda1"));
        assert_eq!(ssd.fs_type, "ext4");
        assert!(mounted_at(&entries, Path::new("/mnt/other")).is_none());
    }

    #[test]
    fn test_fstab_comments_skipped() {
        let fstab = "# static file system information\n\nproc /proc proc defaults 0 0\n";
        let entries = parse_mount_table(fstab);
        assert_eq!(entries.len(), 1);
        assert!(has_entry_for(&entries, Path::new("/proc")));
    }

    #[test]
    fn test_later_mount_shadows_earlier() {
        let table = "/dev/sdb1 /mnt/ssd ext4 rw 0 0\n/dev/sda1 /mnt/ssd ext4 rw 0 0\n";
        let entries = parse_mount_table(table);
        let top = mounted_at(&entries, Path::new("/mnt/ssd")).unwrap();
        assert_eq!(top.source, PathBuf::from("/dev/sda1"));
    }

    #[test]
    fn test_escaped_whitespace_round_trips() {
        let line = fstab_line(Path::new("/dev/sda1"), Path::new("/mnt/my disk"), "ext4");
        assert_eq!(line, "/dev/sda1 /mnt/my\\040disk ext4 defaults,nofail 0 2");

        let entries = parse_mount_table(&line);
        assert_eq!(entries[0].target, PathBuf::from("/mnt/my disk"));
    }
}
