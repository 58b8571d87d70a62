//! On-disk layout for a drive root
//!
//! Every drive hosts `{root}/FastAccess/{key}` and `{root}/Archive/{key}`.
//! Writes stage into `{key}.tmp` beside the target so the final rename stays
//! on one filesystem.

use std::path::{Path, PathBuf};
use tierio_common::{StorageKey, Tier};

/// Suffix for staging files awaiting their atomic rename
pub const TEMP_SUFFIX: &str = ".tmp";

/// Directory for a tier under a drive root
#[must_use]
pub fn tier_dir(root: &Path, tier: Tier) -> PathBuf {
    root.join(tier.folder_name())
}

/// Final path of an item on one drive
#[must_use]
pub fn object_path(root: &Path, tier: Tier, key: &StorageKey) -> PathBuf {
    tier_dir(root, tier).join(key.as_str())
}

/// Staging path beside a final path
#[must_use]
pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_layout() {
        let key = StorageKey::new("k1").unwrap();
        let path = object_path(Path::new("/mnt/d1"), Tier::FastAccess, &key);
        assert_eq!(path, PathBuf::from("/mnt/d1/FastAccess/k1"));
        let path = object_path(Path::new("/mnt/d1"), Tier::Archive, &key);
        assert_eq!(path, PathBuf::from("/mnt/d1/Archive/k1"));
    }

    #[test]
    fn test_temp_path_beside_target() {
        let target = PathBuf::from("/mnt/d1/Archive/k1");
        let tmp = temp_path(&target);
        assert_eq!(tmp, PathBuf::from("/mnt/d1/Archive/k1.tmp"));
        assert_eq!(tmp.parent(), target.parent());
    }

    #[test]
    fn test_temp_path_for_dotted_key() {
        let target = PathBuf::from("/mnt/d1/FastAccess/report.2024.pdf");
        assert_eq!(
            temp_path(&target),
            PathBuf::from("/mnt/d1/FastAccess/report.2024.pdf.tmp")
        );
    }
}
