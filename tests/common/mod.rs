use std::fs;
use std::path::{Path, PathBuf};

use disk_reclaimer::SafetyClassifier;
use tempfile::TempDir;

/// Directory names that would categorise or protect every fixture below them.
const SIGNAL_COMPONENTS: &[&str] = &[
    "temp",
    "tmp",
    "cache",
    "caches",
    ".cache",
    "inetcache",
    "logs",
    "log",
    "prefetch",
    "downloads",
    "$recycle.bin",
    ".trash",
    "scratch",
];

fn is_clean_base(base: &Path, rules: &SafetyClassifier) -> bool {
    let signalled = base.components().any(|c| {
        let name = c.as_os_str().to_string_lossy().to_lowercase();
        SIGNAL_COMPONENTS.contains(&name.as_str())
    });
    !signalled
        && rules.snapshot().may_descend(base)
        && rules.is_safe_to_delete(&base.join("notes.txt"))
}

/// A fresh, canonical fixture directory whose ancestors carry no category
/// or protection signal.
pub fn fixture_dir() -> TempDir {
    let rules = SafetyClassifier::with_defaults().expect("default rules");
    let candidates = [
        Path::new(env!("CARGO_MANIFEST_DIR")).join("target").join("reclaimer-fixtures"),
        std::env::temp_dir().join("reclaimer-fixtures"),
    ];
    let mut fallback: Option<PathBuf> = None;
    for candidate in candidates {
        if fs::create_dir_all(&candidate).is_err() {
            continue;
        }
        let Ok(base) = fs::canonicalize(&candidate) else {
            continue;
        };
        if is_clean_base(&base, &rules) {
            return tempfile::Builder::new()
                .prefix("case")
                .tempdir_in(&base)
                .expect("fixture dir");
        }
        fallback.get_or_insert(base);
    }
    let base = fallback.expect("no writable fixture base");
    tempfile::Builder::new()
        .prefix("case")
        .tempdir_in(base)
        .expect("fixture dir")
}
