#[cfg(test)]
mod tests {
    use super::super::categories::{Candidate, CategoryMatcher};
    use super::super::rules::RuleBook;
    use super::super::safety::lexical_segments;
    use super::super::*;
    use crate::errors::ReclaimError;
    use chrono::{Duration as ChronoDuration, Utc};
    use proptest::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn classifier() -> SafetyClassifier {
        SafetyClassifier::with_defaults().unwrap()
    }

    fn classifier_from(json: &str) -> SafetyClassifier {
        let book = RuleBook::parse(json, "test rule book").unwrap();
        SafetyClassifier::new(ProtectionRuleSet::from_rules(&book.protection))
    }

    fn embedded_matcher() -> CategoryMatcher {
        let book = RuleBook::embedded().unwrap();
        CategoryMatcher::new(&book.categories).unwrap()
    }

    fn categorize_aged(matcher: &CategoryMatcher, path: &str, age_days: i64) -> Option<Category> {
        let now = Utc::now();
        let segments = lexical_segments(path);
        let candidate = Candidate::new(&segments, now - ChronoDuration::days(age_days))?;
        matcher.categorize(&candidate, now, ChronoDuration::days(90))
    }

    fn categorize(matcher: &CategoryMatcher, path: &str) -> Option<Category> {
        categorize_aged(matcher, path, 0)
    }

    // Classifier

    #[test]
    fn test_kernel_image_is_never_deletable() {
        let classifier = classifier();
        let verdict = classifier.classify(Path::new(r"C:\Windows\System32\ntoskrnl.exe"));
        assert!(matches!(
            verdict,
            Verdict::Denied(DenyReason::ProtectedDirectory { .. })
        ));
        assert!(!classifier.is_safe_to_delete(Path::new(r"C:\Windows\System32\ntoskrnl.exe")));
    }

    #[test]
    fn test_user_temp_file_is_safe() {
        let classifier = classifier();
        let path = Path::new(r"C:\Users\X\AppData\Local\Temp\foo.tmp");
        assert_eq!(classifier.classify(path), Verdict::Safe);
        assert!(classifier.is_safe_to_delete(path));
    }

    #[test]
    fn test_temp_exception_inside_protected_directory() {
        let classifier = classifier();
        let verdict = classifier.classify(Path::new(r"C:\Windows\Temp\setup.log"));
        assert_eq!(
            verdict,
            Verdict::TemporaryException {
                directory: PathBuf::from(r"C:\Windows")
            }
        );

        let prefetch = classifier.classify(Path::new(r"C:\Windows\Prefetch\APP.EXE-1A2B3C4D.pf"));
        assert!(prefetch.is_safe());
        let update = classifier.classify(Path::new(
            r"C:\Windows\SoftwareDistribution\Download\abc\payload.cab",
        ));
        assert!(update.is_safe());
    }

    #[test]
    fn test_protected_extension_overrides_temp_exception() {
        let classifier = classifier();
        assert_eq!(
            classifier.classify(Path::new(r"C:\Windows\Temp\dropper.dll")),
            Verdict::Denied(DenyReason::ProtectedExtension {
                extension: "dll".into()
            })
        );
        assert_eq!(
            classifier.classify(Path::new(r"C:\Users\X\AppData\Local\Temp\installer.EXE")),
            Verdict::Denied(DenyReason::ProtectedExtension {
                extension: "exe".into()
            })
        );
        assert!(!classifier.is_safe_to_delete(Path::new("/home/u/.cache/lib/libfoo.so")));
    }

    #[test]
    fn test_protected_name_overrides_temp_exception() {
        let classifier = classifier();
        assert_eq!(
            classifier.classify(Path::new("/home/u/tmp/vmlinuz")),
            Verdict::Denied(DenyReason::ProtectedName {
                name: "vmlinuz".into()
            })
        );
        assert!(!classifier.is_safe_to_delete(Path::new(r"D:\Temp\BOOTMGR")));
    }

    #[test]
    fn test_containment_uses_whole_components() {
        let classifier = classifier();
        assert!(classifier.is_safe_to_delete(Path::new(r"C:\Windows2\notes.txt")));
        assert!(classifier.is_safe_to_delete(Path::new("/usrdata/notes.txt")));
        assert!(!classifier.is_safe_to_delete(Path::new(r"c:\WINDOWS\system32\drivers\etc\hosts")));
        assert!(!classifier.is_safe_to_delete(Path::new(r"C:\Users\X\..\..\Windows\win.ini")));
    }

    #[test]
    fn test_namespace_prefixes_do_not_hide_protected_paths() {
        let classifier = classifier();
        for path in [
            r"\\?\C:\Windows\System32\config\SAM",
            r"\\?\c:\windows\system32\drivers\etc\hosts",
            r"\\.\C:\Windows\System32\config\SAM",
            "//?/C:/Windows/System32/config/SAM",
        ] {
            assert!(
                matches!(
                    classifier.classify(Path::new(path)),
                    Verdict::Denied(DenyReason::ProtectedDirectory { .. })
                ),
                "{path} should be denied"
            );
        }
        assert_eq!(
            lexical_segments(r"\\?\C:\Windows\Temp\x.tmp"),
            lexical_segments(r"C:\Windows\Temp\x.tmp")
        );
        assert_eq!(
            classifier.classify(Path::new(r"\\?\C:\Users\X\AppData\Local\Temp\foo.tmp")),
            Verdict::Safe
        );
    }

    #[test]
    fn test_verbatim_unc_paths_match_plain_unc_rules() {
        let classifier = classifier_from(
            r#"{
                "protection": {
                    "protected_directories": ["\\\\fileserver\\finance"],
                    "protected_extensions": [],
                    "protected_names": [],
                    "temporary_signals": {}
                },
                "categories": []
            }"#,
        );
        assert_eq!(
            lexical_segments(r"\\?\UNC\fileserver\finance\q3.xlsx"),
            vec!["fileserver", "finance", "q3.xlsx"]
        );
        assert!(!classifier.is_safe_to_delete(Path::new(r"\\?\UNC\FileServer\Finance\q3.xlsx")));
        assert!(!classifier.is_safe_to_delete(Path::new(r"\\fileserver\finance\q3.xlsx")));
        assert!(classifier.is_safe_to_delete(Path::new(r"\\?\UNC\fileserver\public\q3.xlsx")));
    }

    #[test]
    fn test_only_signals_below_the_protected_directory_count() {
        let classifier = classifier_from(
            r#"{
                "protection": {
                    "protected_directories": ["/srv/cache"],
                    "protected_extensions": [],
                    "protected_names": [],
                    "temporary_signals": { "directories": ["cache", "tmp"] }
                },
                "categories": []
            }"#,
        );
        assert!(!classifier.is_safe_to_delete(Path::new("/srv/cache/index.db")));
        assert_eq!(
            classifier.classify(Path::new("/srv/cache/tmp/index.db")),
            Verdict::TemporaryException {
                directory: PathBuf::from("/srv/cache")
            }
        );
    }

    #[test]
    fn test_walker_descent_rules() {
        let rules = classifier().snapshot();
        assert!(rules.may_descend(Path::new(r"C:\")));
        assert!(rules.may_descend(Path::new(r"C:\Users\X\AppData")));
        // Ancestors of known reclaim locations stay reachable.
        assert!(rules.may_descend(Path::new(r"C:\Windows")));
        assert!(rules.may_descend(Path::new(r"C:\Windows\Temp\nested")));
        assert!(rules.may_descend(Path::new(r"C:\Windows\SoftwareDistribution")));
        assert!(!rules.may_descend(Path::new(r"C:\Windows\System32")));
        assert!(!rules.may_descend(Path::new(r"C:\Program Files")));
        assert!(rules.may_descend(Path::new(r"C:\Program Files\Vendor\Cache")));
        assert!(rules.may_descend(Path::new("/Library")));
        assert!(rules.may_descend(Path::new("/Library/Caches/com.example")));
        assert!(!rules.may_descend(Path::new("/Library/Preferences")));
        assert!(!rules.may_descend(Path::new("/usr/share")));
        assert_eq!(
            rules.protecting_directory(Path::new("/usr/share")),
            Some(PathBuf::from("/usr"))
        );
    }

    #[test]
    fn test_hidden_file_protection_is_opt_in() {
        let classifier = classifier();
        let path = Path::new("/home/u/tmp/.session");
        assert!(classifier.is_safe_to_delete(path));

        classifier.set_protect_hidden_files(true);
        assert_eq!(
            classifier.classify(path),
            Verdict::Denied(DenyReason::HiddenFile)
        );
        classifier.set_protect_hidden_files(false);
        assert!(classifier.is_safe_to_delete(path));
    }

    #[test]
    fn test_add_custom_protected_directory_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let classifier = classifier();
        let before = classifier.snapshot();
        let file = temp_dir.path().join("keep.txt");

        assert!(classifier.add_custom_protected_directory(temp_dir.path()).unwrap());
        assert!(!classifier.add_custom_protected_directory(temp_dir.path()).unwrap());

        let listed = classifier
            .get_protected_directories()
            .into_iter()
            .filter(|dir| dir == temp_dir.path())
            .count();
        assert_eq!(listed, 1);

        assert!(!classifier.is_safe_to_delete(&file));
        // A snapshot taken earlier keeps the rules it started with.
        assert!(before.is_safe_to_delete(&file));
    }

    #[test]
    fn test_add_custom_protected_directory_rejects_bad_paths() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();
        let classifier = classifier();

        let relative = classifier.add_custom_protected_directory(Path::new("relative/dir"));
        assert!(matches!(relative, Err(ReclaimError::InvalidPath { .. })));

        let missing =
            classifier.add_custom_protected_directory(&temp_dir.path().join("does-not-exist"));
        assert_eq!(missing.unwrap_err().code(), "RCL-1002");

        let not_dir = classifier.add_custom_protected_directory(&file);
        assert!(matches!(not_dir, Err(ReclaimError::InvalidPath { .. })));
    }

    #[test]
    fn test_protected_directories_are_sorted_case_insensitively() {
        let dirs = classifier().get_protected_directories();
        let keys: Vec<String> = dirs
            .iter()
            .map(|d| d.to_string_lossy().to_lowercase())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(dirs.contains(&PathBuf::from(r"C:\Windows")));
        assert!(dirs.contains(&PathBuf::from("/usr")));
    }

    // Rule book and categories

    #[test]
    fn test_embedded_rule_book_covers_every_category() {
        let book = RuleBook::embedded().unwrap();
        let categories: Vec<Category> = book.categories.iter().map(|c| c.category).collect();
        assert_eq!(categories, Category::ALL.to_vec());
    }

    #[test]
    fn test_malformed_rule_book_is_rejected() {
        let err = RuleBook::parse("{ not json", "test").unwrap_err();
        assert_eq!(err.code(), "RCL-1101");

        let book = RuleBook::parse(
            r#"{
                "protection": {
                    "protected_directories": [],
                    "protected_extensions": [],
                    "protected_names": [],
                    "temporary_signals": {}
                },
                "categories": [{ "category": "logs", "name_patterns": ["(unclosed"] }]
            }"#,
            "test",
        )
        .unwrap();
        let err = CategoryMatcher::new(&book.categories).unwrap_err();
        assert!(matches!(err, ReclaimError::InvalidRules { .. }));
    }

    #[test]
    fn test_category_priority_order() {
        let matcher = embedded_matcher();
        assert_eq!(
            categorize(&matcher, "root/$Recycle.Bin/S-1-5-21/$R1.log"),
            Some(Category::RecycleBin)
        );
        assert_eq!(
            categorize(&matcher, "root/Windows/Prefetch/APP.EXE-0001.pf"),
            Some(Category::Prefetch)
        );
        assert_eq!(
            categorize(&matcher, "root/app/cache/debug.log"),
            Some(Category::Logs)
        );
        assert_eq!(
            categorize(&matcher, "root/Temp/cache/blob.bin"),
            Some(Category::Cache)
        );
        assert_eq!(
            categorize(&matcher, "root/Downloads/setup.tmp"),
            Some(Category::Temporary)
        );
    }

    #[test]
    fn test_category_name_patterns() {
        let matcher = embedded_matcher();
        assert_eq!(
            categorize(&matcher, "root/var/app/server.log.3"),
            Some(Category::Logs)
        );
        assert_eq!(
            categorize(&matcher, "root/explorer/thumbcache_256.db"),
            Some(Category::Cache)
        );
        assert_eq!(
            categorize(&matcher, "root/docs/~$report.docx"),
            Some(Category::Temporary)
        );
        assert_eq!(
            categorize(&matcher, "root/docs/.~lock.sheet.ods#"),
            Some(Category::Temporary)
        );
        assert_eq!(categorize(&matcher, "root/docs/report.docx"), None);
    }

    #[test]
    fn test_downloads_are_age_gated() {
        let matcher = embedded_matcher();
        assert_eq!(
            categorize_aged(&matcher, "root/Users/X/Downloads/report.pdf", 120),
            Some(Category::DownloadsOld)
        );
        assert_eq!(
            categorize_aged(&matcher, "root/Users/X/Downloads/report.pdf", 10),
            None
        );

        let now = Utc::now();
        let segments = lexical_segments("root/Users/X/Downloads/report.pdf");
        let candidate = Candidate::new(&segments, now - ChronoDuration::days(10)).unwrap();
        assert_eq!(
            matcher.categorize(&candidate, now, ChronoDuration::days(7)),
            Some(Category::DownloadsOld)
        );
    }

    // Report helpers

    fn record(path: &str, size: u64, category: Category) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            size_bytes: size,
            category,
            last_modified: Utc::now(),
            is_safe: true,
        }
    }

    #[test]
    fn test_apply_outcomes_drops_deleted_and_unsafe_records() {
        let records = vec![
            record("/r/temp/a.tmp", 10, Category::Temporary),
            record("/r/logs/b.log", 20, Category::Logs),
            record("/r/cache/c.bin", 30, Category::Cache),
        ];
        let mut report = ScanReport::build(
            PathBuf::from("/r"),
            records.clone(),
            3,
            Vec::new(),
            Utc::now(),
            1,
        );
        assert_eq!(report.total_bytes, 60);
        assert_eq!(report.categories.len(), 3);

        let outcomes = vec![
            DeletionOutcome::success(&records[0]),
            DeletionOutcome::failure(
                &records[1],
                FailureReason::NoLongerSafe {
                    reason: "inside protected directory /r/logs".into(),
                },
            ),
            DeletionOutcome::failure(&records[2], FailureReason::PermissionDenied),
        ];
        report.apply_outcomes(&outcomes);

        assert_eq!(report.total_files, 1);
        assert_eq!(report.total_bytes, 30);
        assert!(report.category_summary(Category::Temporary).is_none());
        assert_eq!(report.category_summary(Category::Cache).unwrap().count, 1);

        let summary = DeletionSummary::from_outcomes(&outcomes);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.freed_bytes, 10);
    }

    #[test]
    fn test_files_by_category_groups_in_priority_order() {
        let report = ScanReport::build(
            PathBuf::from("/r"),
            vec![
                record("/r/tmp/a.tmp", 1, Category::Temporary),
                record("/r/logs/b.log", 2, Category::Logs),
                record("/r/tmp/c.tmp", 3, Category::Temporary),
            ],
            3,
            Vec::new(),
            Utc::now(),
            0,
        );
        let grouped = report.files_by_category();
        let keys: Vec<Category> = grouped.keys().copied().collect();
        assert_eq!(keys, vec![Category::Logs, Category::Temporary]);
        assert_eq!(grouped[&Category::Temporary].len(), 2);
        assert_eq!(report.category_summary(Category::Temporary).unwrap().bytes, 4);
    }

    // Properties

    const SIGNAL_WORDS: &[&str] = &[
        "temp", "tmp", "cache", "caches", "logs", "log", "prefetch", "inetcache", "crashdumps",
    ];

    proptest! {
        #[test]
        fn prop_protected_tree_without_signal_is_denied(
            dirs in proptest::collection::vec("[a-z]{1,8}", 0..4),
            name in "[a-z]{1,8}",
            ext in "(txt|dat|ini|db)",
        ) {
            prop_assume!(dirs.iter().all(|d| !SIGNAL_WORDS.contains(&d.as_str())));
            let mut path = String::from(r"C:\Windows\System32");
            for dir in &dirs {
                path.push('\\');
                path.push_str(dir);
            }
            path.push_str(&format!("\\{}.{}", name, ext));
            prop_assert!(!classifier().is_safe_to_delete(Path::new(&path)));
        }

        #[test]
        fn prop_protected_extension_is_denied_everywhere(
            prefix in prop_oneof![
                Just(r"C:\Windows\Temp"),
                Just(r"C:\Users\X\AppData\Local\Temp"),
                Just("/home/u/.cache"),
                Just("/data/tmp"),
            ],
            dirs in proptest::collection::vec(
                prop_oneof![Just("temp".to_string()), Just("cache".to_string()), "[a-z]{1,8}"],
                0..3,
            ),
            name in "[a-z]{1,8}",
            ext in "(exe|dll|sys|so|dylib|msi|bat)",
        ) {
            let path = format!("{}/{}/{}.{}", prefix, dirs.join("/"), name, ext);
            prop_assert!(!classifier().is_safe_to_delete(Path::new(&path)));
        }

        #[test]
        fn prop_unprotected_ordinary_files_are_safe(
            dirs in proptest::collection::vec("[a-z]{1,8}", 0..4),
            name in "[a-z]{1,8}",
            ext in "(txt|pdf|png|log|tmp)",
        ) {
            let path = format!("/home/{}/{}.{}", dirs.join("/"), name, ext);
            prop_assert_eq!(classifier().classify(Path::new(&path)), Verdict::Safe);
        }
    }
}
