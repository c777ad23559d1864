//! Main test module for Snaptar
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end snapshot scenarios
//! - Property-based tests for archive and deduplication invariants
//! - Edge cases below

pub mod integration;

#[cfg(test)]
mod edge_cases {
    use ::snaptar::*;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_empty_source_directory() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let archive_path = target.path().join("empty.tar");

        let summary = create_archive(source.path(), &archive_path).unwrap();
        assert_eq!(summary.entries_written, 0);

        let mut archive = tar::Archive::new(fs::File::open(&archive_path).unwrap());
        assert_eq!(archive.entries().unwrap().count(), 0);
    }

    #[test]
    fn test_empty_directories_are_not_members() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("a/b/c")).unwrap();
        fs::write(source.path().join("a/file.txt"), "x").unwrap();

        let archive_path = target.path().join("dirs.tar");
        create_archive(source.path(), &archive_path).unwrap();

        let mut archive = tar::Archive::new(fs::File::open(&archive_path).unwrap());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a/file.txt"]);
    }

    #[test]
    fn test_special_filenames() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file_with_underscores.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file(with)parens.txt",
            "file[with]brackets.txt",
            "ünïcödé.txt",
        ];

        let mut written = Vec::new();
        for name in &special_names {
            // Skip if OS doesn't support this filename
            if fs::write(source.path().join(name), format!("Content of {}", name)).is_ok() {
                written.push(name.to_string());
            }
        }

        let archive_path = target.path().join("special.tar");
        create_archive(source.path(), &archive_path).unwrap();

        let mut archive = tar::Archive::new(fs::File::open(&archive_path).unwrap());
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            assert_eq!(content, format!("Content of {}", name));
            written.retain(|w| w != &name);
        }
        assert!(written.is_empty(), "missing members: {:?}", written);
    }

    #[test]
    fn test_long_member_names() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();

        let deep = (0..12).map(|i| format!("directory_level_{:02}", i)).collect::<Vec<_>>().join("/");
        fs::create_dir_all(source.path().join(&deep)).unwrap();
        let name = format!("{}/{}.txt", deep, "n".repeat(80));
        fs::write(source.path().join(&name), "deep").unwrap();

        let archive_path = target.path().join("long.tar");
        create_archive(source.path(), &archive_path).unwrap();

        let mut archive = tar::Archive::new(fs::File::open(&archive_path).unwrap());
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_string_lossy(), name);
    }

    #[test]
    fn test_large_file_content() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let content: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(source.path().join("big.bin"), &content).unwrap();

        let archive_path = target.path().join("big.tar");
        let summary = create_archive(source.path(), &archive_path).unwrap();
        assert_eq!(summary.bytes_written, content.len() as u64);

        let mut archive = tar::Archive::new(fs::File::open(&archive_path).unwrap());
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut read_back = Vec::new();
        entry.read_to_end(&mut read_back).unwrap();
        assert_eq!(read_back, content);
    }

    #[test]
    fn test_dedup_ignores_empty_target() {
        let target = TempDir::new().unwrap();
        assert_eq!(deduplicate(target.path()).unwrap(), 0);
    }

    #[test]
    fn test_dedup_missing_target_fails() {
        let target = TempDir::new().unwrap();
        let result = deduplicate(&target.path().join("gone"));
        assert!(matches!(result, Err(SnaptarError::PathResolution { .. })));
    }

    #[test]
    fn test_dedup_keeps_distinct_empty_and_nonempty_files() {
        let target = TempDir::new().unwrap();
        fs::write(target.path().join("empty1"), "").unwrap();
        fs::write(target.path().join("empty2"), "").unwrap();
        fs::write(target.path().join("full"), "data").unwrap();

        // Two empty files share a checksum
        assert_eq!(deduplicate(target.path()).unwrap(), 1);
        assert!(target.path().join("full").exists());
    }

    #[test]
    fn test_archive_into_missing_directory_fails_early() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let result = create_archive(source.path(), &target.path().join("nope/out.tar"));

        let err = result.unwrap_err();
        assert!(err.is_before_io());
        assert!(!err.is_partial_archive());
    }
}
