//! End-to-end integration tests for Snaptar
//!
//! Runs full snapshots against generated trees and inspects the resulting
//! archives with the `tar` reader.

use ::snaptar::*;
use chrono::{DateTime, TimeZone, Utc};
use filetime::{set_file_mtime, FileTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test harness owning a source tree and a target directory
pub struct SnapshotHarness {
    pub source_dir: TempDir,
    pub target_dir: TempDir,
    pub file_generator: FileGenerator,
}

impl SnapshotHarness {
    /// Create a new test harness
    pub fn new() -> Self {
        Self {
            source_dir: TempDir::new().unwrap(),
            target_dir: TempDir::new().unwrap(),
            file_generator: FileGenerator::new(42),
        }
    }

    pub fn source(&self) -> &Path {
        self.source_dir.path()
    }

    pub fn target(&self) -> &Path {
        self.target_dir.path()
    }

    /// Write a file below the source root, creating parents
    pub fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.source().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Generate a nested project and return its files keyed by member name
    pub fn generate_project(&mut self, config: ProjectConfig) -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        let mut dirs = vec![String::new()];

        for depth in 0..config.max_depth {
            let mut next = Vec::new();
            for dir in &dirs {
                for d in 0..config.dirs_per_level {
                    let child = if dir.is_empty() {
                        format!("dir{}_{}", depth, d)
                    } else {
                        format!("{}/dir{}_{}", dir, depth, d)
                    };
                    next.push(child);
                }
            }
            dirs.extend(next);
        }

        for dir in &dirs {
            for f in 0..config.files_per_dir {
                let name = if dir.is_empty() {
                    format!("file{}.txt", f)
                } else {
                    format!("{}/file{}.txt", dir, f)
                };
                let content = self.file_generator.content(config.file_size_range.clone());
                self.write(&name, &content);
                files.insert(name, content);
            }
        }

        files
    }

    /// Snapshot builder pointed at the harness directories
    pub fn snapshot(&self, builder: SnapshotBuilder) -> Snapshot {
        builder.build(self.source(), self.target()).unwrap()
    }

    /// Names of the files currently in the target directory
    pub fn target_listing(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.target())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub struct ProjectConfig {
    pub max_depth: usize,
    pub dirs_per_level: usize,
    pub files_per_dir: usize,
    pub file_size_range: std::ops::Range<usize>,
}

/// Deterministic content generator
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn content(&mut self, size_range: std::ops::Range<usize>) -> Vec<u8> {
        let size = self.rng.random_range(size_range);
        let mut buf = vec![0u8; size];
        self.rng.fill(&mut buf[..]);
        buf
    }
}

/// Read every member of an archive into a name → content map
pub fn read_archive(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut archive = tar::Archive::new(fs::File::open(path).unwrap());
    let mut members = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        assert_eq!(entry.header().entry_type(), tar::EntryType::Regular);
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert!(members.insert(name, content).is_none(), "duplicate member");
    }
    members
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_generated_project_round_trips() {
        let mut harness = SnapshotHarness::new();
        let files = harness.generate_project(ProjectConfig {
            max_depth: 2,
            dirs_per_level: 3,
            files_per_dir: 4,
            file_size_range: 0..4_000,
        });

        let outcome = harness.snapshot(SnapshotBuilder::new()).run_at(&at(0)).unwrap();

        assert_eq!(outcome.archive.entries_written, files.len());
        let total: u64 = files.values().map(|c| c.len() as u64).sum();
        assert_eq!(outcome.archive.bytes_written, total);
        assert_eq!(read_archive(&outcome.archive.archive_path), files);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_archived_under_link_name() {
        use std::os::unix::fs::{symlink, PermissionsExt};

        let harness = SnapshotHarness::new();
        let one = harness.write("a/1.txt", b"X");
        harness.write("a/b/2.txt", b"Y");
        fs::set_permissions(&one, fs::Permissions::from_mode(0o640)).unwrap();
        set_file_mtime(&one, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
        symlink(&one, harness.source().join("a/link.txt")).unwrap();

        // Archive from a/ so member names are relative to it
        let archive_path = harness.target().join("a.tar");
        create_archive(&harness.source().join("a"), &archive_path).unwrap();

        let mut archive = tar::Archive::new(fs::File::open(&archive_path).unwrap());
        let mut seen = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();

            if name == "link.txt" || name == "1.txt" {
                assert_eq!(entry.header().entry_type(), tar::EntryType::Regular);
                assert_eq!(entry.header().size().unwrap(), 1);
                assert_eq!(entry.header().mode().unwrap(), 0o640);
                assert_eq!(entry.header().mtime().unwrap(), 1_600_000_000);
            }
            seen.push((name, content));
        }

        assert_eq!(
            seen,
            vec![
                ("1.txt".to_string(), "X".to_string()),
                ("b/2.txt".to_string(), "Y".to_string()),
                ("link.txt".to_string(), "X".to_string()),
            ]
        );
    }

    #[test]
    #[traced_test]
    fn test_old_and_new_archive_scenario() {
        let harness = SnapshotHarness::new();
        let old = harness.target().join("old.tar");
        let new = harness.target().join("new.tar");
        fs::write(&old, b"same bytes").unwrap();
        fs::write(&new, b"same bytes").unwrap();
        set_file_mtime(&old, FileTime::from_unix_time(1_000, 0)).unwrap();
        set_file_mtime(&new, FileTime::from_unix_time(2_000, 0)).unwrap();

        let deleted = deduplicate(harness.target()).unwrap();

        assert_eq!(deleted, 1);
        assert!(!old.exists());
        assert!(new.exists());
        assert!(logs_contain("Deleted duplicate"));
    }

    #[test]
    fn test_repeated_snapshots_keep_only_latest_identical_archive() {
        let harness = SnapshotHarness::new();
        harness.write("notes/today.md", b"unchanged");

        let snapshot = harness.snapshot(
            SnapshotBuilder::new()
                .name_format("snap-%s.tar")
                .delete_duplicates(true),
        );

        let mut last = None;
        for i in 0..3 {
            let outcome = snapshot.run_at(&at(i)).unwrap();
            last = Some(outcome.archive.archive_path);
        }

        let last = last.unwrap();
        assert_eq!(
            harness.target_listing(),
            vec![last.file_name().unwrap().to_string_lossy().into_owned()]
        );
    }

    #[test]
    fn test_changed_tree_keeps_both_archives() {
        let harness = SnapshotHarness::new();
        harness.write("a.txt", b"one");

        let snapshot = harness.snapshot(
            SnapshotBuilder::new()
                .name_format("snap-%s.tar")
                .delete_duplicates(true),
        );
        snapshot.run_at(&at(0)).unwrap();
        harness.write("a.txt", b"two");
        let outcome = snapshot.run_at(&at(1)).unwrap();

        assert_eq!(outcome.dedup.unwrap().deleted_count(), 0);
        assert_eq!(harness.target_listing().len(), 2);
    }

    #[test]
    fn test_match_archive_policy_prunes_identical_copies() {
        let harness = SnapshotHarness::new();
        harness.write("a.txt", b"content");

        // Seed the target with an identical earlier snapshot and an unrelated file
        let seed = harness
            .snapshot(SnapshotBuilder::new().name_format("seed.tar"))
            .run_at(&at(0))
            .unwrap();
        fs::write(harness.target().join("unrelated.bin"), b"other").unwrap();

        let outcome = harness
            .snapshot(
                SnapshotBuilder::new()
                    .name_format("fresh.tar")
                    .delete_duplicates(true)
                    .retention(RetentionPolicy::MatchArchive),
            )
            .run_at(&at(1))
            .unwrap();

        assert_eq!(outcome.dedup.unwrap().deleted, vec![seed.archive.archive_path]);
        assert_eq!(harness.target_listing(), vec!["fresh.tar", "unrelated.bin"]);
    }

    #[test]
    fn test_dry_run_reports_without_deleting() {
        let harness = SnapshotHarness::new();
        harness.write("a.txt", b"content");

        let snapshot = harness.snapshot(
            SnapshotBuilder::new()
                .name_format("snap-%s.tar")
                .delete_duplicates(true)
                .dry_run(true),
        );
        snapshot.run_at(&at(0)).unwrap();
        let outcome = snapshot.run_at(&at(1)).unwrap();

        let report = outcome.dedup.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.deleted_count(), 1);
        assert_eq!(harness.target_listing().len(), 2);
    }

    #[test]
    fn test_exclude_patterns_are_honored() {
        let harness = SnapshotHarness::new();
        harness.write("keep.rs", b"fn main() {}");
        harness.write("build/out.log", b"noise");
        harness.write("debug.log", b"noise");

        let outcome = harness
            .snapshot(SnapshotBuilder::new().exclude_patterns(vec!["*.log".to_string()]))
            .run_at(&at(0))
            .unwrap();

        let members: Vec<_> = read_archive(&outcome.archive.archive_path).into_keys().collect();
        assert_eq!(members, vec!["keep.rs"]);
    }

    #[test]
    fn test_target_inside_source_is_not_self_archived() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), b"a").unwrap();
        let target = source.path().join("backups");
        fs::create_dir(&target).unwrap();

        let snapshot = SnapshotBuilder::new()
            .name_format("snap-%s.tar")
            .build(source.path(), &target)
            .unwrap();
        let first = snapshot.run_at(&at(0)).unwrap();
        let second = snapshot.run_at(&at(1)).unwrap();

        assert_eq!(read_archive(&first.archive.archive_path).len(), 1);

        // The earlier archive is an ordinary file by now
        let members: Vec<_> = read_archive(&second.archive.archive_path).into_keys().collect();
        let first_name = format!(
            "backups/{}",
            first.archive.archive_path.file_name().unwrap().to_string_lossy()
        );
        assert_eq!(members, vec!["a.txt".to_string(), first_name]);
    }
}
