//! Run intake
//!
//! Picks uploaded run archives out of the staging store in chronological
//! order, extracts them into the unsorted store, and moves each processed
//! archive to the archive store. Archives are never deleted.
//!
//! Extraction streams each entry straight into the unsorted store and stamps
//! it with the entry's recorded capture time, so batching orders captures by
//! when the robot took them rather than by when they were unpacked.

use crate::error::SortResult;
use chrono::{Local, NaiveDate, TimeZone};
use shelfcam_common::naming::{run_name, RunKey};
use shelfcam_common::store::is_hidden;
use shelfcam_common::ContentStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// macOS resource-fork folder some uploads carry
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// One archive waiting in staging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRun {
    pub path: PathBuf,
    pub file_name: String,
    pub run_name: String,
    pub key: RunKey,
}

impl StagedRun {
    pub fn shelf_count(&self) -> u32 {
        self.key.shelves
    }
}

pub struct RunIntake {
    store: Arc<dyn ContentStore>,
    staging: PathBuf,
    archive: PathBuf,
    unsorted: PathBuf,
}

impl RunIntake {
    pub fn new(
        store: Arc<dyn ContentStore>,
        staging: PathBuf,
        archive: PathBuf,
        unsorted: PathBuf,
    ) -> Self {
        Self {
            store,
            staging,
            archive,
            unsorted,
        }
    }

    /// Staged archives, earliest collection first
    pub fn staged_runs(&self) -> SortResult<Vec<StagedRun>> {
        let mut runs = Vec::new();
        for entry in self.store.list_or_empty(&self.staging)? {
            if !entry.is_file() {
                continue;
            }
            match RunKey::parse(&entry.name) {
                Ok(key) => runs.push(StagedRun {
                    path: self.staging.join(&entry.name),
                    run_name: run_name(&entry.name).to_string(),
                    file_name: entry.name,
                    key,
                }),
                Err(e) => warn!(error = %e, "Ignoring staged file"),
            }
        }
        runs.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.file_name.cmp(&b.file_name)));
        Ok(runs)
    }

    /// Extract `run` into `unsorted/<run name>/`, returning the directory
    ///
    /// Nested archive paths are flattened to their file name. Directory
    /// entries, hidden files and macOS metadata are skipped.
    pub fn extract(&self, run: &StagedRun) -> SortResult<PathBuf> {
        let target = self.unsorted.join(&run.run_name);
        if self.store.exists(&target) {
            warn!(run = %run.run_name, "Unsorted run directory already exists, extracting into it");
        }
        self.store.create_dir_all(&target)?;

        let reader = self.store.open_read(&run.path)?;
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut extracted = 0usize;

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }

            let Some(name) = flattened_name(file.enclosed_name()) else {
                warn!(entry = %file.name(), "Skipping archive entry with unsafe path");
                continue;
            };
            if is_hidden(&name) || file.name().contains(MACOS_METADATA_DIR) {
                debug!(entry = %file.name(), "Skipping metadata entry");
                continue;
            }

            let captured = entry_time(file.last_modified());
            self.store
                .write_from(&target.join(&name), &mut file, captured)?;
            extracted += 1;
        }

        info!(run = %run.run_name, files = extracted, "Run extracted");
        Ok(target)
    }

    /// Move the processed archive out of staging
    pub fn archive(&self, run: &StagedRun) -> SortResult<PathBuf> {
        self.store.create_dir_all(&self.archive)?;

        let mut target = self.archive.join(&run.file_name);
        if self.store.exists(&target) {
            let unique = format!("{}_{}.zip", run.run_name, uuid::Uuid::new_v4().simple());
            warn!(
                run = %run.run_name,
                renamed = %unique,
                "Archive already holds this run, keeping both"
            );
            target = self.archive.join(unique);
        }

        self.store.rename(&run.path, &target)?;
        info!(run = %run.run_name, archive = %target.display(), "Run archived");
        Ok(target)
    }
}

/// Local capture time recorded in a zip entry
///
/// `None` for the DOS epoch placeholder written by archivers that record no
/// time, and for dates that do not exist in the local time zone.
fn entry_time(stamp: zip::DateTime) -> Option<SystemTime> {
    let placeholder = zip::DateTime::default();
    if stamp.datepart() == placeholder.datepart() && stamp.timepart() == placeholder.timepart() {
        return None;
    }
    let naive = NaiveDate::from_ymd_opt(
        i32::from(stamp.year()),
        u32::from(stamp.month()),
        u32::from(stamp.day()),
    )?
    .and_hms_opt(
        u32::from(stamp.hour()),
        u32::from(stamp.minute()),
        u32::from(stamp.second()),
    )?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(local.into())
}

fn flattened_name(path: Option<&Path>) -> Option<String> {
    let name = path?.file_name()?.to_string_lossy().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfcam_common::MemStore;
    use std::io::{Cursor, Write};
    use std::time::UNIX_EPOCH;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    fn intake(store: &Arc<MemStore>) -> RunIntake {
        RunIntake::new(
            store.clone(),
            PathBuf::from("/staging"),
            PathBuf::from("/archive"),
            PathBuf::from("/unsorted"),
        )
    }

    fn stage(store: &MemStore, name: &str, data: &[u8]) {
        store
            .insert_file(&Path::new("/staging").join(name), data, UNIX_EPOCH)
            .unwrap();
    }

    #[test]
    fn test_staged_runs_in_date_order() {
        let store = Arc::new(MemStore::new());
        for name in ["1_6_20_1_2.zip", "1_6_20_2.zip", "12_30_19_2.zip", "notes.txt"] {
            stage(&store, name, b"");
        }

        let runs = intake(&store).staged_runs().unwrap();
        let names: Vec<&str> = runs.iter().map(|r| r.file_name.as_str()).collect();

        assert_eq!(names, vec!["12_30_19_2.zip", "1_6_20_2.zip", "1_6_20_1_2.zip"]);
        assert_eq!(runs[0].run_name, "12_30_19_2");
        assert_eq!(runs[2].shelf_count(), 2);
    }

    #[test]
    fn test_extract_flattens_and_skips_metadata() {
        let store = Arc::new(MemStore::new());
        let archive = zip_bytes(&[
            ("run/", b""),
            ("run/shelf-0001.png", b"one"),
            ("run/shelf-0002.png", b"two"),
            ("__MACOSX/run/._shelf-0001.png", b"meta"),
            ("run/.DS_Store", b"ds"),
        ]);
        stage(&store, "1_6_20_2.zip", &archive);
        let intake = intake(&store);
        let run = intake.staged_runs().unwrap().remove(0);

        let dir = intake.extract(&run).unwrap();

        assert_eq!(dir, PathBuf::from("/unsorted/1_6_20_2"));
        let names: Vec<String> = store.list(&dir).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["shelf-0001.png", "shelf-0002.png"]);
        assert_eq!(store.read(&dir.join("shelf-0002.png")).unwrap(), b"two");
    }

    fn timed_zip(entries: &[(&str, u8)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, second) in entries {
            let stamp = zip::DateTime::from_date_and_time(2020, 1, 6, 10, 0, *second).unwrap();
            let options = zip::write::FileOptions::default().last_modified_time(stamp);
            writer.start_file(*name, options).unwrap();
            writer.write_all(b"frame").unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_keeps_capture_times() {
        // Archive order disagrees with capture order
        let store = Arc::new(MemStore::new());
        stage(
            &store,
            "1_6_20_2.zip",
            &timed_zip(&[("shelf-0001.png", 40), ("shelf-0002.png", 20)]),
        );
        let intake = intake(&store);
        let run = intake.staged_runs().unwrap().remove(0);

        let dir = intake.extract(&run).unwrap();

        let entries = store.list(&dir).unwrap();
        assert_eq!(entries[0].name, "shelf-0001.png");
        let gap = entries[0]
            .modified
            .duration_since(entries[1].modified)
            .unwrap();
        assert_eq!(gap.as_secs(), 20);
    }

    #[test]
    fn test_entry_time_placeholder_is_ignored() {
        assert_eq!(entry_time(zip::DateTime::default()), None);
        let stamp = zip::DateTime::from_date_and_time(2020, 1, 6, 10, 0, 0).unwrap();
        assert!(entry_time(stamp).is_some());
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let store = Arc::new(MemStore::new());
        stage(&store, "1_6_20_2.zip", b"not a zip");
        let intake = intake(&store);
        let run = intake.staged_runs().unwrap().remove(0);

        assert!(intake.extract(&run).is_err());
    }

    #[test]
    fn test_archive_moves_zip() {
        let store = Arc::new(MemStore::new());
        stage(&store, "1_6_20_2.zip", b"zip");
        let intake = intake(&store);
        let run = intake.staged_runs().unwrap().remove(0);

        let target = intake.archive(&run).unwrap();

        assert_eq!(target, PathBuf::from("/archive/1_6_20_2.zip"));
        assert!(!store.exists(&run.path));
        assert!(intake.staged_runs().unwrap().is_empty());
    }

    #[test]
    fn test_archive_keeps_existing_copy() {
        let store = Arc::new(MemStore::new());
        store
            .insert_file(Path::new("/archive/1_6_20_2.zip"), b"old", UNIX_EPOCH)
            .unwrap();
        stage(&store, "1_6_20_2.zip", b"new");
        let intake = intake(&store);
        let run = intake.staged_runs().unwrap().remove(0);

        let target = intake.archive(&run).unwrap();

        assert_ne!(target, PathBuf::from("/archive/1_6_20_2.zip"));
        assert_eq!(store.read(Path::new("/archive/1_6_20_2.zip")).unwrap(), b"old");
        assert_eq!(store.read(&target).unwrap(), b"new");
    }
}
