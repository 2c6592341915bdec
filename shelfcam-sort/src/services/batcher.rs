//! Batcher
//!
//! Partitions an extracted run into equal-size box batches.
//!
//! The robot photographs every box on a shelf in a fixed order, one pass per
//! shelf, so consecutive captures ordered by modification time belong to the
//! same physical sweep. Each batch holds `boxes_per_shelf × shelves` images
//! and lands in a numbered subdirectory, with every image renamed to
//! `<position in batch>_<modification timestamp>.<ext>`.

use crate::error::{SortError, SortResult};
use shelfcam_common::naming::{extension_of, format_timestamp, parse_capture_sequence, ImageName};
use shelfcam_common::ContentStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Batches produced from one run directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Batch directories in creation order
    pub batches: Vec<PathBuf>,
    pub batch_size: usize,
    /// Trailing images that did not fill a batch (left in the run directory)
    pub remainder: Vec<PathBuf>,
    /// Files without a capture sequence number (left in the run directory)
    pub skipped: Vec<PathBuf>,
}

struct Capture {
    path: PathBuf,
    name: String,
    sequence: u64,
    modified: SystemTime,
}

/// Modification-order batcher
pub struct Batcher {
    store: Arc<dyn ContentStore>,
    boxes_per_shelf: u32,
}

impl Batcher {
    pub fn new(store: Arc<dyn ContentStore>, boxes_per_shelf: u32) -> Self {
        Self {
            store,
            boxes_per_shelf,
        }
    }

    /// Move the images of `run_dir` into numbered batch directories under `output_dir`
    ///
    /// Numbering continues after any numeric directories already present in
    /// `output_dir`, so an interrupted run can be batched again.
    pub fn batch(
        &self,
        run_dir: &Path,
        output_dir: &Path,
        shelf_count: u32,
    ) -> SortResult<BatchOutcome> {
        if self.boxes_per_shelf == 0 || shelf_count == 0 {
            return Err(SortError::InvalidParameter(format!(
                "batch size needs positive boxes_per_shelf and shelf count (got {} × {})",
                self.boxes_per_shelf, shelf_count
            )));
        }
        let batch_size = self.boxes_per_shelf as usize * shelf_count as usize;

        let (mut captures, skipped) = self.scan(run_dir)?;
        captures.sort_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then(a.sequence.cmp(&b.sequence))
        });

        let full_batches = captures.len() / batch_size;
        let batched = full_batches * batch_size;

        let mut outcome = BatchOutcome {
            batch_size,
            skipped,
            remainder: captures[batched..].iter().map(|c| c.path.clone()).collect(),
            ..Default::default()
        };

        if full_batches == 0 {
            info!(
                run = %run_dir.display(),
                images = captures.len(),
                batch_size,
                "Not enough images for a single batch"
            );
            return Ok(outcome);
        }

        self.store.create_dir_all(output_dir)?;
        let first_index = self.next_batch_index(output_dir)?;

        for (offset, chunk) in captures[..batched].chunks(batch_size).enumerate() {
            let batch_dir = output_dir.join((first_index + offset).to_string());
            self.store.create_dir_all(&batch_dir)?;

            for (position, capture) in chunk.iter().enumerate() {
                let target = ImageName::new(
                    position as u64 + 1,
                    format_timestamp(capture.modified),
                    extension_of(&capture.name),
                );
                self.store
                    .rename(&capture.path, &batch_dir.join(target.file_name()))?;
            }

            debug!(batch = %batch_dir.display(), images = chunk.len(), "Batch created");
            outcome.batches.push(batch_dir);
        }

        info!(
            run = %run_dir.display(),
            batches = outcome.batches.len(),
            batch_size,
            remainder = outcome.remainder.len(),
            "Run batched"
        );

        Ok(outcome)
    }

    /// Every numbered batch directory under `output_dir`, in numeric order
    ///
    /// Includes batches left by an interrupted attempt as well as new ones.
    pub fn pending_batches(&self, output_dir: &Path) -> SortResult<Vec<PathBuf>> {
        let mut numbered: Vec<(usize, PathBuf)> = self
            .store
            .list_or_empty(output_dir)?
            .into_iter()
            .filter(|e| e.is_dir())
            .filter_map(|e| {
                let index = e.name.parse::<usize>().ok()?;
                Some((index, output_dir.join(&e.name)))
            })
            .collect();
        numbered.sort_by_key(|(index, _)| *index);
        Ok(numbered.into_iter().map(|(_, path)| path).collect())
    }

    fn scan(&self, run_dir: &Path) -> SortResult<(Vec<Capture>, Vec<PathBuf>)> {
        let mut captures = Vec::new();
        let mut skipped = Vec::new();

        for entry in self.store.list(run_dir)? {
            if !entry.is_file() {
                continue;
            }
            let path = run_dir.join(&entry.name);
            match parse_capture_sequence(&entry.name) {
                Some(sequence) => captures.push(Capture {
                    path,
                    name: entry.name,
                    sequence,
                    modified: entry.modified,
                }),
                None => {
                    warn!(file = %path.display(), "No capture sequence in file name, skipping");
                    skipped.push(path);
                }
            }
        }

        Ok((captures, skipped))
    }

    fn next_batch_index(&self, output_dir: &Path) -> SortResult<usize> {
        let highest = self
            .store
            .list(output_dir)?
            .iter()
            .filter(|e| e.is_dir())
            .filter_map(|e| e.name.parse::<usize>().ok())
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfcam_common::MemStore;
    use std::time::{Duration, UNIX_EPOCH};

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn run_with(store: &MemStore, count: u64) -> PathBuf {
        let run = PathBuf::from("/unsorted/1_6_20_2");
        for i in 0..count {
            store
                .insert_file(&run.join(format!("shelf-{:04}.png", i)), b"img", at(100 + i))
                .unwrap();
        }
        run
    }

    fn names(store: &MemStore, dir: &Path) -> Vec<String> {
        store.list(dir).unwrap().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_twelve_images_two_shelves() {
        let store = Arc::new(MemStore::new());
        let run = run_with(&store, 12);
        let batcher = Batcher::new(store.clone(), 1);

        let outcome = batcher.batch(&run, Path::new("/sorted/1_6_20_2"), 2).unwrap();

        assert_eq!(outcome.batches.len(), 6);
        assert_eq!(outcome.batch_size, 2);
        assert!(outcome.remainder.is_empty());
        assert_eq!(
            names(&store, Path::new("/sorted/1_6_20_2/1")),
            vec!["00000001_100.000000.png", "00000002_101.000000.png"]
        );
        assert_eq!(
            names(&store, Path::new("/sorted/1_6_20_2/6")),
            vec!["00000001_110.000000.png", "00000002_111.000000.png"]
        );
        assert!(store.list(&run).unwrap().is_empty());
    }

    #[test]
    fn test_remainder_left_in_place() {
        let store = Arc::new(MemStore::new());
        let run = run_with(&store, 7);
        let batcher = Batcher::new(store.clone(), 3);

        let outcome = batcher.batch(&run, Path::new("/sorted/r"), 1).unwrap();

        assert_eq!(outcome.batches.len(), 2);
        assert_eq!(outcome.remainder, vec![run.join("shelf-0006.png")]);
        assert!(outcome.batches.len() * outcome.batch_size <= 7);
        assert_eq!(names(&store, &run), vec!["shelf-0006.png"]);
    }

    #[test]
    fn test_too_few_images() {
        let store = Arc::new(MemStore::new());
        let run = run_with(&store, 1);
        let outcome = Batcher::new(store.clone(), 1)
            .batch(&run, Path::new("/sorted/r"), 2)
            .unwrap();
        assert!(outcome.batches.is_empty());
        assert_eq!(outcome.remainder.len(), 1);
        assert!(!store.exists(Path::new("/sorted/r")));
    }

    #[test]
    fn test_empty_run() {
        let store = Arc::new(MemStore::new());
        store.create_dir_all(Path::new("/unsorted/r")).unwrap();
        let outcome = Batcher::new(store, 1)
            .batch(Path::new("/unsorted/r"), Path::new("/sorted/r"), 2)
            .unwrap();
        assert!(outcome.batches.is_empty());
        assert!(outcome.remainder.is_empty());
    }

    #[test]
    fn test_zero_shelves_rejected() {
        let store = Arc::new(MemStore::new());
        let run = run_with(&store, 4);
        let result = Batcher::new(store.clone(), 1).batch(&run, Path::new("/sorted/r"), 0);
        assert!(matches!(result, Err(SortError::InvalidParameter(_))));
        let result = Batcher::new(store, 0).batch(&run, Path::new("/sorted/r"), 2);
        assert!(matches!(result, Err(SortError::InvalidParameter(_))));
    }

    #[test]
    fn test_ties_broken_by_sequence() {
        let store = Arc::new(MemStore::new());
        let run = PathBuf::from("/unsorted/r");
        store.insert_file(&run.join("cam-10.jpg"), b"b", at(5)).unwrap();
        store.insert_file(&run.join("cam-9.jpg"), b"a", at(5)).unwrap();
        store.insert_file(&run.join("cam-1.jpg"), b"c", at(9)).unwrap();

        Batcher::new(store.clone(), 3)
            .batch(&run, Path::new("/sorted/r"), 1)
            .unwrap();

        let batch = Path::new("/sorted/r/1");
        assert_eq!(store.read(&batch.join("00000001_5.000000.jpg")).unwrap(), b"a");
        assert_eq!(store.read(&batch.join("00000002_5.000000.jpg")).unwrap(), b"b");
        assert_eq!(store.read(&batch.join("00000003_9.000000.jpg")).unwrap(), b"c");
    }

    #[test]
    fn test_unsequenced_files_skipped() {
        let store = Arc::new(MemStore::new());
        let run = run_with(&store, 2);
        store.insert_file(&run.join("notes.txt"), b"", at(1)).unwrap();

        let outcome = Batcher::new(store.clone(), 1)
            .batch(&run, Path::new("/sorted/r"), 2)
            .unwrap();

        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(outcome.skipped, vec![run.join("notes.txt")]);
        assert!(store.exists(&run.join("notes.txt")));
    }

    #[test]
    fn test_numbering_continues() {
        let store = Arc::new(MemStore::new());
        store.create_dir_all(Path::new("/sorted/r/1")).unwrap();
        store.create_dir_all(Path::new("/sorted/r/2")).unwrap();
        let run = run_with(&store, 2);

        let outcome = Batcher::new(store, 1)
            .batch(&run, Path::new("/sorted/r"), 2)
            .unwrap();

        assert_eq!(outcome.batches, vec![PathBuf::from("/sorted/r/3")]);
    }

    #[test]
    fn test_pending_batches_in_numeric_order() {
        let store = Arc::new(MemStore::new());
        for dir in ["/sorted/r/10", "/sorted/r/2", "/sorted/r/notes", "/sorted/r/1"] {
            store.create_dir_all(Path::new(dir)).unwrap();
        }
        store
            .insert_file(Path::new("/sorted/r/3"), b"not a batch", at(1))
            .unwrap();

        let pending = Batcher::new(store, 1)
            .pending_batches(Path::new("/sorted/r"))
            .unwrap();

        assert_eq!(
            pending,
            vec![
                PathBuf::from("/sorted/r/1"),
                PathBuf::from("/sorted/r/2"),
                PathBuf::from("/sorted/r/10"),
            ]
        );
    }
}
