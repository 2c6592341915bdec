//! Janitor
//!
//! Purges the junk stores between runs. Everything in `junk_exp` goes, as
//! does everything in `junk_review` except the `re_merge` folder itself,
//! which is emptied instead (its contents were reconciled earlier in the run).

use crate::error::SortResult;
use crate::models::JanitorReport;
use shelfcam_common::layout::RE_MERGE_DIR;
use shelfcam_common::ContentStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct Janitor {
    store: Arc<dyn ContentStore>,
    junk: PathBuf,
    junk_review: PathBuf,
}

impl Janitor {
    pub fn new(store: Arc<dyn ContentStore>, junk: PathBuf, junk_review: PathBuf) -> Self {
        Self {
            store,
            junk,
            junk_review,
        }
    }

    pub fn clear(&self) -> SortResult<JanitorReport> {
        let mut report = JanitorReport::default();

        for entry in self.store.list_or_empty(&self.junk)? {
            self.store.remove_all(&self.junk.join(&entry.name))?;
            report.junk_removed += 1;
        }

        for entry in self.store.list_or_empty(&self.junk_review)? {
            let path = self.junk_review.join(&entry.name);
            if entry.name == RE_MERGE_DIR && entry.is_dir() {
                for leftover in self.store.list(&path)? {
                    self.store.remove_all(&path.join(&leftover.name))?;
                    report.re_merge_removed += 1;
                }
                continue;
            }
            self.store.remove_all(&path)?;
            report.review_removed += 1;
        }

        info!(
            junk = report.junk_removed,
            review = report.review_removed,
            re_merge = report.re_merge_removed,
            "Junk cleared"
        );
        Ok(report)
    }

    /// Junk-review entries awaiting an operator (everything but `re_merge`)
    pub fn review_pending(&self) -> SortResult<usize> {
        Ok(self
            .store
            .list_or_empty(&self.junk_review)?
            .iter()
            .filter(|e| e.name != RE_MERGE_DIR)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfcam_common::MemStore;
    use std::path::Path;
    use std::time::UNIX_EPOCH;

    fn janitor(store: &Arc<MemStore>) -> Janitor {
        Janitor::new(
            store.clone(),
            PathBuf::from("/junk"),
            PathBuf::from("/review"),
        )
    }

    fn touch(store: &MemStore, path: &str) {
        store.insert_file(Path::new(path), b"", UNIX_EPOCH).unwrap();
    }

    #[test]
    fn test_clear_keeps_re_merge_but_empties_it() {
        let store = Arc::new(MemStore::new());
        touch(&store, "/junk/1_1_6_20_2_0/00000001_1.0.png");
        touch(&store, "/junk/2_1_6_20_2_0/00000001_1.0.png");
        touch(&store, "/review/3_1_6_20_2_5120/00000001_1.0.png");
        touch(&store, "/review/re_merge/42/00000001_1.0.png");

        let report = janitor(&store).clear().unwrap();

        assert_eq!(
            report,
            JanitorReport {
                junk_removed: 2,
                review_removed: 1,
                re_merge_removed: 1,
            }
        );
        assert!(store.list(Path::new("/junk")).unwrap().is_empty());
        assert!(store.is_dir(Path::new("/review/re_merge")));
        assert!(store.list(Path::new("/review/re_merge")).unwrap().is_empty());
        assert_eq!(janitor(&store).review_pending().unwrap(), 0);
    }

    #[test]
    fn test_review_pending_ignores_re_merge() {
        let store = Arc::new(MemStore::new());
        store.create_dir_all(Path::new("/review/re_merge")).unwrap();
        assert_eq!(janitor(&store).review_pending().unwrap(), 0);

        touch(&store, "/review/7_1_6_20_2_999/00000001_1.0.png");
        assert_eq!(janitor(&store).review_pending().unwrap(), 1);
    }

    #[test]
    fn test_missing_stores_are_noop() {
        let store = Arc::new(MemStore::new());
        assert_eq!(janitor(&store).clear().unwrap(), JanitorReport::default());
        assert_eq!(janitor(&store).review_pending().unwrap(), 0);
    }
}
