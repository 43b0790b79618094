use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{AnalyzedPaper, DailyRecord};

/// One JSON file per calendar date under `<data_dir>/papers`.
///
/// Each save is a full load-merge-rewrite. Two saves for the same date must
/// not run concurrently; callers serialize them.
#[derive(Debug, Clone)]
pub struct DailyStore {
    dir: PathBuf,
}

impl DailyStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("papers"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    pub async fn load(&self, date: NaiveDate) -> Result<Option<DailyRecord>, StoreError> {
        let path = self.path_for(date);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Merge `papers` into the record for `date` and return how many were new.
    /// A save that adds nothing leaves an existing file untouched.
    pub async fn save(&self, date: NaiveDate, papers: &[AnalyzedPaper]) -> Result<usize, StoreError> {
        let existing = self.load(date).await?;
        let is_new = existing.is_none();
        let mut record = existing.unwrap_or_else(|| DailyRecord::new(date));

        let mut added = 0;
        for paper in papers {
            if record.add_paper(paper.clone()) {
                added += 1;
            }
        }

        if added == 0 && !is_new {
            debug!(%date, "no new papers, record unchanged");
            return Ok(0);
        }

        record.fetch_time = Utc::now();
        self.write(&record).await?;
        info!(%date, added, total = record.papers.len(), "saved daily record");
        Ok(added)
    }

    /// Dates with a stored record, oldest first.
    pub async fn dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut dates = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// Write to a sibling temp file and rename over the target, so readers
    /// only ever see a complete record.
    async fn write(&self, record: &DailyRecord) -> Result<(), StoreError> {
        let path = self.path_for(record.date);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        let json = serde_json::to_string_pretty(record)?;
        let tmp = self
            .dir
            .join(format!(".{}.{:08x}.tmp", record.date, fastrand::u32(..)));
        tokio::fs::write(&tmp, json).await.map_err(io_err(&tmp))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&path)(e));
        }
        Ok(())
    }
}
