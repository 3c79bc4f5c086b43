//! Playback history sources.
//!
//! The stats service reads history only through [`RecordSource`]. The SQLite
//! store implements it (see [`crate::db::Database`]); [`MemoryRecordSource`]
//! serves fixed data for tests and one-off computations.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::stats::assemble;
use crate::stats::YearFilter;
use crate::types::{PlaybackRecord, ShowMetadata, SubjectId, SubjectTotal};

/// Upstream collaborator supplying playback history.
pub trait RecordSource: Send + Sync {
    /// Plays within `filter`, for one subject or (None) for everyone.
    fn fetch_records(
        &self,
        subject: Option<SubjectId>,
        filter: &YearFilter,
    ) -> Result<Vec<PlaybackRecord>>;

    /// Per-subject watch totals within `filter`.
    fn fetch_population_totals(&self, filter: &YearFilter) -> Result<Vec<SubjectTotal>>;

    /// Episode counts for the given show keys. Unknown shows are omitted.
    fn fetch_show_metadata(&self, show_keys: &[String]) -> Result<HashMap<String, ShowMetadata>>;
}

impl<R: RecordSource + ?Sized> RecordSource for std::sync::Arc<R> {
    fn fetch_records(
        &self,
        subject: Option<SubjectId>,
        filter: &YearFilter,
    ) -> Result<Vec<PlaybackRecord>> {
        (**self).fetch_records(subject, filter)
    }

    fn fetch_population_totals(&self, filter: &YearFilter) -> Result<Vec<SubjectTotal>> {
        (**self).fetch_population_totals(filter)
    }

    fn fetch_show_metadata(&self, show_keys: &[String]) -> Result<HashMap<String, ShowMetadata>> {
        (**self).fetch_show_metadata(show_keys)
    }
}

/// Record source over an in-memory record list.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordSource {
    records: Vec<PlaybackRecord>,
    names: HashMap<SubjectId, String>,
    /// None simulates an unreachable metadata service
    metadata: Option<HashMap<String, ShowMetadata>>,
}

impl MemoryRecordSource {
    pub fn new(records: Vec<PlaybackRecord>) -> Self {
        Self {
            records,
            names: HashMap::new(),
            metadata: Some(HashMap::new()),
        }
    }

    pub fn with_name(mut self, subject_id: SubjectId, name: impl Into<String>) -> Self {
        self.names.insert(subject_id, name.into());
        self
    }

    pub fn with_show_metadata(mut self, show_key: impl Into<String>, total_episodes: u32) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(show_key.into(), ShowMetadata { total_episodes });
        self
    }

    /// Make every metadata lookup fail.
    pub fn without_metadata(mut self) -> Self {
        self.metadata = None;
        self
    }
}

impl RecordSource for MemoryRecordSource {
    fn fetch_records(
        &self,
        subject: Option<SubjectId>,
        filter: &YearFilter,
    ) -> Result<Vec<PlaybackRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| subject.map_or(true, |id| r.subject_id == id))
            .filter(|r| filter.contains(r.viewed_at))
            .cloned()
            .collect())
    }

    fn fetch_population_totals(&self, filter: &YearFilter) -> Result<Vec<SubjectTotal>> {
        let records = self.fetch_records(None, filter)?;
        let mut totals = assemble::population_from_records(&records);
        for total in &mut totals {
            total.name = self.names.get(&total.subject_id).cloned();
        }
        Ok(totals)
    }

    fn fetch_show_metadata(&self, show_keys: &[String]) -> Result<HashMap<String, ShowMetadata>> {
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| Error::MetadataUnavailable("metadata service offline".to_string()))?;
        Ok(show_keys
            .iter()
            .filter_map(|key| metadata.get(key).map(|meta| (key.clone(), *meta)))
            .collect())
    }
}
