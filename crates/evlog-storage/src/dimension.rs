//! Dimension caches
//!
//! Each cache is an overlay over the dimension rows already persisted. New
//! and updated rows accumulate in the front store until the owning import
//! job flushes them.

use std::collections::HashMap;

use evlog_core::{
    BackedMap, Description, EventRecord, HasKey, HeaderRow, KeyedMap, OperationInfoRow,
    ProviderId, ProviderInfoRow, TaskInfoRow,
};
use tracing::debug;

use crate::error::DimensionError;

/// In-memory cache of the provider table that assigns surrogate ids
pub struct ProviderInfoCache {
    map: BackedMap<ProviderInfoRow>,
    names_by_id: HashMap<ProviderId, String>,
    // None once u32::MAX has been handed out
    next_id: Option<ProviderId>,
}

impl ProviderInfoCache {
    /// Create a cache over the persisted provider rows
    ///
    /// Fails if the rows reuse an id or a name.
    pub fn new(existing: impl IntoIterator<Item = ProviderInfoRow>) -> Result<Self, DimensionError> {
        let mut backing = KeyedMap::new();
        let mut names_by_id = HashMap::new();
        for row in existing {
            check_unbound(&backing, &names_by_id, &row)?;
            names_by_id.insert(row.provider_id, row.name.clone());
            backing.put(row);
        }
        let next_id = names_by_id.keys().max().map_or(Some(1), |max| max.checked_add(1));
        Ok(Self {
            map: BackedMap::new(backing),
            names_by_id,
            next_id,
        })
    }

    /// Observe a provider name and GUID, assigning a new surrogate id if the
    /// name has not been seen. Returns the id and whether it is new.
    pub fn observe(
        &mut self,
        name: &str,
        guid: Option<&str>,
    ) -> Result<(ProviderId, bool), DimensionError> {
        if let Some(existing) = self.map.find(name) {
            if existing.guid.as_deref() != guid {
                return Err(DimensionError::GuidConflict {
                    name: name.to_string(),
                    existing: existing.guid.clone(),
                    observed: guid.map(str::to_string),
                });
            }
            return Ok((existing.provider_id, false));
        }

        let id = self.next_id.ok_or(DimensionError::IdsExhausted)?;
        self.next_id = id.checked_add(1);
        self.names_by_id.insert(id, name.to_string());
        self.map
            .put(ProviderInfoRow::new(id, name, guid.map(str::to_string)));
        debug!(provider = name, id, "New provider");
        Ok((id, true))
    }

    /// Register a row with an explicit surrogate id
    ///
    /// Registering a row identical to a known one is a no-op.
    pub fn register(&mut self, row: ProviderInfoRow) -> Result<(), DimensionError> {
        if let Some(existing) = self.map.find(row.name.as_str())
            && existing.provider_id == row.provider_id
        {
            if existing.guid != row.guid {
                return Err(DimensionError::GuidConflict {
                    name: row.name,
                    existing: existing.guid.clone(),
                    observed: row.guid,
                });
            }
            return Ok(());
        }

        check_unbound(&self.map, &self.names_by_id, &row)?;
        self.next_id = self
            .next_id
            .zip(row.provider_id.checked_add(1))
            .map(|(next, after)| next.max(after));
        self.names_by_id.insert(row.provider_id, row.name.clone());
        self.map.put(row);
        Ok(())
    }

    /// Find a provider by name
    pub fn find_by_name(&self, name: &str) -> Option<&ProviderInfoRow> {
        self.map.find(name)
    }

    /// Find a provider by surrogate id
    pub fn find_by_id(&self, id: ProviderId) -> Option<&ProviderInfoRow> {
        self.names_by_id
            .get(&id)
            .and_then(|name| self.map.find(name.as_str()))
    }

    /// Rows to persist, in observation order
    pub fn newly_added(&self) -> impl Iterator<Item = &ProviderInfoRow> + '_ {
        self.map.items()
    }

    /// Number of rows to persist
    pub fn newly_added_count(&self) -> usize {
        self.map.front_len()
    }

    /// Total number of known providers
    pub fn len(&self) -> usize {
        self.names_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names_by_id.is_empty()
    }

    /// The id the next new provider will receive, `None` when ids are used up
    pub fn next_id(&self) -> Option<ProviderId> {
        self.next_id
    }
}

/// Lookup view used by the id/name binding checks
trait ProviderLookup {
    fn by_name(&self, name: &str) -> Option<&ProviderInfoRow>;
}

impl ProviderLookup for KeyedMap<ProviderInfoRow> {
    fn by_name(&self, name: &str) -> Option<&ProviderInfoRow> {
        self.find(name)
    }
}

impl ProviderLookup for BackedMap<ProviderInfoRow> {
    fn by_name(&self, name: &str) -> Option<&ProviderInfoRow> {
        self.find(name)
    }
}

fn check_unbound(
    rows: &impl ProviderLookup,
    names_by_id: &HashMap<ProviderId, String>,
    row: &ProviderInfoRow,
) -> Result<(), DimensionError> {
    if let Some(bound_to) = names_by_id.get(&row.provider_id)
        && *bound_to != row.name
    {
        return Err(DimensionError::IdInUse {
            id: row.provider_id,
            bound_to: bound_to.clone(),
        });
    }
    if let Some(existing) = rows.by_name(&row.name) {
        return Err(DimensionError::NameRegistered {
            name: row.name.clone(),
            id: existing.provider_id,
        });
    }
    Ok(())
}

/// A dimension row carrying a backfillable description
pub trait DescribedRow: HasKey {
    fn with_description(key: Self::Key, description: Description) -> Self;

    fn description(&self) -> &Description;
}

impl DescribedRow for TaskInfoRow {
    fn with_description(key: Self::Key, description: Description) -> Self {
        TaskInfoRow { key, description }
    }

    fn description(&self) -> &Description {
        &self.description
    }
}

impl DescribedRow for OperationInfoRow {
    fn with_description(key: Self::Key, description: Description) -> Self {
        OperationInfoRow { key, description }
    }

    fn description(&self) -> &Description {
        &self.description
    }
}

/// Overlay cache of task or operation rows
pub struct DescriptionCache<R: DescribedRow> {
    map: BackedMap<R>,
}

/// Cache of the task dimension
pub type TaskInfoCache = DescriptionCache<TaskInfoRow>;

/// Cache of the operation dimension
pub type OperationInfoCache = DescriptionCache<OperationInfoRow>;

impl<R: DescribedRow> DescriptionCache<R> {
    /// Create a cache over the persisted rows
    pub fn new(existing: impl IntoIterator<Item = R>) -> Self {
        Self {
            map: BackedMap::new(KeyedMap::from_items(existing)),
        }
    }

    /// Observe a key with an optional description
    ///
    /// Inserts the row if it is absent, or replaces it when a description
    /// differing from the stored one is supplied. Returns whether the front
    /// store changed.
    pub fn observe(&mut self, key: R::Key, description: Option<String>) -> bool {
        let incoming = description.map(|text| Description::from(text.as_str()));
        let replacement = match self.map.find(&key) {
            None => Some(incoming.unwrap_or_default()),
            Some(old) => incoming.filter(|d| d != old.description()),
        };
        match replacement {
            Some(description) => {
                self.map.put(R::with_description(key, description));
                true
            }
            None => false,
        }
    }

    /// Observe a key, invoking `loader` for the description only while the
    /// row is absent or its description is still unknown
    pub fn observe_with<F>(&mut self, key: R::Key, loader: F) -> bool
    where
        F: FnOnce() -> Option<String>,
    {
        if let Some(old) = self.map.find(&key)
            && !old.description().is_unknown()
        {
            return false;
        }
        self.observe(key, loader())
    }

    /// Find the row for a key
    pub fn find(&self, key: &R::Key) -> Option<&R> {
        self.map.find(key)
    }

    /// The known description for a key
    pub fn description(&self, key: &R::Key) -> Option<&Description> {
        self.find(key).map(DescribedRow::description)
    }

    /// New and updated rows to persist
    pub fn new_rows(&self) -> impl Iterator<Item = &R> + '_ {
        self.map.items()
    }

    /// Number of new and updated rows
    pub fn new_row_count(&self) -> usize {
        self.map.front_len()
    }
}

/// The three dimension caches used while ingesting one batch
pub struct InsertionTracker {
    pub providers: ProviderInfoCache,
    pub tasks: TaskInfoCache,
    pub operations: OperationInfoCache,
}

impl InsertionTracker {
    pub fn new(
        providers: Vec<ProviderInfoRow>,
        tasks: Vec<TaskInfoRow>,
        operations: Vec<OperationInfoRow>,
    ) -> Result<Self, DimensionError> {
        Ok(Self {
            providers: ProviderInfoCache::new(providers)?,
            tasks: TaskInfoCache::new(tasks),
            operations: OperationInfoCache::new(operations),
        })
    }

    /// Build the header row for a record, observing its provider, task and
    /// operation along the way
    pub fn make_header<E>(
        &mut self,
        record: &E,
        rid: i64,
        stamp: i64,
    ) -> Result<HeaderRow, DimensionError>
    where
        E: EventRecord + ?Sized,
    {
        let (provider_id, _) = self
            .providers
            .observe(record.provider_name(), record.provider_guid())?;
        let header = HeaderRow {
            rid,
            stamp,
            event_id: record.event_id(),
            event_version: record.version(),
            task_id: record.task(),
            provider_id,
            operation_id: record.opcode(),
        };
        self.tasks
            .observe_with(header.task_key(), || record.task_description());
        self.operations
            .observe_with(header.operation_key(), || record.operation_description());
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use evlog_core::{OperationKey, TaskKey};

    use super::*;

    #[test]
    fn test_provider_ids_are_dense() {
        let mut cache = ProviderInfoCache::new(Vec::new()).unwrap();
        let names = ["alpha", "beta", "gamma", "delta"];
        for (i, name) in names.iter().enumerate() {
            let (id, is_new) = cache.observe(name, None).unwrap();
            assert_eq!(id as usize, i + 1);
            assert!(is_new);
        }

        // Re-observing never changes an id
        for (i, name) in names.iter().enumerate() {
            assert_eq!(cache.observe(name, None).unwrap(), (i as u32 + 1, false));
        }

        let added: Vec<_> = cache.newly_added().map(|r| r.name.as_str()).collect();
        assert_eq!(added, names);
    }

    #[test]
    fn test_provider_ids_continue_after_existing() {
        let existing = vec![
            ProviderInfoRow::new(1, "one", None),
            ProviderInfoRow::new(7, "seven", None),
        ];
        let mut cache = ProviderInfoCache::new(existing).unwrap();
        assert_eq!(cache.observe("eight", None).unwrap(), (8, true));
        assert_eq!(cache.observe("seven", None).unwrap(), (7, false));
        assert_eq!(cache.newly_added_count(), 1);
        assert_eq!(cache.find_by_id(7).map(|r| r.name.as_str()), Some("seven"));
    }

    #[test]
    fn test_provider_ids_exhausted() {
        let existing = vec![ProviderInfoRow::new(u32::MAX - 1, "penultimate", None)];
        let mut cache = ProviderInfoCache::new(existing).unwrap();
        assert_eq!(cache.observe("last", None).unwrap(), (u32::MAX, true));
        assert_eq!(cache.next_id(), None);
        assert_eq!(cache.observe("overflow", None), Err(DimensionError::IdsExhausted));

        // Known names still resolve
        assert_eq!(cache.observe("last", None).unwrap(), (u32::MAX, false));

        let mut cache = ProviderInfoCache::new(Vec::new()).unwrap();
        cache.register(ProviderInfoRow::new(u32::MAX, "top", None)).unwrap();
        assert_eq!(cache.next_id(), None);
        assert_eq!(cache.observe("new", None), Err(DimensionError::IdsExhausted));

        let cache = ProviderInfoCache::new(vec![ProviderInfoRow::new(u32::MAX, "top", None)]).unwrap();
        assert_eq!(cache.next_id(), None);
    }

    #[test]
    fn test_guid_conflict_rejected() {
        let mut cache = ProviderInfoCache::new(Vec::new()).unwrap();
        cache.observe("svc", Some("{a}")).unwrap();
        let err = cache.observe("svc", Some("{b}")).unwrap_err();
        assert!(matches!(err, DimensionError::GuidConflict { .. }));

        let err = cache.observe("svc", None).unwrap_err();
        assert!(err.to_string().contains("'{a}' vs 'NULL'"));
    }

    #[test]
    fn test_register_conflicts() {
        let existing = vec![ProviderInfoRow::new(1, "one", None)];
        let mut cache = ProviderInfoCache::new(existing).unwrap();

        let err = cache
            .register(ProviderInfoRow::new(1, "other", None))
            .unwrap_err();
        assert!(matches!(err, DimensionError::IdInUse { id: 1, .. }));

        let err = cache
            .register(ProviderInfoRow::new(5, "one", None))
            .unwrap_err();
        assert!(matches!(err, DimensionError::NameRegistered { id: 1, .. }));

        cache.register(ProviderInfoRow::new(1, "one", None)).unwrap();
        cache.register(ProviderInfoRow::new(10, "ten", None)).unwrap();
        assert_eq!(cache.observe("eleven", None).unwrap(), (11, true));
    }

    #[test]
    fn test_duplicate_existing_rows_rejected() {
        let existing = vec![
            ProviderInfoRow::new(1, "one", None),
            ProviderInfoRow::new(1, "uno", None),
        ];
        assert!(ProviderInfoCache::new(existing).is_err());
    }

    #[test]
    fn test_task_observe_updates_description() {
        let key = TaskKey::new(1, 0, 2, 1);
        let mut cache = TaskInfoCache::new(vec![TaskInfoRow::new(key, "Old")]);

        assert!(!cache.observe(key, None));
        assert!(!cache.observe(key, Some("Old".into())));
        assert_eq!(cache.new_row_count(), 0);

        assert!(cache.observe(key, Some("New".into())));
        assert_eq!(cache.description(&key), Some(&Description::Text("New".into())));
        assert_eq!(cache.new_row_count(), 1);
    }

    #[test]
    fn test_loader_skipped_when_known() {
        let key = TaskKey::new(1, 0, 2, 1);
        let mut cache = TaskInfoCache::new(vec![TaskInfoRow::new(key, Description::Empty)]);
        let calls = Cell::new(0);
        cache.observe_with(key, || {
            calls.set(calls.get() + 1);
            Some("Loaded".into())
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(cache.new_row_count(), 0);
    }

    #[test]
    fn test_loader_backfills_unknown() {
        let op = OperationKey::new(TaskKey::new(1, 0, 2, 1), 11);
        let mut cache = OperationInfoCache::new(vec![OperationInfoRow::new(op, Description::Unknown)]);

        // Nothing loaded: untouched
        assert!(!cache.observe_with(op, || None));
        assert_eq!(cache.new_row_count(), 0);

        // Empty text on an unknown row is recorded as attempted
        assert!(cache.observe_with(op, || Some(String::new())));
        assert_eq!(cache.description(&op), Some(&Description::Empty));

        // Now known: the loader is not consulted again
        assert!(!cache.observe_with(op, || Some("Start".into())));
    }

    #[test]
    fn test_new_row_always_inserted() {
        let key = TaskKey::new(9, 1, 0, 3);
        let mut cache = TaskInfoCache::new(Vec::new());
        assert!(cache.observe_with(key, || None));
        assert_eq!(cache.description(&key), Some(&Description::Unknown));
        assert_eq!(cache.new_rows().count(), 1);
    }
}
