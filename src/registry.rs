//! Registry of interposition records
//!
//! The registry keeps every known [`Interposition`] in insertion order and
//! answers two questions: "is this record registered?" (by identity) and
//! "which record interposes this symbol?" (by name).
use crate::{
    Result,
    error::duplicate_name,
    record::{Interposition, InterpositionId},
};
use alloc::{
    boxed::Box,
    collections::BTreeMap,
    sync::Arc,
    vec::Vec,
};
use core::{
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
};
use hashbrown::HashMap;

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(1);

/// What to do when a second, distinct record is added under a name that is
/// already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateNames {
    /// Keep both. Lookups by name return the first one registered.
    ///
    /// Only one of them can be bound at a time: the last one hooked wins, and
    /// the record it displaces reports [`HookState::Unhooked`](crate::HookState::Unhooked).
    /// Unhooking the winner restores the original implementation, not the
    /// displaced replacement.
    #[default]
    Allow,
    /// Refuse the second record with [`Error::DuplicateName`](crate::Error::DuplicateName).
    Reject,
}

/// Runtime configuration of a [`Registry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryConfig {
    pub duplicate_names: DuplicateNames,
}

/// Opaque handle to a registered record's position, returned by
/// [`Registry::find_by_identity`] and consumed by [`Registry::remove_at`].
///
/// A location only means something to the registry that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    registry: u64,
    seq: u64,
}

/// An ordered collection of interposition records.
///
/// Membership is by identity: adding the same record twice is a no-op.
pub struct Registry {
    config: RegistryConfig,
    /// stamped into every issued `Location`
    token: u64,
    /// next insertion sequence number
    next_seq: u64,
    /// insertion order
    entries: BTreeMap<u64, Arc<Interposition>>,
    /// identity -> sequence
    seqs: HashMap<InterpositionId, u64>,
    /// name -> sequences, ascending
    by_name: HashMap<Box<str>, Vec<u64>>,
}

impl Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("names", &self.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry that allows duplicate names.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Registry {
            config,
            token: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            next_seq: 0,
            entries: BTreeMap::new(),
            seqs: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Appends `record` to the end of the iteration order.
    ///
    /// Returns `Ok(false)` without touching the registry if the same record
    /// is already present.
    ///
    /// # Errors
    /// [`Error::DuplicateName`](crate::Error::DuplicateName) if the registry
    /// rejects duplicate names and a different record already uses this name.
    pub fn add(&mut self, record: Arc<Interposition>) -> Result<bool> {
        if self.seqs.contains_key(&record.id()) {
            return Ok(false);
        }
        if self.config.duplicate_names == DuplicateNames::Reject
            && self
                .by_name
                .get(record.name())
                .is_some_and(|seqs| !seqs.is_empty())
        {
            return Err(duplicate_name(record.name()));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        #[cfg(feature = "log")]
        log::trace!(
            "[Registry] add [{}] id: {}, position: {}",
            record.name(),
            record.id().get(),
            self.entries.len()
        );
        self.seqs.insert(record.id(), seq);
        self.by_name
            .entry(Box::from(record.name()))
            .or_default()
            .push(seq);
        self.entries.insert(seq, record);
        Ok(true)
    }

    /// Removes the record with the same identity as `record`, if present.
    pub fn remove(&mut self, record: &Interposition) -> Option<Arc<Interposition>> {
        let location = self.find_by_identity(record)?;
        self.remove_at(location)
    }

    /// Removes the record at a location previously returned by
    /// [`find_by_identity`](Self::find_by_identity).
    ///
    /// A stale location (its record already removed) or one issued by another
    /// registry is a no-op.
    pub fn remove_at(&mut self, location: Location) -> Option<Arc<Interposition>> {
        if location.registry != self.token {
            return None;
        }
        let record = self.entries.remove(&location.seq)?;
        self.seqs.remove(&record.id());
        if let Some(seqs) = self.by_name.get_mut(record.name()) {
            seqs.retain(|seq| *seq != location.seq);
            if seqs.is_empty() {
                self.by_name.remove(record.name());
            }
        }
        #[cfg(feature = "log")]
        log::trace!(
            "[Registry] remove [{}] id: {}",
            record.name(),
            record.id().get()
        );
        Some(record)
    }

    /// Reports whether `record` is registered, and where.
    #[inline]
    pub fn find_by_identity(&self, record: &Interposition) -> Option<Location> {
        self.seqs
            .get(&record.id())
            .map(|seq| Location {
                registry: self.token,
                seq: *seq,
            })
    }

    #[inline]
    pub fn contains(&self, record: &Interposition) -> bool {
        self.seqs.contains_key(&record.id())
    }

    /// Finds the first registered record whose name is exactly `name`.
    ///
    /// An empty name never matches.
    pub fn find_by_name(&self, name: &str) -> Option<&Arc<Interposition>> {
        self.find_all_by_name(name).next()
    }

    /// Iterates every record registered under `name`, in insertion order.
    pub fn find_all_by_name<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = &'a Arc<Interposition>> + use<'a> {
        let seqs = if name.is_empty() {
            None
        } else {
            self.by_name.get(name)
        };
        seqs.into_iter()
            .flatten()
            .filter_map(move |seq| self.entries.get(seq))
    }

    /// Iterates all records in insertion order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Interposition>> {
        self.entries.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every record, returning them in insertion order.
    pub fn clear(&mut self) -> Vec<Arc<Interposition>> {
        self.seqs.clear();
        self.by_name.clear();
        core::mem::take(&mut self.entries).into_values().collect()
    }
}
