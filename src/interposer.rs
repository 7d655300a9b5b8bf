//! Lifecycle of interposition records
use crate::{
    Error, Result,
    error::{missing_replacement, rebind_error, symbol_not_found},
    lookup::{Dlsym, SymbolLookup},
    rebind::{DefaultRebinder, Rebinder, Rebinding},
    record::{HookState, Interposition, RebindStatus},
    registry::{DuplicateNames, Registry, RegistryConfig},
};
use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::{fmt::Debug, ptr::NonNull};
use hashbrown::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Builder for [`Interposer`].
pub struct InterposerBuilder {
    lookup: Option<Box<dyn SymbolLookup + Send + Sync>>,
    rebinder: Option<Box<dyn Rebinder + Send + Sync>>,
    config: RegistryConfig,
}

impl InterposerBuilder {
    /// Sets the dynamic symbol lookup used to resolve original addresses.
    /// Defaults to [`Dlsym`].
    pub fn lookup(mut self, lookup: impl SymbolLookup + Send + Sync + 'static) -> Self {
        self.lookup = Some(Box::new(lookup));
        self
    }

    /// Sets the rebinding facility. Defaults to [`DefaultRebinder`].
    pub fn rebinder(mut self, rebinder: impl Rebinder + Send + Sync + 'static) -> Self {
        self.rebinder = Some(Box::new(rebinder));
        self
    }

    /// Sets the policy for two records sharing a symbol name.
    pub fn duplicate_names(mut self, policy: DuplicateNames) -> Self {
        self.config.duplicate_names = policy;
        self
    }

    pub fn build(self) -> Interposer {
        Interposer {
            registry: RwLock::new(Registry::with_config(self.config)),
            active: Mutex::new(HashMap::new()),
            lookup: self.lookup.unwrap_or_else(|| Box::new(Dlsym)),
            rebinder: self
                .rebinder
                .unwrap_or_else(|| Box::new(DefaultRebinder::default())),
        }
    }
}

/// Result of a bulk hook or unhook sweep.
///
/// Every record is attempted; a failure does not stop the sweep.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failures: Vec<(Arc<Interposition>, Error)>,
}

impl BulkOutcome {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns the registry and drives records through their lifecycle.
///
/// The registry lock is only held for registry reads and writes, never while
/// the rebinding facility runs, so a replacement that looks up its original
/// by name cannot deadlock against a hook in progress. Hook and unhook
/// transitions are serialized by the table of active bindings.
///
/// At most one record per symbol name is [`HookState::Hooked`]: the one whose
/// replacement is currently bound. With duplicate names, the last hook wins
/// and the record it displaced drops back to [`HookState::Unhooked`].
pub struct Interposer {
    registry: RwLock<Registry>,
    /// symbol name -> the record whose replacement is bound
    active: Mutex<HashMap<Box<str>, Arc<Interposition>>>,
    lookup: Box<dyn SymbolLookup + Send + Sync>,
    rebinder: Box<dyn Rebinder + Send + Sync>,
}

impl Debug for Interposer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interposer")
            .field("registry", &*self.read_registry())
            .finish()
    }
}

impl Default for Interposer {
    fn default() -> Self {
        Self::new()
    }
}

impl Interposer {
    /// Creates an interposer with the platform's default lookup and rebinding
    /// facility and a registry that allows duplicate names.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> InterposerBuilder {
        InterposerBuilder {
            lookup: None,
            rebinder: None,
            config: RegistryConfig::default(),
        }
    }

    #[inline]
    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn lock_active(&self) -> MutexGuard<'_, HashMap<Box<str>, Arc<Interposition>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a record for `name`, registers it, and tries to resolve the
    /// original address.
    ///
    /// `name` must be the exact exported symbol name (the mangled name for
    /// non-C linkage). Failing to resolve it is not an error: the record
    /// stays [`HookState::Unresolved`] and hook/unhook will report it.
    ///
    /// # Errors
    /// * [`Error::InvalidArgument`] for an empty name or one containing NUL.
    /// * [`Error::DuplicateName`] if the registry rejects duplicate names.
    ///
    /// The registry is unchanged on error.
    pub fn create(&self, name: &str, replacement: *const ()) -> Result<Arc<Interposition>> {
        let record = Arc::new(Interposition::new(name, replacement)?);
        self.write_registry().add(record.clone())?;
        self.ensure_resolved(&record);
        Ok(record)
    }

    /// Registers a record built elsewhere, for example one kept in a static
    /// table. Returns `Ok(false)` if it is already registered.
    pub fn register(&self, record: Arc<Interposition>) -> Result<bool> {
        let added = self.write_registry().add(record.clone())?;
        self.ensure_resolved(&record);
        Ok(added)
    }

    /// Removes the record from the registry. Returns whether it was present.
    ///
    /// This does not unhook it first; unhook before destroying a hooked
    /// record if the original binding should come back.
    pub fn destroy(&self, record: &Interposition) -> bool {
        #[cfg(feature = "log")]
        if record.is_hooked() {
            log::warn!(
                "[Interposer] destroying [{}] while it is still hooked",
                record.name()
            );
        }
        self.write_registry().remove(record).is_some()
    }

    /// Resolves the record's original address if it is not known yet.
    ///
    /// Idempotent: once resolved, the address never changes. Returns whether
    /// the record is resolved after the call.
    pub fn ensure_resolved(&self, record: &Interposition) -> bool {
        if record.is_resolved() {
            return true;
        }
        match self
            .lookup
            .lookup(record.name())
            .and_then(|addr| NonNull::new(addr as *mut ()))
        {
            Some(addr) => {
                record.set_original(addr);
                #[cfg(feature = "log")]
                log::trace!(
                    "[Interposer] resolved [{}] to {:p}",
                    record.name(),
                    addr.as_ptr()
                );
                true
            }
            None => {
                #[cfg(feature = "log")]
                log::debug!("[Interposer] symbol [{}] not found", record.name());
                false
            }
        }
    }

    /// Makes the replacement the active binding for the record's symbol.
    ///
    /// Hooking an already hooked record succeeds without calling the
    /// rebinding facility. The outcome is recorded in
    /// [`Interposition::last_status`].
    ///
    /// If another record for the same name is hooked, its replacement is
    /// displaced: that record becomes [`HookState::Unhooked`] and has to be
    /// hooked again to take the binding back.
    ///
    /// # Errors
    /// * [`Error::SymbolNotFound`] if the original address cannot be resolved.
    /// * [`Error::MissingReplacement`] if the replacement address is null.
    /// * [`Error::Rebind`] if the facility fails; the record stays unhooked
    ///   and a displaced record stays hooked.
    pub fn hook(&self, record: &Arc<Interposition>) -> Result<()> {
        self.ensure_resolved(record);
        let mut active = self.lock_active();
        let mut state = record.lock_state();
        if record.original().is_none() {
            record.set_status(RebindStatus::MissingOriginal);
            return Err(symbol_not_found(record.name()));
        }
        let Some(replacement) = record.replacement() else {
            record.set_status(RebindStatus::MissingReplacement);
            return Err(missing_replacement(record.name()));
        };
        if *state == HookState::Hooked {
            return Ok(());
        }
        let status = self.rebinder.rebind_symbols(&[Rebinding {
            name: record.cname(),
            replacement: replacement.as_ptr(),
        }]);
        record.set_status(RebindStatus::from_code(status));
        if status != 0 {
            #[cfg(feature = "log")]
            log::warn!(
                "[Interposer] hooking [{}] failed with status {}",
                record.name(),
                status
            );
            return Err(rebind_error(record.name(), status));
        }
        *state = HookState::Hooked;
        drop(state);
        if let Some(displaced) = active.insert(Box::from(record.name()), record.clone())
            && displaced.id() != record.id()
        {
            let mut displaced_state = displaced.lock_state();
            if *displaced_state == HookState::Hooked {
                *displaced_state = HookState::Unhooked;
            }
            #[cfg(feature = "log")]
            log::debug!(
                "[Interposer] [{}] id {} displaced id {}",
                record.name(),
                record.id().get(),
                displaced.id().get()
            );
        }
        #[cfg(feature = "log")]
        log::debug!(
            "[Interposer] hooked [{}] -> {:p}",
            record.name(),
            replacement.as_ptr()
        );
        Ok(())
    }

    /// Restores the original binding for the record's symbol.
    ///
    /// Unhooking a record that is not hooked, including one displaced by a
    /// later hook of the same name, succeeds without calling the rebinding
    /// facility.
    ///
    /// # Errors
    /// * [`Error::SymbolNotFound`] if the original address cannot be resolved,
    ///   since there is nothing to rebind back to.
    /// * [`Error::Rebind`] if the facility fails; the record stays hooked.
    pub fn unhook(&self, record: &Interposition) -> Result<()> {
        self.ensure_resolved(record);
        let mut active = self.lock_active();
        let mut state = record.lock_state();
        let Some(original) = record.original() else {
            record.set_status(RebindStatus::MissingOriginal);
            return Err(symbol_not_found(record.name()));
        };
        if *state != HookState::Hooked {
            return Ok(());
        }
        let status = self.rebinder.rebind_symbols(&[Rebinding {
            name: record.cname(),
            replacement: original.as_ptr(),
        }]);
        record.set_status(RebindStatus::from_code(status));
        if status != 0 {
            #[cfg(feature = "log")]
            log::warn!(
                "[Interposer] unhooking [{}] failed with status {}",
                record.name(),
                status
            );
            return Err(rebind_error(record.name(), status));
        }
        *state = HookState::Unhooked;
        if active
            .get(record.name())
            .is_some_and(|bound| bound.id() == record.id())
        {
            active.remove(record.name());
        }
        #[cfg(feature = "log")]
        log::debug!("[Interposer] unhooked [{}]", record.name());
        Ok(())
    }

    /// Hooks every record in `records`.
    pub fn hook_all(&self, records: &[Arc<Interposition>]) -> BulkOutcome {
        self.sweep(records, |record| self.hook(record))
    }

    /// Unhooks every record in `records`.
    pub fn unhook_all(&self, records: &[Arc<Interposition>]) -> BulkOutcome {
        self.sweep(records, |record| self.unhook(record))
    }

    /// Hooks every registered record, in registration order.
    pub fn hook_registered(&self) -> BulkOutcome {
        self.hook_all(&self.records())
    }

    /// Unhooks every registered record, in registration order.
    pub fn unhook_registered(&self) -> BulkOutcome {
        self.unhook_all(&self.records())
    }

    fn sweep(
        &self,
        records: &[Arc<Interposition>],
        op: impl Fn(&Arc<Interposition>) -> Result<()>,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for record in records {
            match op(record) {
                Ok(()) => outcome.succeeded += 1,
                Err(err) => outcome.failures.push((record.clone(), err)),
            }
        }
        outcome
    }

    /// Gets the address of the real implementation, hooked or not.
    #[inline]
    pub fn original_pointer(&self, record: &Interposition) -> Option<NonNull<()>> {
        record.original()
    }

    /// Gets the address of the real implementation of `name`, resolving it
    /// first if needed.
    ///
    /// This is how a replacement that only knows its symbol's name reaches
    /// the implementation it replaced. With several records for one name,
    /// the first registered wins.
    pub fn original_pointer_by_name(&self, name: &str) -> Option<NonNull<()>> {
        let record = self.find_by_name(name)?;
        self.ensure_resolved(&record);
        record.original()
    }

    #[inline]
    pub fn function_name<'a>(&self, record: &'a Interposition) -> &'a str {
        record.name()
    }

    /// The pair handed to the rebinding facility when hooking.
    #[inline]
    pub fn replacement_rebinding<'a>(&self, record: &'a Interposition) -> Rebinding<'a> {
        Rebinding {
            name: record.cname(),
            replacement: record
                .replacement()
                .map_or(core::ptr::null(), |ptr| ptr.as_ptr()),
        }
    }

    /// The pair handed to the rebinding facility when unhooking.
    #[inline]
    pub fn original_rebinding<'a>(&self, record: &'a Interposition) -> Rebinding<'a> {
        Rebinding {
            name: record.cname(),
            replacement: record
                .original()
                .map_or(core::ptr::null(), |ptr| ptr.as_ptr()),
        }
    }

    /// Finds the first registered record for `name`.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Interposition>> {
        self.read_registry().find_by_name(name).cloned()
    }

    #[inline]
    pub fn contains(&self, record: &Interposition) -> bool {
        self.read_registry().contains(record)
    }

    /// Snapshot of the registered records in registration order.
    pub fn records(&self) -> Vec<Arc<Interposition>> {
        self.read_registry().iter().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.read_registry().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_registry().is_empty()
    }

    /// Removes every record from the registry without unhooking them.
    pub fn clear(&self) -> Vec<Arc<Interposition>> {
        self.write_registry().clear()
    }
}
