//! Interposition records
//!
//! An [`Interposition`] is the metadata kept for one interposed symbol: its
//! exported name, the address of the real implementation once resolved, the
//! operator-supplied replacement, and where the record stands in the
//! hook/unhook state machine.

use crate::{Result, error::invalid_argument};
use alloc::ffi::CString;
use core::{
    ffi::CStr,
    fmt::Debug,
    num::NonZeroI32,
    ptr::NonNull,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};
use std::sync::{Mutex, MutexGuard, PoisonError};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a record.
///
/// Ids are handed out from a process-wide monotonic counter, so ordering ids
/// orders records by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterpositionId(u64);

impl InterpositionId {
    #[inline]
    fn next() -> Self {
        InterpositionId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Gets the raw id value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Where a record stands in the hook/unhook state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    /// The original address has not been looked up yet, or the lookup failed.
    Unresolved,
    /// The original address is known and the replacement is not active.
    Unhooked,
    /// The replacement is the active binding for the symbol.
    Hooked,
}

/// Outcome of the most recent hook or unhook attempt on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebindStatus {
    /// The rebinding facility reported success.
    Success,
    /// The rebinding facility reported a nonzero, facility-specific code.
    Facility(NonZeroI32),
    /// The attempt was refused because the original address is unknown.
    MissingOriginal,
    /// The attempt was refused because the replacement address is null.
    MissingReplacement,
}

impl RebindStatus {
    /// Maps a raw facility return value to a status.
    #[inline]
    pub fn from_code(code: i32) -> Self {
        match NonZeroI32::new(code) {
            None => RebindStatus::Success,
            Some(code) => RebindStatus::Facility(code),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, RebindStatus::Success)
    }

    /// The raw facility code, if the facility was actually invoked.
    #[inline]
    pub fn facility_code(&self) -> Option<i32> {
        match self {
            RebindStatus::Success => Some(0),
            RebindStatus::Facility(code) => Some(code.get()),
            _ => None,
        }
    }
}

/// Metadata for one interposed symbol.
///
/// Records are shared as `Arc<Interposition>`. The registry keeps its own
/// clone, so dropping the caller's handle never leaves a dangling entry.
pub struct Interposition {
    id: InterpositionId,
    /// exported symbol name, mangled for non-C linkage
    name: CString,
    /// 0 when absent
    replacement: usize,
    /// 0 until resolved, then never overwritten
    original: AtomicUsize,
    state: Mutex<HookState>,
    last_status: Mutex<Option<RebindStatus>>,
}

impl Debug for Interposition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interposition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("original", &format_args!("0x{:x}", self.original.load(Ordering::Acquire)))
            .field("replacement", &format_args!("0x{:x}", self.replacement))
            // try_lock: a transition may be in flight on this thread
            .field("state", &self.state.try_lock().ok().map(|state| *state))
            .finish()
    }
}

impl Interposition {
    /// Creates an unregistered record in the [`HookState::Unresolved`] state.
    ///
    /// Most callers want [`Interposer::create`](crate::Interposer::create),
    /// which also registers and resolves the record.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`](crate::Error::InvalidArgument) if `name` is
    /// empty or contains a NUL byte.
    pub fn new(name: &str, replacement: *const ()) -> Result<Self> {
        if name.is_empty() {
            return Err(invalid_argument("symbol name is empty"));
        }
        let name = CString::new(name)
            .map_err(|_| invalid_argument("symbol name contains an interior NUL byte"))?;
        Ok(Interposition {
            id: InterpositionId::next(),
            name,
            replacement: replacement as usize,
            original: AtomicUsize::new(0),
            state: Mutex::new(HookState::Unresolved),
            last_status: Mutex::new(None),
        })
    }

    /// Gets the identity of the record.
    #[inline]
    pub fn id(&self) -> InterpositionId {
        self.id
    }

    /// Gets the symbol name.
    #[inline]
    pub fn name(&self) -> &str {
        // Built from a `&str` in `new`.
        unsafe { core::str::from_utf8_unchecked(self.name.to_bytes()) }
    }

    /// Gets the C-style symbol name.
    #[inline]
    pub fn cname(&self) -> &CStr {
        &self.name
    }

    /// Gets the address of the real implementation, if it has been resolved.
    ///
    /// This is the same whether or not the replacement is currently active.
    #[inline]
    pub fn original(&self) -> Option<NonNull<()>> {
        NonNull::new(self.original.load(Ordering::Acquire) as *mut ())
    }

    /// Gets the replacement address supplied at creation.
    #[inline]
    pub fn replacement(&self) -> Option<NonNull<()>> {
        NonNull::new(self.replacement as *mut ())
    }

    #[inline]
    pub fn state(&self) -> HookState {
        *self.lock_state()
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.original().is_some()
    }

    /// Whether the replacement is currently the active binding.
    #[inline]
    pub fn is_hooked(&self) -> bool {
        self.state() == HookState::Hooked
    }

    /// Gets the outcome of the most recent hook/unhook attempt, `None` if
    /// there has been none.
    #[inline]
    pub fn last_status(&self) -> Option<RebindStatus> {
        *lock(&self.last_status)
    }

    /// Stores the resolved original address. The first store wins; returns
    /// whether this call stored it.
    pub(crate) fn set_original(&self, addr: NonNull<()>) -> bool {
        let stored = self
            .original
            .compare_exchange(0, addr.as_ptr() as usize, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        let mut state = self.lock_state();
        if *state == HookState::Unresolved {
            *state = HookState::Unhooked;
        }
        stored
    }

    #[inline]
    pub(crate) fn set_status(&self, status: RebindStatus) {
        *lock(&self.last_status) = Some(status);
    }

    /// Locks the transition state. Held across a facility call so that only
    /// one hook/unhook is in flight per record.
    #[inline]
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, HookState> {
        lock(&self.state)
    }
}

#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
