//! The process-wide interposer
//!
//! Replacement functions are plain `extern "C"` functions with no context
//! argument, so the only way they can reach the implementation they replaced
//! is through state visible to the whole process. [`install`] publishes one
//! [`Interposer`] for that purpose and [`original_pointer_by_name`] queries it.
use crate::{Error, Interposer, Result};
use alloc::sync::Arc;
use core::ptr::NonNull;
use std::sync::{PoisonError, RwLock};

static GLOBAL: RwLock<Option<Arc<Interposer>>> = RwLock::new(None);

/// Publishes `interposer` as the process-wide interposer.
///
/// # Errors
/// [`Error::AlreadyInstalled`](crate::Error::AlreadyInstalled) if another
/// interposer is installed. Call [`shutdown`] first to replace it.
pub fn install(interposer: Interposer) -> Result<Arc<Interposer>> {
    let mut global = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    if global.is_some() {
        return Err(Error::AlreadyInstalled);
    }
    let interposer = Arc::new(interposer);
    *global = Some(interposer.clone());
    #[cfg(feature = "log")]
    log::debug!("[Global] interposer installed");
    Ok(interposer)
}

/// Gets the installed interposer, if any.
#[inline]
pub fn get() -> Option<Arc<Interposer>> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Uninstalls the process-wide interposer, unhooking and unregistering every
/// record it holds. Returns the interposer that was installed.
///
/// The interposer stays installed while its records are unhooked, so
/// replacements that run during the unhook still find their originals.
/// Unhook failures are logged and otherwise ignored; the records are
/// unregistered either way.
pub fn shutdown() -> Option<Arc<Interposer>> {
    let interposer = get()?;
    let _outcome = interposer.unhook_registered();
    #[cfg(feature = "log")]
    for (record, err) in &_outcome.failures {
        log::warn!("[Global] failed to unhook [{}]: {}", record.name(), err);
    }
    {
        let mut global = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
        if global
            .as_ref()
            .is_some_and(|installed| Arc::ptr_eq(installed, &interposer))
        {
            *global = None;
        }
    }
    interposer.clear();
    #[cfg(feature = "log")]
    log::debug!("[Global] interposer shut down");
    Some(interposer)
}

/// Gets the address of the real implementation of `name` through the
/// installed interposer.
///
/// Returns `None` if nothing is installed, no record carries that name, or
/// the symbol cannot be resolved.
pub fn original_pointer_by_name(name: &str) -> Option<NonNull<()>> {
    get()?.original_pointer_by_name(name)
}
