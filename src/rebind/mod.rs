//! The symbol rebinding facility
//!
//! A [`Rebinder`] rewrites every dynamic-linker reference to a symbol inside
//! the running process so that later calls land on a new address. The
//! interposer drives it with one [`Rebinding`] per transition: the
//! replacement address to hook, the original address to unhook.
use alloc::sync::Arc;
use core::{ffi::CStr, fmt::Debug};

/// The facility completed the request.
pub const REBIND_OK: i32 = 0;
/// The request was malformed: no rebindings, an empty name or a null address.
pub const REBIND_INVALID: i32 = -1;
/// No rebinding facility exists for this platform.
pub const REBIND_UNSUPPORTED: i32 = -2;

/// One (name, address) pair handed to a [`Rebinder`].
#[derive(Clone, Copy)]
pub struct Rebinding<'a> {
    /// The exported symbol name.
    pub name: &'a CStr,
    /// The address the symbol should resolve to afterwards.
    pub replacement: *const (),
}

impl Debug for Rebinding<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Rebinding")
            .field("name", &self.name)
            .field("replacement", &self.replacement)
            .finish()
    }
}

/// A trait for the mechanism that swaps symbol bindings.
///
/// Implementations return `0` on success and a facility-specific nonzero
/// code on failure. The code is kept on the record for diagnostics, so it
/// should be meaningful to whoever configured the facility.
///
/// # Examples
///
/// A recording stand-in, handy in tests:
/// ```rust
/// use elf_interpose::{Rebinder, Rebinding};
/// use std::sync::Mutex;
///
/// let seen = Mutex::new(Vec::new());
/// let rebinder = |rebindings: &[Rebinding<'_>]| {
///     let mut seen = seen.lock().unwrap();
///     seen.extend(rebindings.iter().map(|r| r.name.to_owned()));
///     0
/// };
/// assert_eq!(rebinder.rebind_symbols(&[]), 0);
/// ```
pub trait Rebinder {
    /// Rebinds every symbol named in `rebindings` to its replacement address.
    fn rebind_symbols(&self, rebindings: &[Rebinding<'_>]) -> i32;
}

impl<F: ?Sized> Rebinder for F
where
    F: Fn(&[Rebinding<'_>]) -> i32,
{
    fn rebind_symbols(&self, rebindings: &[Rebinding<'_>]) -> i32 {
        self(rebindings)
    }
}

impl<R: Rebinder + ?Sized> Rebinder for Arc<R> {
    fn rebind_symbols(&self, rebindings: &[Rebinding<'_>]) -> i32 {
        (**self).rebind_symbols(rebindings)
    }
}

/// Stand-in for platforms without a rebinding facility. Every request fails
/// with [`REBIND_UNSUPPORTED`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedRebinder;

impl Rebinder for UnsupportedRebinder {
    fn rebind_symbols(&self, _rebindings: &[Rebinding<'_>]) -> i32 {
        REBIND_UNSUPPORTED
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(
        target_os = "linux",
        target_pointer_width = "64",
        any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64"),
    ))]{
        mod dynamic;
        mod got;
        pub use got::GotRebinder;
        /// The rebinding facility used by [`Interposer::new`](crate::Interposer::new).
        pub type DefaultRebinder = GotRebinder;
    }else {
        pub type DefaultRebinder = UnsupportedRebinder;
    }
}
