//! Dynamic symbol lookup
use alloc::sync::Arc;

/// A trait for resolving the address currently bound to a symbol name.
///
/// The interposer uses this to find the original implementation of each
/// interposed symbol. The default implementation, [`Dlsym`], asks the
/// dynamic linker for the symbol in the global scope.
///
/// # Examples
///
/// Using a closure for simple lookups:
/// ```rust
/// use elf_interpose::SymbolLookup;
///
/// let lookup = |name: &str| match name {
///     "malloc" => Some(0x1234 as *const ()),
///     "free" => Some(0x5678 as *const ()),
///     _ => None,
/// };
/// assert_eq!(lookup.lookup("free"), Some(0x5678 as *const ()));
/// ```
pub trait SymbolLookup {
    /// Finds the address of a symbol by its name.
    ///
    /// # Returns
    /// * `Some(ptr)` - The symbol's address if found.
    /// * `None` - Symbol not found.
    fn lookup(&self, name: &str) -> Option<*const ()>;
}

impl<F: ?Sized> SymbolLookup for F
where
    F: Fn(&str) -> Option<*const ()>,
{
    fn lookup(&self, name: &str) -> Option<*const ()> {
        self(name)
    }
}

impl<S: SymbolLookup + ?Sized> SymbolLookup for Arc<S> {
    fn lookup(&self, name: &str) -> Option<*const ()> {
        (**self).lookup(name)
    }
}

impl SymbolLookup for () {
    fn lookup(&self, _name: &str) -> Option<*const ()> {
        None
    }
}

/// Looks symbols up with `dlsym(RTLD_DEFAULT, name)`.
///
/// GOT rebinding does not affect `dlsym`, so the address returned stays the
/// real implementation even while a replacement is active.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dlsym;

#[cfg(unix)]
impl SymbolLookup for Dlsym {
    fn lookup(&self, name: &str) -> Option<*const ()> {
        let name = alloc::ffi::CString::new(name).ok()?;
        let addr = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
        if addr.is_null() {
            None
        } else {
            Some(addr as *const ())
        }
    }
}

#[cfg(not(unix))]
impl SymbolLookup for Dlsym {
    fn lookup(&self, _name: &str) -> Option<*const ()> {
        None
    }
}
