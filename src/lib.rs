//! # elf_interpose
//! A registry and lifecycle manager for runtime function interposition in
//! dynamically linked processes.
//! ## Usage
//! Each interposed symbol gets an [`Interposition`] record holding its
//! name, the address of the real implementation and the replacement.
//! [`Interposer`] registers records, resolves their originals with a
//! [`SymbolLookup`] and switches the active binding with a [`Rebinder`]. On
//! Linux the default rebinder rewrites the GOT slots of every loaded object.
//!
//! A replacement reaches the function it replaced through
//! [`global::original_pointer_by_name`] or the [`original_fn!`] macro.
//! ## Example
//! ```rust,no_run
//! use core::ffi::{c_char, c_void};
//! use elf_interpose::{Interposer, global, original_fn};
//!
//! type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_void;
//!
//! unsafe extern "C" fn traced_fopen(path: *const c_char, mode: *const c_char) -> *mut c_void {
//!     let fopen = unsafe { original_fn!("fopen" => FopenFn) }.unwrap();
//!     unsafe { fopen(path, mode) }
//! }
//!
//! let interposer = global::install(Interposer::new()).unwrap();
//! let record = interposer.create("fopen", traced_fopen as *const ()).unwrap();
//! interposer.hook(&record).unwrap();
//! // every fopen call in the process now lands in traced_fopen
//! interposer.unhook(&record).unwrap();
//! global::shutdown();
//! ```
extern crate alloc;

cfg_if::cfg_if! {
    if #[cfg(all(
        target_os = "linux",
        target_pointer_width = "64",
        any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64"),
    ))]{
        mod arch;
        mod os;
    }
}

mod error;
pub mod global;
mod interposer;
mod lookup;
#[doc(hidden)]
pub mod macros;
pub mod rebind;
mod record;
pub mod registry;

pub use error::Error;
pub use interposer::{BulkOutcome, Interposer, InterposerBuilder};
pub use lookup::{Dlsym, SymbolLookup};
pub use rebind::{
    DefaultRebinder, REBIND_INVALID, REBIND_OK, REBIND_UNSUPPORTED, Rebinder, Rebinding,
    UnsupportedRebinder,
};
pub use record::{HookState, Interposition, InterpositionId, RebindStatus};
pub use registry::{DuplicateNames, Location, Registry, RegistryConfig};

#[cfg(all(
    target_os = "linux",
    target_pointer_width = "64",
    any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64"),
))]
pub use rebind::GotRebinder;

/// A type alias for `Result`s returned by `elf_interpose` functions.
///
/// This is a convenience alias that eliminates the need to repeatedly specify
/// the `Error` type in function signatures.
pub type Result<T> = core::result::Result<T, Error>;
