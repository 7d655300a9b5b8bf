//! Page protection for GOT slot writes
use bitflags::bitflags;
use core::ffi::c_int;

bitflags! {
    #[derive(Clone, Copy, Debug, Default)]
    /// Memory protection flags for a page holding GOT slots.
    pub struct ProtFlags: c_int {
        /// No access allowed.
        const PROT_NONE = 0;

        /// Allow reading from the memory region.
        const PROT_READ = 1;

        /// Allow writing to the memory region.
        const PROT_WRITE = 2;

        /// Allow executing code in the memory region.
        const PROT_EXEC = 4;
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "use-syscall")]{
        mod linux_syscall;
        pub(crate) use linux_syscall::*;
    }else {
        mod unix;
        pub(crate) use unix::*;
    }
}

/// Gets the system page size, falling back to 4 KiB.
#[inline]
pub(crate) fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 0x1000 }
}
