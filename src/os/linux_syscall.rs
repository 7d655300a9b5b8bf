use super::ProtFlags;
use crate::{Result, error::mprotect_error};
use core::{ffi::c_void, ptr::NonNull};
use syscalls::Sysno;

/// Changes the protection of `len` bytes starting at the page `addr`,
/// bypassing libc so an interposed `mprotect` is never re-entered.
///
/// # Safety
/// `addr` must be page-aligned and the range must belong to a mapping the
/// caller is entitled to reprotect.
pub(crate) unsafe fn mprotect(addr: NonNull<c_void>, len: usize, prot: ProtFlags) -> Result<()> {
    let value = unsafe { syscalls::raw_syscall!(Sysno::mprotect, addr.as_ptr(), len, prot.bits()) };
    // Same error window musl uses for raw syscall returns.
    if value > -4096isize as usize {
        return Err(mprotect_error("mprotect failed", (value as isize).wrapping_neg() as i32));
    }
    Ok(())
}
