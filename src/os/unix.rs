use super::ProtFlags;
use crate::{Result, error::mprotect_error};
use core::{ffi::c_void, ptr::NonNull};

/// Changes the protection of `len` bytes starting at the page `addr`.
///
/// # Safety
/// `addr` must be page-aligned and the range must belong to a mapping the
/// caller is entitled to reprotect.
pub(crate) unsafe fn mprotect(addr: NonNull<c_void>, len: usize, prot: ProtFlags) -> Result<()> {
    let res = unsafe { libc::mprotect(addr.as_ptr(), len, prot.bits()) };
    if res != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL);
        return Err(mprotect_error("mprotect failed", errno));
    }
    Ok(())
}
