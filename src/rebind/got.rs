//! GOT rebinding for ELF objects loaded by the system dynamic linker.
use super::{REBIND_INVALID, REBIND_OK, Rebinder, Rebinding, dynamic::LoadedDynamic};
use crate::{
    Result,
    arch::{Dyn, Phdr, is_got_slot},
    os::{self, ProtFlags},
};
use core::{
    ffi::{c_int, c_void},
    ops::Range,
    ptr::NonNull,
    slice::from_raw_parts,
    sync::atomic::{AtomicUsize, Ordering},
};
use elf::abi::{PT_DYNAMIC, PT_GNU_RELRO};
use std::sync::Mutex;

type Mprotect = unsafe fn(NonNull<c_void>, usize, ProtFlags) -> Result<()>;

/// Serialises slot writes so two rebinds never race on the protection of
/// a shared RELRO page.
static PATCH_LOCK: Mutex<()> = Mutex::new(());

/// Rewrites GOT slots of every object in the process.
///
/// For each loaded object reported by `dl_iterate_phdr`, every `JUMP_SLOT`
/// and GOT data relocation whose symbol name matches a requested rebinding
/// has its slot overwritten with the replacement address. Slots inside
/// `PT_GNU_RELRO` are made writable for the store and read-only again after.
///
/// Return codes: [`REBIND_OK`], [`REBIND_INVALID`] for a malformed request,
/// or the positive `errno` of the first failed `mprotect`. Objects without
/// any matching slot are not an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct GotRebinder;

impl GotRebinder {
    pub const fn new() -> Self {
        GotRebinder
    }
}

struct WalkContext<'a, 'b> {
    rebindings: &'a [Rebinding<'b>],
    page_size: usize,
    /// first failure, REBIND_OK otherwise
    status: i32,
    patched: usize,
}

impl Rebinder for GotRebinder {
    fn rebind_symbols(&self, rebindings: &[Rebinding<'_>]) -> i32 {
        if rebindings.is_empty()
            || rebindings
                .iter()
                .any(|r| r.name.is_empty() || r.replacement.is_null())
        {
            return REBIND_INVALID;
        }
        let _guard = PATCH_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut ctx = WalkContext {
            rebindings,
            page_size: os::page_size(),
            status: REBIND_OK,
            patched: 0,
        };
        unsafe {
            libc::dl_iterate_phdr(Some(visit_object), &mut ctx as *mut WalkContext as *mut c_void);
        }
        #[cfg(feature = "log")]
        log::debug!(
            "[GotRebinder] {} slot(s) rewritten for {:?}, status: {}",
            ctx.patched,
            rebindings.iter().map(|r| r.name).collect::<alloc::vec::Vec<_>>(),
            ctx.status
        );
        ctx.status
    }
}

unsafe extern "C" fn visit_object(
    info: *mut libc::dl_phdr_info,
    _size: usize,
    data: *mut c_void,
) -> c_int {
    let (ctx, info) = unsafe { (&mut *(data as *mut WalkContext), &*info) };
    if info.dlpi_phdr.is_null() || info.dlpi_phnum == 0 {
        return 0;
    }
    let base = info.dlpi_addr as usize;
    let phdrs: &[Phdr] = unsafe { from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize) };

    let mut dynamic_ptr = None;
    let mut relro = None;
    for phdr in phdrs {
        match phdr.p_type {
            PT_DYNAMIC => dynamic_ptr = Some((base + phdr.p_vaddr as usize) as *const Dyn),
            PT_GNU_RELRO => {
                // Same rounding the dynamic linker applies when sealing RELRO.
                let mask = !(ctx.page_size - 1);
                let start = (base + phdr.p_vaddr as usize) & mask;
                let end = (base + phdr.p_vaddr as usize + phdr.p_memsz as usize) & mask;
                relro = Some(start..end);
            }
            _ => {}
        }
    }
    let Some(dynamic_ptr) = dynamic_ptr else {
        return 0;
    };
    let Some(dynamic) = (unsafe { LoadedDynamic::parse(dynamic_ptr, base) }) else {
        return 0;
    };

    let rebindings = ctx.rebindings;
    for rela in dynamic.relocations() {
        if !is_got_slot(rela.r_type()) || rela.r_symbol() == 0 {
            continue;
        }
        let name = dynamic.symbol_name(rela.r_symbol());
        let Some(rebinding) = rebindings.iter().find(|r| r.name == name) else {
            continue;
        };
        let slot = (base + rela.r_offset()) as *mut usize;
        match unsafe {
            write_slot(
                slot,
                rebinding.replacement as usize,
                relro.as_ref(),
                ctx.page_size,
                os::mprotect,
            )
        } {
            Ok(true) => {
                ctx.patched += 1;
                #[cfg(feature = "log")]
                log::trace!(
                    "[GotRebinder] object [{:?}]: slot 0x{:x} for [{:?}] -> {:p}",
                    object_name(info),
                    slot as usize,
                    name,
                    rebinding.replacement
                );
            }
            Ok(false) => {}
            Err(crate::Error::Mprotect { errno, .. }) if ctx.status == REBIND_OK => {
                ctx.status = errno;
            }
            Err(_) => {}
        }
    }
    0
}

#[cfg(feature = "log")]
fn object_name(info: &libc::dl_phdr_info) -> &core::ffi::CStr {
    if info.dlpi_name.is_null() {
        c""
    } else {
        unsafe { core::ffi::CStr::from_ptr(info.dlpi_name) }
    }
}

/// Stores `value` into the GOT slot. Returns whether the slot changed.
///
/// An error means the slot was left untouched. Once the store has happened
/// the call succeeds even if the page cannot be sealed again, leaving it
/// writable.
///
/// # Safety
/// `slot` must be a word-aligned GOT entry of a loaded object.
unsafe fn write_slot(
    slot: *mut usize,
    value: usize,
    relro: Option<&Range<usize>>,
    page_size: usize,
    mprotect: Mprotect,
) -> Result<bool> {
    let atomic = unsafe { AtomicUsize::from_ptr(slot) };
    if atomic.load(Ordering::Acquire) == value {
        return Ok(false);
    }
    let page = slot as usize & !(page_size - 1);
    let sealed = relro.is_some_and(|range| range.contains(&page));
    // Page addresses are never zero.
    let page_ptr = unsafe { NonNull::new_unchecked(page as *mut c_void) };
    if sealed {
        unsafe { mprotect(page_ptr, page_size, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE)? };
    }
    atomic.store(value, Ordering::Release);
    if sealed
        && let Err(_err) = unsafe { mprotect(page_ptr, page_size, ProtFlags::PROT_READ) }
    {
        #[cfg(feature = "log")]
        log::warn!(
            "[GotRebinder] page 0x{:x} left writable after slot write: {}",
            page,
            _err
        );
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::mprotect_error;

    unsafe fn refuse_reseal(_: NonNull<c_void>, _: usize, prot: ProtFlags) -> Result<()> {
        if prot.contains(ProtFlags::PROT_WRITE) {
            Ok(())
        } else {
            Err(mprotect_error("mprotect failed", libc::ENOMEM))
        }
    }

    unsafe fn refuse_all(_: NonNull<c_void>, _: usize, _: ProtFlags) -> Result<()> {
        Err(mprotect_error("mprotect failed", libc::EACCES))
    }

    fn relro_around(slot: &usize, page_size: usize) -> Range<usize> {
        let page = slot as *const usize as usize & !(page_size - 1);
        page..page + page_size
    }

    #[test]
    fn reseal_failure_still_reports_the_write() {
        let page_size = os::page_size();
        let mut slot = 0x1000usize;
        let relro = relro_around(&slot, page_size);
        let changed =
            unsafe { write_slot(&mut slot, 0x2000, Some(&relro), page_size, refuse_reseal) };
        assert!(matches!(changed, Ok(true)));
        assert_eq!(slot, 0x2000);
    }

    #[test]
    fn unwritable_page_leaves_slot_alone() {
        let page_size = os::page_size();
        let mut slot = 0x1000usize;
        let relro = relro_around(&slot, page_size);
        let changed = unsafe { write_slot(&mut slot, 0x2000, Some(&relro), page_size, refuse_all) };
        assert!(matches!(changed, Err(crate::Error::Mprotect { errno: libc::EACCES, .. })));
        assert_eq!(slot, 0x1000);
    }

    #[test]
    fn unchanged_slot_is_skipped() {
        let page_size = os::page_size();
        let mut slot = 0x1000usize;
        let relro = relro_around(&slot, page_size);
        let changed = unsafe { write_slot(&mut slot, 0x1000, Some(&relro), page_size, refuse_all) };
        assert!(matches!(changed, Ok(false)));
    }
}
