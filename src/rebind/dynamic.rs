//! Parsing `.dynamic` section of an already loaded object
use crate::arch::{Dyn, ElfRela, ElfSymbol};
use core::{ffi::CStr, slice::from_raw_parts};
use elf::abi::*;

/// The parts of a loaded object's dynamic section needed to find GOT slots.
pub(crate) struct LoadedDynamic<'obj> {
    /// DT_SYMTAB
    symtab: *const ElfSymbol,
    /// DT_STRTAB
    strtab: *const u8,
    /// DT_RELA
    dynrel: &'obj [ElfRela],
    /// DT_JMPREL
    pltrel: &'obj [ElfRela],
}

/// Some loaders relocate `d_ptr` entries in place and some leave them as
/// offsets from the load base.
#[inline]
fn adjust(ptr: usize, base: usize) -> usize {
    if ptr < base { ptr + base } else { ptr }
}

#[inline]
unsafe fn rela_slice<'obj>(addr: usize, size: usize) -> &'obj [ElfRela] {
    if addr == 0 || size == 0 {
        return &[];
    }
    unsafe { from_raw_parts(addr as *const ElfRela, size / size_of::<ElfRela>()) }
}

impl<'obj> LoadedDynamic<'obj> {
    /// Reads the dynamic section at `dynamic_ptr` of an object loaded at `base`.
    ///
    /// Returns `None` for objects without a symbol or string table.
    ///
    /// # Safety
    /// `dynamic_ptr` must point to a `DT_NULL`-terminated dynamic section that
    /// stays mapped for `'obj`.
    pub(crate) unsafe fn parse(dynamic_ptr: *const Dyn, base: usize) -> Option<Self> {
        let mut symtab_off = 0;
        let mut strtab_off = 0;
        let mut rela_off = 0;
        let mut rela_size = 0;
        let mut pltrel_off = 0;
        let mut pltrel_size = 0;
        let mut pltrel_kind = DT_RELA;

        let mut cur_dyn_ptr = dynamic_ptr;
        unsafe {
            loop {
                let dynamic = &*cur_dyn_ptr;
                match dynamic.d_tag {
                    DT_SYMTAB => symtab_off = dynamic.d_un as usize,
                    DT_STRTAB => strtab_off = dynamic.d_un as usize,
                    DT_RELA => rela_off = dynamic.d_un as usize,
                    DT_RELASZ => rela_size = dynamic.d_un as usize,
                    DT_JMPREL => pltrel_off = dynamic.d_un as usize,
                    DT_PLTRELSZ => pltrel_size = dynamic.d_un as usize,
                    DT_PLTREL => pltrel_kind = dynamic.d_un as i64,
                    DT_NULL => break,
                    _ => {}
                }
                cur_dyn_ptr = cur_dyn_ptr.add(1);
            }
        }
        if symtab_off == 0 || strtab_off == 0 {
            return None;
        }
        // REL-format PLT tables do not occur on the supported 64-bit targets.
        if pltrel_kind != DT_RELA {
            pltrel_size = 0;
        }
        unsafe {
            Some(LoadedDynamic {
                symtab: adjust(symtab_off, base) as *const ElfSymbol,
                strtab: adjust(strtab_off, base) as *const u8,
                dynrel: rela_slice(if rela_off == 0 { 0 } else { adjust(rela_off, base) }, rela_size),
                pltrel: rela_slice(
                    if pltrel_off == 0 { 0 } else { adjust(pltrel_off, base) },
                    pltrel_size,
                ),
            })
        }
    }

    /// Gets the name of the symbol at `idx` in the dynamic symbol table.
    #[inline]
    pub(crate) fn symbol_name(&self, idx: usize) -> &'obj CStr {
        unsafe {
            let sym = &*self.symtab.add(idx);
            CStr::from_ptr(self.strtab.add(sym.st_name()).cast())
        }
    }

    /// Iterates `.rela.dyn` followed by `.rela.plt`.
    #[inline]
    pub(crate) fn relocations(&self) -> impl Iterator<Item = &'obj ElfRela> + use<'obj> {
        let (dynrel, pltrel) = (self.dynrel, self.pltrel);
        dynrel.iter().chain(pltrel.iter())
    }
}
