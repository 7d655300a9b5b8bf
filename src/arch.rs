//! Architecture-specific relocation kinds that denote GOT slots.
//!
//! A GOT slot is a word the dynamic linker fills with the address of an
//! imported symbol. Rewriting the slot redirects every call that goes
//! through it.
use elf::abi::*;

pub(crate) type Dyn = elf::dynamic::Elf64_Dyn;
pub(crate) type Rela = elf::relocation::Elf64_Rela;
pub(crate) type Sym = elf::symbol::Elf64_Sym;
pub(crate) type Phdr = libc::Elf64_Phdr;

const REL_MASK: usize = 0xFFFFFFFF;
const REL_BIT: usize = 32;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")]{
        /// PLT jump slot relocation type.
        pub(crate) const REL_JUMP_SLOT: u32 = R_X86_64_JUMP_SLOT;
        /// GOT data relocation type.
        pub(crate) const REL_GOT: u32 = R_X86_64_GLOB_DAT;
    }else if #[cfg(target_arch = "aarch64")]{
        pub(crate) const REL_JUMP_SLOT: u32 = R_AARCH64_JUMP_SLOT;
        pub(crate) const REL_GOT: u32 = R_AARCH64_GLOB_DAT;
    }else if #[cfg(target_arch = "riscv64")]{
        pub(crate) const REL_JUMP_SLOT: u32 = R_RISCV_JUMP_SLOT;
        // riscv has no GLOB_DAT; GOT data entries use the plain 64-bit kind.
        pub(crate) const REL_GOT: u32 = R_RISCV_64;
    }
}

/// Whether a relocation of this type fills a GOT slot.
#[inline]
pub(crate) fn is_got_slot(r_type: u32) -> bool {
    r_type == REL_JUMP_SLOT || r_type == REL_GOT
}

/// ELF RELA relocation entry.
#[repr(transparent)]
pub(crate) struct ElfRela {
    rela: Rela,
}

impl ElfRela {
    /// Returns the relocation type.
    #[inline]
    pub(crate) fn r_type(&self) -> u32 {
        (self.rela.r_info as usize & REL_MASK) as u32
    }

    /// Returns the symbol index.
    #[inline]
    pub(crate) fn r_symbol(&self) -> usize {
        self.rela.r_info as usize >> REL_BIT
    }

    /// Returns the relocation offset.
    #[inline]
    pub(crate) fn r_offset(&self) -> usize {
        self.rela.r_offset as usize
    }
}

/// ELF symbol table entry.
#[repr(transparent)]
pub(crate) struct ElfSymbol {
    sym: Sym,
}

impl ElfSymbol {
    /// Returns the symbol name index.
    #[inline]
    pub(crate) fn st_name(&self) -> usize {
        self.sym.st_name as usize
    }
}
