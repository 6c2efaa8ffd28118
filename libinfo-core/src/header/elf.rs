use crate::error::{Error, Result};
use crate::format::Format;
use crate::header::Header;
use crate::stream::{Endian, Fields};

pub const ELFMAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const EI_CLASS: usize = 4;
pub const EI_DATA: usize = 5;
pub const ELFCLASS32: u8 = 1;
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const ELFDATA2MSB: u8 = 2;

pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHN_XINDEX: u16 = 0xffff;

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STB_WEAK: u8 = 2;

pub const STV_DEFAULT: u8 = 0;
pub const STV_INTERNAL: u8 = 1;
pub const STV_HIDDEN: u8 = 2;
pub const STV_PROTECTED: u8 = 3;

/// Record sizes and the class byte for one ELF address width.
pub trait ElfClass {
    const FORMAT: Format;
    const CLASS: u8;
    const EHDR_SIZE: u64;
    const SHDR_SIZE: u64;
    const SYM_SIZE: u64;

    fn wide() -> bool {
        Self::CLASS == ELFCLASS64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Elf32;

#[derive(Debug, Clone, Copy)]
pub struct Elf64;

impl ElfClass for Elf32 {
    const FORMAT: Format = Format::Elf32;
    const CLASS: u8 = ELFCLASS32;
    const EHDR_SIZE: u64 = 52;
    const SHDR_SIZE: u64 = 40;
    const SYM_SIZE: u64 = 16;
}

impl ElfClass for Elf64 {
    const FORMAT: Format = Format::Elf64;
    const CLASS: u8 = ELFCLASS64;
    const EHDR_SIZE: u64 = 64;
    const SHDR_SIZE: u64 = 64;
    const SYM_SIZE: u64 = 24;
}

/// Represents the ELF (Executable and Linkable Format) file header.
///
/// This corresponds to `Elf32_Ehdr` / `Elf64_Ehdr`; address-sized fields are
/// widened to `u64` so both classes share one type.
///
/// Reference: [ELF Specification v1.2](https://refspecs.linuxfoundation.org/elf/elf.pdf)
#[derive(Debug, Clone, Copy)]
pub struct ElfHeader {
    /// ELF identification bytes (magic number and other information).
    ///
    /// The first 4 bytes should be `0x7F`, `'E'`, `'L'`, `'F'`.
    /// Remaining bytes encode class (32/64-bit), endianness, and version.
    pub e_ident: [u8; 16],

    /// Object file type (e.g. relocatable, executable, shared, core).
    pub e_type: u16,

    /// Target architecture (e.g., x86_64, ARM).
    ///
    /// Common values:
    /// - `EM_X86_64` (62)
    /// - `EM_AARCH64` (183)
    pub e_machine: u16,

    /// ELF version (usually set to `EV_CURRENT` = 1).
    pub e_version: u32,

    /// Virtual address of the program entry point.
    pub e_entry: u64,

    /// File offset of the program header table.
    pub e_phoff: u64,

    /// File offset of the section header table.
    ///
    /// Zero means the file carries no section headers.
    pub e_shoff: u64,

    /// Processor-specific flags.
    pub e_flags: u32,

    /// Size of this ELF header.
    pub e_ehsize: u16,

    /// Size of one entry in the program header table.
    pub e_phentsize: u16,

    /// Number of entries in the program header table.
    pub e_phnum: u16,

    /// Size of one entry in the section header table.
    pub e_shentsize: u16,

    /// Number of entries in the section header table.
    ///
    /// Zero with a nonzero `e_shoff` means the real count lives in the
    /// `sh_size` of section 0.
    pub e_shnum: u16,

    /// Index of the section header string table.
    ///
    /// This section contains the names of all other sections. `SHN_XINDEX`
    /// means the real index lives in the `sh_link` of section 0.
    pub e_shstrndx: u16,
}

impl ElfHeader {
    pub fn parse<C: ElfClass>(buf: &[u8]) -> Result<Self> {
        let mut ident = Fields::le(buf);
        let e_ident: [u8; 16] = ident.bytes()?;
        let endian = endian_of(&e_ident)?;

        let mut f = Fields::new(buf, endian);
        f.skip(16);
        Ok(ElfHeader {
            e_ident,
            e_type: f.u16()?,
            e_machine: f.u16()?,
            e_version: f.u32()?,
            e_entry: f.word(C::wide())?,
            e_phoff: f.word(C::wide())?,
            e_shoff: f.word(C::wide())?,
            e_flags: f.u32()?,
            e_ehsize: f.u16()?,
            e_phentsize: f.u16()?,
            e_phnum: f.u16()?,
            e_shentsize: f.u16()?,
            e_shnum: f.u16()?,
            e_shstrndx: f.u16()?,
        })
    }

    pub fn endian(&self) -> Endian {
        // Validated in `parse`.
        if self.e_ident[EI_DATA] == ELFDATA2MSB {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

fn endian_of(ident: &[u8; 16]) -> Result<Endian> {
    match ident[EI_DATA] {
        ELFDATA2LSB => Ok(Endian::Little),
        ELFDATA2MSB => Ok(Endian::Big),
        other => Err(Error::malformed(format!(
            "unknown ELF data encoding {other}"
        ))),
    }
}

impl Header for ElfHeader {
    fn machine(&self) -> u32 {
        u32::from(self.e_machine)
    }

    fn is_64(&self) -> bool {
        self.e_ident[EI_CLASS] == ELFCLASS64
    }

    fn format_name(&self) -> &'static str {
        "ELF"
    }
}

/// One entry of the section header table (`Elf*_Shdr`).
#[derive(Debug, Clone, Copy)]
pub struct SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

impl SectionHeader {
    pub fn parse<C: ElfClass>(buf: &[u8], endian: Endian) -> Result<Self> {
        let mut f = Fields::new(buf, endian);
        Ok(SectionHeader {
            sh_name: f.u32()?,
            sh_type: f.u32()?,
            sh_flags: f.word(C::wide())?,
            sh_addr: f.word(C::wide())?,
            sh_offset: f.word(C::wide())?,
            sh_size: f.word(C::wide())?,
            sh_link: f.u32()?,
            sh_info: f.u32()?,
            sh_addralign: f.word(C::wide())?,
            sh_entsize: f.word(C::wide())?,
        })
    }
}

/// One symbol table record.
///
/// ELF32 and ELF64 order the fields differently; both decode into this.
#[derive(Debug, Clone, Copy)]
pub struct Symbol {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

impl Symbol {
    pub fn parse<C: ElfClass>(buf: &[u8], endian: Endian) -> Result<Self> {
        let mut f = Fields::new(buf, endian);
        if C::wide() {
            Ok(Symbol {
                st_name: f.u32()?,
                st_info: f.u8()?,
                st_other: f.u8()?,
                st_shndx: f.u16()?,
                st_value: f.u64()?,
                st_size: f.u64()?,
            })
        } else {
            let st_name = f.u32()?;
            let st_value = u64::from(f.u32()?);
            let st_size = u64::from(f.u32()?);
            Ok(Symbol {
                st_name,
                st_value,
                st_size,
                st_info: f.u8()?,
                st_other: f.u8()?,
                st_shndx: f.u16()?,
            })
        }
    }

    pub fn binding(&self) -> u8 {
        self.st_info >> 4
    }

    pub fn visibility(&self) -> u8 {
        self.st_other & 0x3
    }

    /// Default visibility, non-local binding and a nonzero size.
    ///
    /// The size check also drops the zero-sized aliases some linkers emit
    /// for exported data.
    pub fn is_visible(&self) -> bool {
        self.visibility() == STV_DEFAULT && self.binding() != STB_LOCAL && self.st_size != 0
    }
}
