use crate::error::Result;
use crate::format::Format;
use crate::header::Header;
use crate::stream::{fixed_name, Fields};

pub const IMAGE_DOS_SIGNATURE: u16 = 0x5a4d; // "MZ"
pub const IMAGE_NT_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
pub const PE32_MAGIC: u16 = 0x10b;
pub const PE32PLUS_MAGIC: u16 = 0x20b;

pub const DOS_HEADER_SIZE: u64 = 64;
pub const E_LFANEW_OFFSET: usize = 0x3c;
pub const COFF_HEADER_SIZE: u64 = 20;
pub const SECTION_HEADER_SIZE: u64 = 40;
pub const EXPORT_DIRECTORY_SIZE: u64 = 40;
pub const COFF_SYMBOL_SIZE: u64 = 18;
pub const DATA_DIRECTORY_SIZE: u64 = 8;

/// Optional header layout for one PE address width.
pub trait PeClass {
    const FORMAT: Format;
    const MAGIC: u16;
    /// Offset of `NumberOfRvaAndSizes` inside the optional header.
    const RVA_COUNT_OFFSET: u64;
    /// Offset of the first data directory inside the optional header.
    const DATA_DIRECTORY_OFFSET: u64;
}

#[derive(Debug, Clone, Copy)]
pub struct Pe32;

#[derive(Debug, Clone, Copy)]
pub struct Pe64;

impl PeClass for Pe32 {
    const FORMAT: Format = Format::Pe32;
    const MAGIC: u16 = PE32_MAGIC;
    const RVA_COUNT_OFFSET: u64 = 92;
    const DATA_DIRECTORY_OFFSET: u64 = 96;
}

impl PeClass for Pe64 {
    const FORMAT: Format = Format::Pe64;
    const MAGIC: u16 = PE32PLUS_MAGIC;
    const RVA_COUNT_OFFSET: u64 = 108;
    const DATA_DIRECTORY_OFFSET: u64 = 112;
}

/// The two fields of the MS-DOS stub header we care about.
#[derive(Debug, Clone, Copy)]
pub struct DosHeader {
    pub e_magic: u16,
    pub e_lfanew: u32,
}

impl DosHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        let e_magic = f.u16()?;
        f.skip(E_LFANEW_OFFSET as u64 - 2);
        Ok(DosHeader {
            e_magic,
            e_lfanew: f.u32()?,
        })
    }
}

/// `IMAGE_FILE_HEADER`, the COFF header following the PE signature.
#[derive(Debug, Clone, Copy)]
pub struct CoffHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        Ok(CoffHeader {
            machine: f.u16()?,
            number_of_sections: f.u16()?,
            time_date_stamp: f.u32()?,
            pointer_to_symbol_table: f.u32()?,
            number_of_symbols: f.u32()?,
            size_of_optional_header: f.u16()?,
            characteristics: f.u16()?,
        })
    }

    /// File offset of the COFF string table, if the image has one.
    ///
    /// The string table directly follows the COFF symbol table.
    pub fn string_table_offset(&self) -> Option<u64> {
        if self.pointer_to_symbol_table == 0 {
            return None;
        }
        let symbols = u64::from(self.number_of_symbols) * COFF_SYMBOL_SIZE;
        Some(u64::from(self.pointer_to_symbol_table) + symbols)
    }
}

impl Header for CoffHeader {
    fn machine(&self) -> u32 {
        u32::from(self.machine)
    }

    fn is_64(&self) -> bool {
        // IMAGE_FILE_32BIT_MACHINE
        self.characteristics & 0x0100 == 0
    }

    fn format_name(&self) -> &'static str {
        "PE"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        Ok(DataDirectory {
            virtual_address: f.u32()?,
            size: f.u32()?,
        })
    }
}

/// `IMAGE_SECTION_HEADER`.
#[derive(Debug, Clone, Copy)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: u32,
}

impl SectionHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        let name = f.bytes::<8>()?;
        let virtual_size = f.u32()?;
        let virtual_address = f.u32()?;
        let size_of_raw_data = f.u32()?;
        let pointer_to_raw_data = f.u32()?;
        // PointerToRelocations, PointerToLinenumbers, NumberOf{Relocations,Linenumbers}
        f.skip(12);
        Ok(SectionHeader {
            name,
            virtual_size,
            virtual_address,
            size_of_raw_data,
            pointer_to_raw_data,
            characteristics: f.u32()?,
        })
    }

    /// The inline name, without NUL padding.
    pub fn short_name(&self) -> String {
        fixed_name(&self.name)
    }

    /// Offset into the COFF string table when the name is `/<decimal>`.
    pub fn long_name_offset(&self) -> Option<u64> {
        let name = self.short_name();
        let digits = name.strip_prefix('/')?;
        digits.parse().ok()
    }

    /// Extent of the section once mapped; zero `VirtualSize` falls back to
    /// the raw size, as object files leave it unset.
    pub fn mapped_size(&self) -> u32 {
        self.virtual_size.max(self.size_of_raw_data)
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        let start = u64::from(self.virtual_address);
        let end = start + u64::from(self.mapped_size());
        (start..end).contains(&u64::from(rva))
    }
}

/// `IMAGE_EXPORT_DIRECTORY`.
#[derive(Debug, Clone, Copy)]
pub struct ExportDirectory {
    pub name: u32,
    pub base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    pub address_of_functions: u32,
    pub address_of_names: u32,
    pub address_of_name_ordinals: u32,
}

impl ExportDirectory {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        // Characteristics, TimeDateStamp, MajorVersion, MinorVersion
        f.skip(12);
        Ok(ExportDirectory {
            name: f.u32()?,
            base: f.u32()?,
            number_of_functions: f.u32()?,
            number_of_names: f.u32()?,
            address_of_functions: f.u32()?,
            address_of_names: f.u32()?,
            address_of_name_ordinals: f.u32()?,
        })
    }
}
