use crate::error::Result;
use crate::format::Format;
use crate::header::Header;
use crate::stream::{fixed_name, Fields};

pub const MH_MAGIC: u32 = 0xfeed_face;
pub const MH_MAGIC_64: u32 = 0xfeed_facf;

pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_SEGMENT_64: u32 = 0x19;

pub const LOAD_COMMAND_SIZE: u64 = 8;
pub const SYMTAB_COMMAND_SIZE: u64 = 24;

pub const N_STAB: u8 = 0xe0;
pub const N_PEXT: u8 = 0x10;
pub const N_TYPE: u8 = 0x0e;
pub const N_EXT: u8 = 0x01;
pub const N_SECT: u8 = 0x0e;

/// Record sizes for one Mach-O address width.
pub trait MachClass {
    const FORMAT: Format;
    const MAGIC: u32;
    const HEADER_SIZE: u64;
    const SEGMENT_COMMAND: u32;
    const SEGMENT_SIZE: u64;
    const SECTION_SIZE: u64;
    const NLIST_SIZE: u64;

    fn wide() -> bool {
        Self::MAGIC == MH_MAGIC_64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MachO32;

#[derive(Debug, Clone, Copy)]
pub struct MachO64;

impl MachClass for MachO32 {
    const FORMAT: Format = Format::MachO32;
    const MAGIC: u32 = MH_MAGIC;
    const HEADER_SIZE: u64 = 28;
    const SEGMENT_COMMAND: u32 = LC_SEGMENT;
    const SEGMENT_SIZE: u64 = 56;
    const SECTION_SIZE: u64 = 68;
    const NLIST_SIZE: u64 = 12;
}

impl MachClass for MachO64 {
    const FORMAT: Format = Format::MachO64;
    const MAGIC: u32 = MH_MAGIC_64;
    const HEADER_SIZE: u64 = 32;
    const SEGMENT_COMMAND: u32 = LC_SEGMENT_64;
    const SEGMENT_SIZE: u64 = 72;
    const SECTION_SIZE: u64 = 80;
    const NLIST_SIZE: u64 = 16;
}

/// `mach_header` / `mach_header_64` (the 64-bit reserved word is ignored).
#[derive(Debug, Clone, Copy)]
pub struct MachHeader {
    pub magic: u32,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
}

impl MachHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        Ok(MachHeader {
            magic: f.u32()?,
            cputype: f.u32()?,
            cpusubtype: f.u32()?,
            filetype: f.u32()?,
            ncmds: f.u32()?,
            sizeofcmds: f.u32()?,
            flags: f.u32()?,
        })
    }
}

impl Header for MachHeader {
    fn machine(&self) -> u32 {
        self.cputype
    }

    fn is_64(&self) -> bool {
        self.magic == MH_MAGIC_64
    }

    fn format_name(&self) -> &'static str {
        "Mach-O"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadCommand {
    pub cmd: u32,
    pub cmdsize: u32,
}

impl LoadCommand {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        Ok(LoadCommand {
            cmd: f.u32()?,
            cmdsize: f.u32()?,
        })
    }
}

/// `segment_command` / `segment_command_64`.
#[derive(Debug, Clone)]
pub struct SegmentCommand {
    pub segname: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub nsects: u32,
}

impl SegmentCommand {
    pub fn parse<C: MachClass>(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        f.skip(LOAD_COMMAND_SIZE);
        let segname = fixed_name(&f.bytes::<16>()?);
        let vmaddr = f.word(C::wide())?;
        let vmsize = f.word(C::wide())?;
        let fileoff = f.word(C::wide())?;
        let filesize = f.word(C::wide())?;
        // maxprot, initprot
        f.skip(8);
        Ok(SegmentCommand {
            segname,
            vmaddr,
            vmsize,
            fileoff,
            filesize,
            nsects: f.u32()?,
        })
    }
}

/// `section` / `section_64`.
#[derive(Debug, Clone)]
pub struct Section {
    pub sectname: String,
    pub segname: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
}

impl Section {
    pub fn parse<C: MachClass>(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        Ok(Section {
            sectname: fixed_name(&f.bytes::<16>()?),
            segname: fixed_name(&f.bytes::<16>()?),
            addr: f.word(C::wide())?,
            size: f.word(C::wide())?,
            offset: f.u32()?,
        })
    }
}

/// `symtab_command`.
#[derive(Debug, Clone, Copy)]
pub struct SymtabCommand {
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

impl SymtabCommand {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        f.skip(LOAD_COMMAND_SIZE);
        Ok(SymtabCommand {
            symoff: f.u32()?,
            nsyms: f.u32()?,
            stroff: f.u32()?,
            strsize: f.u32()?,
        })
    }
}

/// `nlist` / `nlist_64`.
#[derive(Debug, Clone, Copy)]
pub struct Nlist {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
}

impl Nlist {
    pub fn parse<C: MachClass>(buf: &[u8]) -> Result<Self> {
        let mut f = Fields::le(buf);
        Ok(Nlist {
            n_strx: f.u32()?,
            n_type: f.u8()?,
            n_sect: f.u8()?,
            n_desc: f.u16()?,
            n_value: f.word(C::wide())?,
        })
    }

    /// External, not private-external, defined in a section, not a stab.
    pub fn is_visible(&self) -> bool {
        self.n_type & N_STAB == 0
            && self.n_type & N_EXT != 0
            && self.n_type & N_PEXT == 0
            && self.n_type & N_TYPE == N_SECT
            && self.n_sect != 0
    }
}
