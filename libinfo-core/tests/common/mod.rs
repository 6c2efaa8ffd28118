//! Builders for small synthetic ELF, PE and Mach-O images.
//!
//! Each builder lays out exactly the structures the readers look at, so the
//! tests can state the expected section and symbol lists up front.
#![allow(dead_code)]

use libinfo_core::LibraryInfo;
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;

pub fn open(bytes: Vec<u8>) -> LibraryInfo<Cursor<Vec<u8>>> {
    LibraryInfo::from_reader(Cursor::new(bytes), false).expect("fixture should be detected")
}

/// Creates a temporary file with the given content.
pub fn create_temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content).unwrap();
    temp_file
}

pub fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Byte writer with selectable endianness.
struct Out {
    buf: Vec<u8>,
    big: bool,
}

impl Out {
    fn new(big: bool) -> Self {
        Out {
            buf: Vec::new(),
            big,
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&b);
    }

    fn u32(&mut self, v: u32) {
        let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&b);
    }

    fn u64(&mut self, v: u64) {
        let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&b);
    }

    fn word(&mut self, wide: bool, v: u64) {
        if wide {
            self.u64(v);
        } else {
            self.u32(v as u32);
        }
    }

    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn name<const N: usize>(&mut self, s: &str) {
        let mut field = [0u8; N];
        field[..s.len()].copy_from_slice(s.as_bytes());
        self.buf.extend_from_slice(&field);
    }

    fn align(&mut self, to: usize) {
        while self.buf.len() % to != 0 {
            self.buf.push(0);
        }
    }

    fn pos(&self) -> u64 {
        self.buf.len() as u64
    }
}

/// Appends `name` to a string blob and returns its offset.
fn intern(blob: &mut Vec<u8>, name: &str) -> u32 {
    let at = blob.len() as u32;
    blob.extend_from_slice(name.as_bytes());
    blob.push(0);
    at
}

// ---------------------------------------------------------------------------
// ELF

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STB_WEAK: u8 = 2;
pub const STV_DEFAULT: u8 = 0;
pub const STV_INTERNAL: u8 = 1;
pub const STV_HIDDEN: u8 = 2;
pub const STV_PROTECTED: u8 = 3;
const STT_FUNC: u8 = 2;

#[derive(Debug, Clone)]
pub struct ElfSym {
    pub name: String,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
    pub size: u64,
}

impl ElfSym {
    pub fn new(name: &str, binding: u8, visibility: u8, shndx: u16, size: u64) -> Self {
        ElfSym {
            name: name.to_string(),
            info: (binding << 4) | STT_FUNC,
            other: visibility,
            shndx,
            size,
        }
    }

    /// A global, default-visibility, sized symbol.
    pub fn exported(name: &str, shndx: u16) -> Self {
        Self::new(name, STB_GLOBAL, STV_DEFAULT, shndx, 16)
    }

    pub fn is_visible(&self) -> bool {
        self.other & 3 == STV_DEFAULT && self.info >> 4 != STB_LOCAL && self.size != 0
    }
}

#[derive(Debug, Clone)]
pub struct ElfBuilder {
    pub wide: bool,
    pub big_endian: bool,
    pub null_section: bool,
    pub sections: Vec<(String, Vec<u8>)>,
    pub symbols: Option<Vec<ElfSym>>,
}

struct ElfSection {
    name: String,
    sh_type: u32,
    data: Vec<u8>,
    link: u32,
    entsize: u64,
}

impl ElfBuilder {
    pub fn new(wide: bool) -> Self {
        ElfBuilder {
            wide,
            big_endian: false,
            null_section: true,
            sections: Vec::new(),
            symbols: None,
        }
    }

    pub fn section(mut self, name: &str, data: &[u8]) -> Self {
        self.sections.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn symbols(mut self, symbols: Vec<ElfSym>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn without_null_section(mut self) -> Self {
        self.null_section = false;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    /// Section names in the order `build` writes them.
    pub fn section_names(&self) -> Vec<String> {
        self.layout().into_iter().map(|s| s.name).collect()
    }

    /// Section index of the first section called `name`.
    pub fn index_of(&self, name: &str) -> u16 {
        self.section_names()
            .iter()
            .position(|n| n == name)
            .expect("no such section") as u16
    }

    /// Names of the symbols the reader should report.
    pub fn visible_symbols(&self) -> Vec<String> {
        self.symbols
            .iter()
            .flatten()
            .filter(|s| s.is_visible() && !s.name.is_empty())
            .map(|s| s.name.clone())
            .collect()
    }

    fn sym_size(&self) -> u64 {
        if self.wide {
            24
        } else {
            16
        }
    }

    fn layout(&self) -> Vec<ElfSection> {
        let mut out = Vec::new();
        if self.null_section {
            out.push(ElfSection {
                name: String::new(),
                sh_type: 0,
                data: Vec::new(),
                link: 0,
                entsize: 0,
            });
        }
        for (name, data) in &self.sections {
            out.push(ElfSection {
                name: name.clone(),
                sh_type: 1,
                data: data.clone(),
                link: 0,
                entsize: 0,
            });
        }
        if let Some(symbols) = &self.symbols {
            let mut names = vec![0u8];
            let mut table = Out::new(self.big_endian);
            // The reserved null symbol.
            table.bytes(&vec![0u8; self.sym_size() as usize]);
            for sym in symbols {
                let st_name = if sym.name.is_empty() {
                    0
                } else {
                    intern(&mut names, &sym.name)
                };
                table.u32(st_name);
                if self.wide {
                    table.u8(sym.info);
                    table.u8(sym.other);
                    table.u16(sym.shndx);
                    table.u64(0x1000);
                    table.u64(sym.size);
                } else {
                    table.u32(0x1000);
                    table.u32(sym.size as u32);
                    table.u8(sym.info);
                    table.u8(sym.other);
                    table.u16(sym.shndx);
                }
            }
            let strtab_index = out.len() as u32 + 1;
            out.push(ElfSection {
                name: ".symtab".into(),
                sh_type: 2,
                data: table.buf,
                link: strtab_index,
                entsize: self.sym_size(),
            });
            out.push(ElfSection {
                name: ".strtab".into(),
                sh_type: 3,
                data: names,
                link: 0,
                entsize: 0,
            });
        }
        out.push(ElfSection {
            name: ".shstrtab".into(),
            sh_type: 3,
            data: Vec::new(),
            link: 0,
            entsize: 0,
        });
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let wide = self.wide;
        let mut sections = self.layout();

        let mut shstrtab = vec![0u8];
        let name_offsets: Vec<u32> = sections
            .iter()
            .map(|s| {
                if s.name.is_empty() {
                    0
                } else {
                    intern(&mut shstrtab, &s.name)
                }
            })
            .collect();
        let shstrndx = sections.len() - 1;
        sections[shstrndx].data = shstrtab;

        let (ehsize, shentsize) = if wide { (64u16, 64u16) } else { (52, 40) };
        let mut out = Out::new(self.big_endian);
        out.bytes(&[0u8; 64][..ehsize as usize]);

        let mut placed = Vec::new();
        for s in &sections {
            if s.sh_type == 0 {
                placed.push((0, 0));
                continue;
            }
            out.align(8);
            placed.push((out.pos(), s.data.len() as u64));
            out.bytes(&s.data);
        }
        out.align(8);
        let shoff = out.pos();

        for (i, s) in sections.iter().enumerate() {
            let (offset, size) = placed[i];
            out.u32(name_offsets[i]);
            out.u32(s.sh_type);
            out.word(wide, 0); // flags
            out.word(wide, 0); // addr
            out.word(wide, offset);
            out.word(wide, size);
            out.u32(s.link);
            out.u32(if s.sh_type == 2 { 1 } else { 0 });
            out.word(wide, if s.sh_type == 0 { 0 } else { 1 });
            out.word(wide, s.entsize);
        }

        let mut header = Out::new(self.big_endian);
        header.bytes(&[0x7f, b'E', b'L', b'F']);
        header.u8(if wide { 2 } else { 1 });
        header.u8(if self.big_endian { 2 } else { 1 });
        header.u8(1);
        header.bytes(&[0u8; 9]);
        header.u16(3); // ET_DYN
        header.u16(if wide { 62 } else { 3 });
        header.u32(1);
        header.word(wide, 0); // entry
        header.word(wide, 0); // phoff
        header.word(wide, shoff);
        header.u32(0);
        header.u16(ehsize);
        header.u16(0);
        header.u16(0);
        header.u16(shentsize);
        header.u16(sections.len() as u16);
        header.u16(shstrndx as u16);
        assert_eq!(header.buf.len(), ehsize as usize);

        out.buf[..ehsize as usize].copy_from_slice(&header.buf);
        out.buf
    }

    /// Offset of the section header table in the built image.
    pub fn section_table_offset(&self) -> u64 {
        let image = self.build();
        let at = if self.wide { 40 } else { 32 };
        let raw = &image[at..at + if self.wide { 8 } else { 4 }];
        let mut value = 0u64;
        for (i, b) in raw.iter().enumerate() {
            let shift = if self.big_endian { (raw.len() - 1 - i) * 8 } else { i * 8 };
            value |= u64::from(*b) << shift;
        }
        value
    }
}

// ---------------------------------------------------------------------------
// PE

#[derive(Debug, Clone)]
pub struct PeExport {
    pub name: String,
    pub section: usize,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct PeBuilder {
    pub wide: bool,
    pub sections: Vec<(String, u32)>,
    pub exports: Vec<PeExport>,
}

const PE_FILE_ALIGN: usize = 0x200;

impl PeBuilder {
    pub fn new(wide: bool) -> Self {
        PeBuilder {
            wide,
            sections: Vec::new(),
            exports: Vec::new(),
        }
    }

    pub fn section(mut self, name: &str, size: u32) -> Self {
        self.sections.push((name.to_string(), size));
        self
    }

    /// Exports `name` at `offset` inside the section at `section`.
    pub fn export(mut self, name: &str, section: usize, offset: u32) -> Self {
        self.exports.push(PeExport {
            name: name.to_string(),
            section,
            offset,
        });
        self
    }

    fn va(index: usize) -> u32 {
        0x1000 * (index as u32 + 1)
    }

    /// Section names in table order, including the generated `.edata`.
    pub fn section_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sections.iter().map(|(n, _)| n.clone()).collect();
        if !self.exports.is_empty() {
            names.push(".edata".into());
        }
        names
    }

    fn export_section(&self, va: u32) -> Vec<u8> {
        let n = self.exports.len() as u32;
        let functions = va + 40;
        let names = functions + 4 * n;
        let ordinals = names + 4 * n;
        let strings = ordinals + 2 * n;

        let mut blob = Vec::new();
        let dll_name = strings + intern(&mut blob, "fixture.dll");
        let name_rvas: Vec<u32> = self
            .exports
            .iter()
            .map(|e| strings + intern(&mut blob, &e.name))
            .collect();

        let mut out = Out::new(false);
        out.u32(0);
        out.u32(0);
        out.u16(0);
        out.u16(0);
        out.u32(dll_name);
        out.u32(1);
        out.u32(n);
        out.u32(n);
        out.u32(functions);
        out.u32(names);
        out.u32(ordinals);
        for e in &self.exports {
            out.u32(Self::va(e.section) + e.offset);
        }
        for rva in &name_rvas {
            out.u32(*rva);
        }
        for i in 0..n {
            out.u16(i as u16);
        }
        out.bytes(&blob);
        out.buf
    }

    pub fn build(&self) -> Vec<u8> {
        let opt_size: u16 = if self.wide { 240 } else { 224 };
        let mut bodies: Vec<(String, Vec<u8>, u32)> = self
            .sections
            .iter()
            .map(|(name, size)| (name.clone(), vec![0xccu8; *size as usize], *size))
            .collect();
        let export_va = Self::va(bodies.len());
        let export_dir = if self.exports.is_empty() {
            None
        } else {
            let data = self.export_section(export_va);
            let size = data.len() as u32;
            bodies.push((".edata".into(), data, size));
            Some((export_va, size))
        };

        let mut coff_strings = 4u32.to_le_bytes().to_vec();
        let short_names: Vec<String> = bodies
            .iter()
            .map(|(name, _, _)| {
                if name.len() > 8 {
                    format!("/{}", intern(&mut coff_strings, name))
                } else {
                    name.clone()
                }
            })
            .collect();
        let strings_len = coff_strings.len() as u32;
        coff_strings[..4].copy_from_slice(&strings_len.to_le_bytes());

        let headers_end = 0x40 + 24 + opt_size as usize + 40 * bodies.len();
        let mut raw_offset = headers_end.div_ceil(PE_FILE_ALIGN) * PE_FILE_ALIGN;
        let mut placements = Vec::new();
        for (_, data, _) in &bodies {
            let raw_size = data.len().div_ceil(PE_FILE_ALIGN) * PE_FILE_ALIGN;
            placements.push((raw_offset as u32, raw_size as u32));
            raw_offset += raw_size;
        }
        let has_long_names = coff_strings.len() > 4;
        let strings_offset = if has_long_names { raw_offset as u32 } else { 0 };

        let mut out = Out::new(false);
        // DOS header
        out.bytes(b"MZ");
        out.bytes(&[0u8; 0x3a]);
        out.u32(0x40);
        // PE signature and COFF header
        out.bytes(b"PE\0\0");
        out.u16(if self.wide { 0x8664 } else { 0x14c });
        out.u16(bodies.len() as u16);
        out.u32(0);
        out.u32(strings_offset);
        out.u32(0);
        out.u16(opt_size);
        out.u16(if self.wide { 0x2022 } else { 0x2102 });
        // Optional header
        let opt_start = out.buf.len();
        out.bytes(&vec![0u8; opt_size as usize]);
        let magic: u16 = if self.wide { 0x20b } else { 0x10b };
        out.buf[opt_start..opt_start + 2].copy_from_slice(&magic.to_le_bytes());
        let (count_at, dir_at) = if self.wide { (108, 112) } else { (92, 96) };
        out.buf[opt_start + count_at..opt_start + count_at + 4]
            .copy_from_slice(&16u32.to_le_bytes());
        if let Some((va, size)) = export_dir {
            out.buf[opt_start + dir_at..opt_start + dir_at + 4].copy_from_slice(&va.to_le_bytes());
            out.buf[opt_start + dir_at + 4..opt_start + dir_at + 8]
                .copy_from_slice(&size.to_le_bytes());
        }
        // Section table
        for (i, (_, _, vsize)) in bodies.iter().enumerate() {
            let (offset, raw_size) = placements[i];
            out.name::<8>(&short_names[i]);
            out.u32(*vsize);
            out.u32(Self::va(i));
            out.u32(raw_size);
            out.u32(offset);
            out.u32(0);
            out.u32(0);
            out.u16(0);
            out.u16(0);
            out.u32(0x6000_0020);
        }
        // Section bodies
        for (i, (_, data, _)) in bodies.iter().enumerate() {
            let (offset, raw_size) = placements[i];
            out.buf.resize(offset as usize, 0);
            out.bytes(data);
            out.buf.resize((offset + raw_size) as usize, 0);
        }
        if has_long_names {
            out.bytes(&coff_strings);
        }
        out.buf
    }
}

// ---------------------------------------------------------------------------
// Mach-O

pub const N_EXT: u8 = 0x01;
pub const N_SECT: u8 = 0x0e;
pub const N_PEXT: u8 = 0x10;
pub const N_UNDF: u8 = 0x00;

#[derive(Debug, Clone)]
pub struct MachSym {
    pub name: String,
    pub n_type: u8,
    pub n_sect: u8,
}

impl MachSym {
    pub fn new(name: &str, n_type: u8, n_sect: u8) -> Self {
        MachSym {
            name: name.to_string(),
            n_type,
            n_sect,
        }
    }

    pub fn exported(name: &str, n_sect: u8) -> Self {
        Self::new(name, N_SECT | N_EXT, n_sect)
    }
}

#[derive(Debug, Clone)]
pub struct MachOBuilder {
    pub wide: bool,
    pub segments: Vec<(String, Vec<String>)>,
    pub symbols: Option<Vec<MachSym>>,
}

impl MachOBuilder {
    pub fn new(wide: bool) -> Self {
        MachOBuilder {
            wide,
            segments: Vec::new(),
            symbols: None,
        }
    }

    pub fn segment(mut self, name: &str, sections: &[&str]) -> Self {
        self.segments
            .push((name.to_string(), sections.iter().map(|s| s.to_string()).collect()));
        self
    }

    pub fn symbols(mut self, symbols: Vec<MachSym>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn section_names(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|(_, sections)| sections.clone())
            .collect()
    }

    pub fn build(&self) -> Vec<u8> {
        let wide = self.wide;
        let header_size = if wide { 32 } else { 28 };
        let (segment_size, section_size, nlist_size) =
            if wide { (72u32, 80u32, 16u32) } else { (56, 68, 12) };

        let mut cmds = Out::new(false);
        let mut ncmds = 0u32;
        for (segname, sections) in &self.segments {
            ncmds += 1;
            cmds.u32(if wide { 0x19 } else { 0x1 });
            cmds.u32(segment_size + section_size * sections.len() as u32);
            cmds.name::<16>(segname);
            cmds.word(wide, 0x1000); // vmaddr
            cmds.word(wide, 0x1000); // vmsize
            cmds.word(wide, 0); // fileoff
            cmds.word(wide, 0); // filesize
            cmds.u32(7);
            cmds.u32(5);
            cmds.u32(sections.len() as u32);
            cmds.u32(0);
            for sectname in sections {
                cmds.name::<16>(sectname);
                cmds.name::<16>(segname);
                cmds.word(wide, 0x1000);
                cmds.word(wide, 0);
                cmds.u32(0); // offset
                cmds.u32(0); // align
                cmds.u32(0); // reloff
                cmds.u32(0); // nreloc
                cmds.u32(0); // flags
                cmds.u32(0);
                cmds.u32(0);
                if wide {
                    cmds.u32(0);
                }
            }
        }

        let symtab_cmd_at = cmds.buf.len();
        if self.symbols.is_some() {
            ncmds += 1;
            cmds.u32(0x2);
            cmds.u32(24);
            cmds.bytes(&[0u8; 16]); // patched below
        }

        let sizeofcmds = cmds.buf.len() as u32;
        let mut out = Out::new(false);
        out.u32(if wide { 0xfeed_facf } else { 0xfeed_face });
        out.u32(if wide { 0x0100_0007 } else { 7 });
        out.u32(3);
        out.u32(6); // MH_DYLIB
        out.u32(ncmds);
        out.u32(sizeofcmds);
        out.u32(0);
        if wide {
            out.u32(0);
        }
        assert_eq!(out.buf.len(), header_size);
        out.bytes(&cmds.buf);

        if let Some(symbols) = &self.symbols {
            out.align(8);
            let symoff = out.pos() as u32;
            let mut strings = b" \0".to_vec();
            for sym in symbols {
                let strx = if sym.name.is_empty() {
                    0
                } else {
                    intern(&mut strings, &sym.name)
                };
                out.u32(strx);
                out.u8(sym.n_type);
                out.u8(sym.n_sect);
                out.u16(0);
                out.word(wide, 0x1000);
            }
            let stroff = out.pos() as u32;
            out.bytes(&strings);

            let at = header_size + symtab_cmd_at + 8;
            let fields = [symoff, symbols.len() as u32, stroff, strings.len() as u32];
            for (i, v) in fields.iter().enumerate() {
                out.buf[at + i * 4..at + i * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
            debug_assert_eq!(nlist_size as usize * symbols.len(), (stroff - symoff) as usize);
        }
        out.buf
    }
}
