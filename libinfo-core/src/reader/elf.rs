use crate::error::{Error, Result};
use crate::format::Format;
use crate::header::elf::{
    Elf32, Elf64, ElfClass, ElfHeader, SectionHeader, Symbol, ELFMAG, SHN_XINDEX, SHT_STRTAB,
    SHT_SYMTAB,
};
use crate::reader::{find_section, log_header, table_size, BinaryReader};
use crate::stream::{Endian, Stream};
use crate::strtab::StringTable;
use std::io::{Read, Seek};
use std::marker::PhantomData;

/// ELF reader, parametrised by address width.
#[derive(Debug, Clone, Copy)]
pub struct ElfReader<C>(PhantomData<C>);

pub type Elf32Reader = ElfReader<Elf32>;
pub type Elf64Reader = ElfReader<Elf64>;

/// Where the section table is and how to walk it.
#[derive(Debug)]
struct Layout {
    endian: Endian,
    offset: u64,
    count: u64,
    stride: u64,
    names_index: u64,
}

impl<C: ElfClass> ElfReader<C> {
    fn layout<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Layout> {
        let raw = stream.read_at(0, C::EHDR_SIZE, "ELF header")?;
        let header = ElfHeader::parse::<C>(&raw)?;
        log_header(&header);

        let endian = header.endian();
        let stride = match u64::from(header.e_shentsize) {
            0 => C::SHDR_SIZE,
            n if n < C::SHDR_SIZE => {
                return Err(Error::malformed(format!(
                    "section header entry size {n} below {}",
                    C::SHDR_SIZE
                )))
            }
            n => n,
        };

        let mut layout = Layout {
            endian,
            offset: header.e_shoff,
            count: u64::from(header.e_shnum),
            stride,
            names_index: u64::from(header.e_shstrndx),
        };
        if header.e_shoff == 0 {
            layout.count = 0;
            return Ok(layout);
        }

        // Extended numbering keeps the real values in section 0.
        if header.e_shnum == 0 || header.e_shstrndx == SHN_XINDEX {
            let raw = stream.read_at(header.e_shoff, C::SHDR_SIZE, "section header 0")?;
            let first = SectionHeader::parse::<C>(&raw, endian)?;
            if header.e_shnum == 0 {
                layout.count = first.sh_size;
            }
            if header.e_shstrndx == SHN_XINDEX {
                layout.names_index = u64::from(first.sh_link);
            }
        }

        log::debug!(
            "section table at {:#x}: {} entries of {} bytes",
            layout.offset,
            layout.count,
            layout.stride
        );
        Ok(layout)
    }

    fn section_headers<R: Read + Seek>(
        stream: &mut Stream<R>,
        layout: &Layout,
    ) -> Result<Vec<SectionHeader>> {
        if layout.count == 0 {
            return Ok(Vec::new());
        }
        let size = table_size(layout.count, layout.stride, "section header table")?;
        let table = stream.read_at(layout.offset, size, "section header table")?;

        table
            .chunks_exact(layout.stride as usize)
            .map(|entry| SectionHeader::parse::<C>(&entry[..C::SHDR_SIZE as usize], layout.endian))
            .collect()
    }

    fn section_names<R: Read + Seek>(
        stream: &mut Stream<R>,
        layout: &Layout,
        headers: &[SectionHeader],
    ) -> Result<Vec<String>> {
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        // SHN_UNDEF: the file has no section name table.
        if layout.names_index == 0 && headers[0].sh_type == 0 {
            return Ok(vec![String::new(); headers.len()]);
        }
        let names = usize::try_from(layout.names_index)
            .ok()
            .and_then(|index| headers.get(index))
            .ok_or_else(|| {
                Error::malformed(format!(
                    "section name table index {} out of {} sections",
                    layout.names_index,
                    headers.len()
                ))
            })?;
        let table = StringTable::new(stream.read_at(
            names.sh_offset,
            names.sh_size,
            "section name table",
        )?);

        headers
            .iter()
            .map(|sh| table.get_at(u64::from(sh.sh_name)))
            .collect()
    }

    fn visible_symbols<R: Read + Seek>(
        stream: &mut Stream<R>,
        layout: &Layout,
        headers: &[SectionHeader],
        in_section: Option<usize>,
    ) -> Result<Vec<String>> {
        let Some(symtab) = headers.iter().find(|sh| sh.sh_type == SHT_SYMTAB) else {
            log::warn!("no symbol table (stripped binary)");
            return Ok(Vec::new());
        };
        let strtab = headers
            .get(symtab.sh_link as usize)
            .filter(|sh| sh.sh_type == SHT_STRTAB)
            .ok_or_else(|| {
                Error::malformed(format!(
                    "symbol table links to section {}, which is not a string table",
                    symtab.sh_link
                ))
            })?;

        // A trailing partial record is ignored.
        let count = symtab.sh_size / C::SYM_SIZE;
        let records = stream.read_at(symtab.sh_offset, count * C::SYM_SIZE, "symbol table")?;
        let names = StringTable::new(stream.read_at(
            strtab.sh_offset,
            strtab.sh_size,
            "symbol string table",
        )?);
        log::debug!("{count} symbol records, {} bytes of names", names.len());

        let mut visible = Vec::new();
        for record in records.chunks_exact(C::SYM_SIZE as usize) {
            let sym = Symbol::parse::<C>(record, layout.endian)?;
            if !sym.is_visible() {
                continue;
            }
            if in_section.is_some_and(|index| usize::from(sym.st_shndx) != index) {
                continue;
            }
            let name = names.get_at(u64::from(sym.st_name))?;
            if !name.is_empty() {
                visible.push(name);
            }
        }
        Ok(visible)
    }
}

impl<C: ElfClass> BinaryReader for ElfReader<C> {
    const FORMAT: Format = C::FORMAT;

    fn detect<R: Read + Seek>(stream: &mut Stream<R>) -> bool {
        match stream.probe(ELFMAG.len() + 1) {
            Some(ident) => ident[..4] == ELFMAG && ident[4] == C::CLASS,
            None => false,
        }
    }

    fn sections<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Vec<String>> {
        let layout = Self::layout(stream)?;
        let headers = Self::section_headers(stream, &layout)?;
        Self::section_names(stream, &layout, &headers)
    }

    fn symbols<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Vec<String>> {
        let layout = Self::layout(stream)?;
        let headers = Self::section_headers(stream, &layout)?;
        Self::visible_symbols(stream, &layout, &headers, None)
    }

    fn section_symbols<R: Read + Seek>(
        stream: &mut Stream<R>,
        section: &str,
    ) -> Result<Vec<String>> {
        let layout = Self::layout(stream)?;
        let headers = Self::section_headers(stream, &layout)?;
        let names = Self::section_names(stream, &layout, &headers)?;
        let index = find_section(&names, section)?;
        Self::visible_symbols(stream, &layout, &headers, Some(index))
    }
}
