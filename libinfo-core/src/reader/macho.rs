use crate::error::{Error, Result};
use crate::format::Format;
use crate::header::macho::{
    LoadCommand, MachClass, MachHeader, MachO32, MachO64, Nlist, Section, SegmentCommand,
    SymtabCommand, LC_SYMTAB, LOAD_COMMAND_SIZE, SYMTAB_COMMAND_SIZE,
};
use crate::reader::{find_section, log_header, table_size, BinaryReader};
use crate::stream::{Fields, Stream};
use crate::strtab::StringTable;
use std::io::{Read, Seek};
use std::marker::PhantomData;

/// Thin little-endian Mach-O reader, parametrised by address width.
#[derive(Debug, Clone, Copy)]
pub struct MachOReader<C>(PhantomData<C>);

pub type MachO32Reader = MachOReader<MachO32>;
pub type MachO64Reader = MachOReader<MachO64>;

/// Header plus the raw load command region that follows it.
struct Commands {
    header: MachHeader,
    region: Vec<u8>,
}

impl Commands {
    /// Splits the region into `(command, bytes)` pairs.
    fn iter(&self) -> Result<Vec<(LoadCommand, &[u8])>> {
        let mut commands = Vec::new();
        let mut off = 0usize;
        for i in 0..self.header.ncmds {
            let rest = &self.region[off.min(self.region.len())..];
            if (rest.len() as u64) < LOAD_COMMAND_SIZE {
                return Err(Error::malformed(format!(
                    "load command {i} starts past the end of the command region"
                )));
            }
            let lc = LoadCommand::parse(rest)?;
            let size = lc.cmdsize as usize;
            if (size as u64) < LOAD_COMMAND_SIZE || size > rest.len() {
                return Err(Error::malformed(format!(
                    "load command {i} has invalid size {:#x}",
                    lc.cmdsize
                )));
            }
            commands.push((lc, &rest[..size]));
            off += size;
        }
        Ok(commands)
    }
}

impl<C: MachClass> MachOReader<C> {
    fn commands<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Commands> {
        let raw = stream.read_at(0, C::HEADER_SIZE, "Mach-O header")?;
        let header = MachHeader::parse(&raw)?;
        log_header(&header);
        let region = stream.read_at(
            C::HEADER_SIZE,
            u64::from(header.sizeofcmds),
            "load commands",
        )?;
        Ok(Commands { header, region })
    }

    fn section_headers(commands: &Commands) -> Result<Vec<Section>> {
        let mut sections = Vec::new();
        for (lc, bytes) in commands.iter()? {
            if lc.cmd != C::SEGMENT_COMMAND {
                continue;
            }
            let segment = SegmentCommand::parse::<C>(bytes)?;
            let table = table_size(u64::from(segment.nsects), C::SECTION_SIZE, "sections")?;
            let needed = C::SEGMENT_SIZE + table;
            if needed > bytes.len() as u64 {
                return Err(Error::malformed(format!(
                    "segment {} declares {} sections that do not fit its command",
                    segment.segname, segment.nsects
                )));
            }
            log::debug!("segment {} with {} sections", segment.segname, segment.nsects);
            for entry in bytes[C::SEGMENT_SIZE as usize..needed as usize]
                .chunks_exact(C::SECTION_SIZE as usize)
            {
                sections.push(Section::parse::<C>(entry)?);
            }
        }
        Ok(sections)
    }

    fn symtab(commands: &Commands) -> Result<Option<SymtabCommand>> {
        for (lc, bytes) in commands.iter()? {
            if lc.cmd != LC_SYMTAB {
                continue;
            }
            if (bytes.len() as u64) < SYMTAB_COMMAND_SIZE {
                return Err(Error::malformed("LC_SYMTAB command too short"));
            }
            return SymtabCommand::parse(bytes).map(Some);
        }
        Ok(None)
    }

    /// Visible symbol names; `in_section` is a 1-based section ordinal.
    fn visible_symbols<R: Read + Seek>(
        stream: &mut Stream<R>,
        commands: &Commands,
        in_section: Option<usize>,
    ) -> Result<Vec<String>> {
        let Some(symtab) = Self::symtab(commands)? else {
            log::warn!("no LC_SYMTAB command");
            return Ok(Vec::new());
        };
        let size = table_size(u64::from(symtab.nsyms), C::NLIST_SIZE, "symbol table")?;
        let records = stream.read_at(u64::from(symtab.symoff), size, "symbol table")?;
        let names = StringTable::new(stream.read_at(
            u64::from(symtab.stroff),
            u64::from(symtab.strsize),
            "string table",
        )?);

        let mut visible = Vec::new();
        for record in records.chunks_exact(C::NLIST_SIZE as usize) {
            let sym = Nlist::parse::<C>(record)?;
            if sym.n_strx == 0 || !sym.is_visible() {
                continue;
            }
            if in_section.is_some_and(|ordinal| usize::from(sym.n_sect) != ordinal) {
                continue;
            }
            let name = names.get_at(u64::from(sym.n_strx))?;
            // C symbols carry a leading underscore that dlsym() adds back.
            let name = name.strip_prefix('_').unwrap_or(&name);
            if !name.is_empty() {
                visible.push(name.to_string());
            }
        }
        Ok(visible)
    }
}

impl<C: MachClass> BinaryReader for MachOReader<C> {
    const FORMAT: Format = C::FORMAT;

    fn detect<R: Read + Seek>(stream: &mut Stream<R>) -> bool {
        stream
            .probe(4)
            .and_then(|magic| Fields::le(&magic).u32().ok())
            .is_some_and(|magic| magic == C::MAGIC)
    }

    fn sections<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Vec<String>> {
        let commands = Self::commands(stream)?;
        Ok(Self::section_headers(&commands)?
            .into_iter()
            .map(|section| section.sectname)
            .collect())
    }

    fn symbols<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Vec<String>> {
        let commands = Self::commands(stream)?;
        Self::visible_symbols(stream, &commands, None)
    }

    fn section_symbols<R: Read + Seek>(
        stream: &mut Stream<R>,
        section: &str,
    ) -> Result<Vec<String>> {
        let commands = Self::commands(stream)?;
        let names: Vec<String> = Self::section_headers(&commands)?
            .into_iter()
            .map(|section| section.sectname)
            .collect();
        let ordinal = find_section(&names, section)? + 1;
        Self::visible_symbols(stream, &commands, Some(ordinal))
    }
}
