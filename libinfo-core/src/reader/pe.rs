use crate::error::{Error, Result};
use crate::format::Format;
use crate::header::pe::{
    CoffHeader, DataDirectory, DosHeader, ExportDirectory, Pe32, Pe64, PeClass, SectionHeader,
    COFF_HEADER_SIZE, DATA_DIRECTORY_SIZE, DOS_HEADER_SIZE, EXPORT_DIRECTORY_SIZE,
    IMAGE_DOS_SIGNATURE, IMAGE_NT_SIGNATURE, SECTION_HEADER_SIZE,
};
use crate::reader::{find_section, log_header, table_size, BinaryReader};
use crate::stream::{Fields, Stream};
use crate::strtab::StringTable;
use byteorder::{ByteOrder, LE};
use std::io::{Read, Seek};
use std::marker::PhantomData;

/// PE/COFF image reader, parametrised by optional header width.
#[derive(Debug, Clone, Copy)]
pub struct PeReader<C>(PhantomData<C>);

pub type Pe32Reader = PeReader<Pe32>;
pub type Pe64Reader = PeReader<Pe64>;

/// An exported name and the RVA of the function it refers to.
#[derive(Debug)]
struct Export {
    name: String,
    rva: u32,
}

#[derive(Debug)]
struct Image {
    coff: CoffHeader,
    sections: Vec<SectionHeader>,
    exports: Option<DataDirectory>,
}

impl Image {
    /// File offset of `rva` and the number of raw bytes the containing
    /// section still holds from there.
    ///
    /// Only the raw extent is backed by file data, so an RVA in the
    /// zero-filled tail of a section is rejected.
    fn rva_to_offset(&self, rva: u32, what: &str) -> Result<(u64, u64)> {
        let section = self
            .sections
            .iter()
            .find(|s| s.contains_rva(rva))
            .ok_or_else(|| {
                Error::malformed(format!("{what}: RVA {rva:#x} is not in any section"))
            })?;
        let delta = rva - section.virtual_address;
        if delta >= section.size_of_raw_data {
            return Err(Error::malformed(format!(
                "{what}: RVA {rva:#x} has no file data behind it"
            )));
        }
        let offset = u64::from(section.pointer_to_raw_data) + u64::from(delta);
        Ok((offset, u64::from(section.size_of_raw_data - delta)))
    }
}

impl<C: PeClass> PeReader<C> {
    fn image<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Image> {
        let dos = DosHeader::parse(&stream.read_at(0, DOS_HEADER_SIZE, "DOS header")?)?;
        let nt = u64::from(dos.e_lfanew);
        let raw = stream.read_at(nt + 4, COFF_HEADER_SIZE, "COFF header")?;
        let coff = CoffHeader::parse(&raw)?;
        log_header(&coff);

        let optional_offset = nt + 4 + COFF_HEADER_SIZE;
        let optional_size = u64::from(coff.size_of_optional_header);
        let optional = stream.read_at(optional_offset, optional_size, "optional header")?;

        let exports = if optional_size >= C::DATA_DIRECTORY_OFFSET + DATA_DIRECTORY_SIZE {
            let mut f = Fields::le(&optional);
            f.skip(C::RVA_COUNT_OFFSET);
            let rva_count = f.u32()?;
            let start = C::DATA_DIRECTORY_OFFSET as usize;
            let dir = DataDirectory::parse(&optional[start..start + DATA_DIRECTORY_SIZE as usize])?;
            (rva_count > 0 && dir.virtual_address != 0).then_some(dir)
        } else {
            None
        };

        let count = u64::from(coff.number_of_sections);
        let size = table_size(count, SECTION_HEADER_SIZE, "section table")?;
        let table = stream.read_at(optional_offset + optional_size, size, "section table")?;
        let sections = table
            .chunks_exact(SECTION_HEADER_SIZE as usize)
            .map(SectionHeader::parse)
            .collect::<Result<Vec<_>>>()?;
        log::debug!("{} sections, export directory: {:?}", sections.len(), exports);

        Ok(Image {
            coff,
            sections,
            exports,
        })
    }

    fn section_names<R: Read + Seek>(
        stream: &mut Stream<R>,
        image: &Image,
    ) -> Result<Vec<String>> {
        let has_long_names = image
            .sections
            .iter()
            .any(|section| section.long_name_offset().is_some());
        let strings = if has_long_names {
            Some(Self::coff_strings(stream, &image.coff)?)
        } else {
            None
        };

        let mut names = Vec::with_capacity(image.sections.len());
        for section in &image.sections {
            let Some(offset) = section.long_name_offset() else {
                names.push(section.short_name());
                continue;
            };
            // The first four bytes of the table hold its size.
            if offset < 4 {
                return Err(Error::malformed(format!(
                    "long section name offset {offset} points into the string table size"
                )));
            }
            let table = strings.as_ref().ok_or_else(|| {
                Error::malformed("long section name without a COFF string table")
            })?;
            names.push(table.get_at(offset)?);
        }
        Ok(names)
    }

    fn coff_strings<R: Read + Seek>(
        stream: &mut Stream<R>,
        coff: &CoffHeader,
    ) -> Result<StringTable> {
        let offset = coff
            .string_table_offset()
            .ok_or_else(|| Error::malformed("long section name without a COFF string table"))?;
        let size = Fields::le(&stream.read_at(offset, 4, "COFF string table size")?).u32()?;
        if size < 4 {
            return Err(Error::malformed(format!("COFF string table size {size} below 4")));
        }
        Ok(StringTable::new(stream.read_at(
            offset,
            u64::from(size),
            "COFF string table",
        )?))
    }

    fn exports<R: Read + Seek>(stream: &mut Stream<R>, image: &Image) -> Result<Vec<Export>> {
        let Some(dir) = image.exports else {
            log::warn!("no export directory");
            return Ok(Vec::new());
        };
        let raw = Self::table(
            stream,
            image,
            dir.virtual_address,
            EXPORT_DIRECTORY_SIZE,
            "export directory",
        )?;
        let directory = ExportDirectory::parse(&raw)?;
        if directory.number_of_names == 0 {
            return Ok(Vec::new());
        }

        let names = u64::from(directory.number_of_names);
        let functions = u64::from(directory.number_of_functions);
        let name_rvas = Self::table(
            stream,
            image,
            directory.address_of_names,
            names * 4,
            "export name table",
        )?;
        let ordinals = Self::table(
            stream,
            image,
            directory.address_of_name_ordinals,
            names * 2,
            "export ordinal table",
        )?;
        let addresses = Self::table(
            stream,
            image,
            directory.address_of_functions,
            functions * 4,
            "export address table",
        )?;

        let mut name_rvas = Fields::le(&name_rvas);
        let mut ordinals = Fields::le(&ordinals);
        let mut exports = Vec::with_capacity(names as usize);
        for _ in 0..names {
            let name_rva = name_rvas.u32()?;
            let ordinal = u64::from(ordinals.u16()?);
            if ordinal >= functions {
                return Err(Error::malformed(format!(
                    "export ordinal {ordinal} beyond {functions} functions"
                )));
            }
            let at = (ordinal * 4) as usize;
            let rva = LE::read_u32(&addresses[at..at + 4]);

            let (at, available) = image.rva_to_offset(name_rva, "export name")?;
            let name = stream.read_cstr_at(at, available, "export name")?;
            exports.push(Export { name, rva });
        }
        Ok(exports)
    }

    fn table<R: Read + Seek>(
        stream: &mut Stream<R>,
        image: &Image,
        rva: u32,
        size: u64,
        what: &str,
    ) -> Result<Vec<u8>> {
        let (offset, available) = image.rva_to_offset(rva, what)?;
        if size > available {
            return Err(Error::malformed(format!(
                "{what}: {size:#x} bytes at RVA {rva:#x} run past the section's file data"
            )));
        }
        stream.read_at(offset, size, what)
    }
}

impl<C: PeClass> BinaryReader for PeReader<C> {
    const FORMAT: Format = C::FORMAT;

    fn detect<R: Read + Seek>(stream: &mut Stream<R>) -> bool {
        let probe = |stream: &mut Stream<R>| -> Option<bool> {
            let dos = DosHeader::parse(&stream.probe(DOS_HEADER_SIZE as usize)?).ok()?;
            if dos.e_magic != IMAGE_DOS_SIGNATURE {
                return Some(false);
            }
            // Signature, COFF header and the optional header magic.
            let len = 4 + COFF_HEADER_SIZE as usize + 2;
            let raw = stream.probe_at(u64::from(dos.e_lfanew), len)?;
            let mut f = Fields::le(&raw);
            let signature = f.u32().ok()?;
            f.skip(COFF_HEADER_SIZE);
            let magic = f.u16().ok()?;
            Some(signature == IMAGE_NT_SIGNATURE && magic == C::MAGIC)
        };
        probe(stream).unwrap_or(false)
    }

    fn sections<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Vec<String>> {
        let image = Self::image(stream)?;
        Self::section_names(stream, &image)
    }

    fn symbols<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Vec<String>> {
        let image = Self::image(stream)?;
        Ok(Self::exports(stream, &image)?
            .into_iter()
            .map(|export| export.name)
            .filter(|name| !name.is_empty())
            .collect())
    }

    fn section_symbols<R: Read + Seek>(
        stream: &mut Stream<R>,
        section: &str,
    ) -> Result<Vec<String>> {
        let image = Self::image(stream)?;
        let names = Self::section_names(stream, &image)?;
        let target = image.sections[find_section(&names, section)?];

        Ok(Self::exports(stream, &image)?
            .into_iter()
            .filter(|export| target.contains_rva(export.rva))
            .map(|export| export.name)
            .filter(|name| !name.is_empty())
            .collect())
    }
}
