use crate::error::{Error, Result};
use crate::format::Format;
use crate::policy::{check_native, HostPlatform};
use crate::reader::{
    BinaryReader, Elf32Reader, Elf64Reader, MachO32Reader, MachO64Reader, Pe32Reader, Pe64Reader,
};
use crate::stream::Stream;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

/// Forwards a query to the reader selected by `$format`.
macro_rules! dispatch {
    ($format:expr, $method:ident($($arg:expr),*)) => {
        match $format {
            Format::Elf32 => Elf32Reader::$method($($arg),*),
            Format::Elf64 => Elf64Reader::$method($($arg),*),
            Format::Pe32 => Pe32Reader::$method($($arg),*),
            Format::Pe64 => Pe64Reader::$method($($arg),*),
            Format::MachO32 => MachO32Reader::$method($($arg),*),
            Format::MachO64 => MachO64Reader::$method($($arg),*),
        }
    };
}

/// Section and exported-symbol information for one binary file.
///
/// The file stays open for the lifetime of the value and every query re-reads
/// what it needs, so nothing parsed is cached between calls. Queries take
/// `&mut self` because they move the shared file cursor.
///
/// ```no_run
/// use libinfo_core::LibraryInfo;
///
/// let mut info = LibraryInfo::open("/usr/lib/libz.so.1", false)?;
/// for name in info.symbols()? {
///     println!("{name}");
/// }
/// # Ok::<(), libinfo_core::Error>(())
/// ```
#[derive(Debug)]
pub struct LibraryInfo<R = File> {
    stream: Stream<R>,
    format: Format,
}

impl LibraryInfo<File> {
    /// Opens `path` and detects its format.
    ///
    /// With `require_native` set, binaries the running host could not load
    /// are rejected with [`Error::NotNativeFormat`].
    pub fn open<P: AsRef<Path>>(path: P, require_native: bool) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        log::debug!("opened {}", path.as_ref().display());
        Self::from_reader(file, require_native)
    }
}

impl<R: Read + Seek> LibraryInfo<R> {
    /// Same as [`LibraryInfo::open`] over any seekable source.
    pub fn from_reader(reader: R, require_native: bool) -> Result<Self> {
        let mut stream = Stream::new(reader)?;
        let format = detect(&mut stream).ok_or(Error::UnsupportedFormat)?;
        if require_native {
            check_native(format, &HostPlatform::current())?;
        }
        log::info!("detected {format} ({} bytes)", stream.len());
        Ok(Self { stream, format })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Section names in section-table order.
    pub fn sections(&mut self) -> Result<Vec<String>> {
        dispatch!(self.format, sections(&mut self.stream))
    }

    /// Every visible symbol, in symbol-table order.
    pub fn symbols(&mut self) -> Result<Vec<String>> {
        dispatch!(self.format, symbols(&mut self.stream))
    }

    /// Visible symbols defined in the first section called `section`.
    ///
    /// Fails with [`Error::NotFound`] if there is no such section.
    pub fn section_symbols(&mut self, section: &str) -> Result<Vec<String>> {
        dispatch!(self.format, section_symbols(&mut self.stream, section))
    }

    pub fn into_inner(self) -> R {
        self.stream.into_inner()
    }
}

fn probe<R: Read + Seek>(format: Format, stream: &mut Stream<R>) -> bool {
    let found = dispatch!(format, detect(stream));
    log::debug!("probe {format}: {found}");
    found
}

/// First format, in probe order, whose signature matches.
pub fn detect<R: Read + Seek>(stream: &mut Stream<R>) -> Option<Format> {
    Format::PROBE_ORDER
        .into_iter()
        .find(|&format| probe(format, stream))
}
