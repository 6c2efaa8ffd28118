pub mod elf;
pub mod macho;
pub mod pe;

use crate::error::{Error, Result};
use crate::format::Format;
use crate::header::Header;
use crate::stream::Stream;
use std::io::{Read, Seek};

pub use elf::{Elf32Reader, Elf64Reader};
pub use macho::{MachO32Reader, MachO64Reader};
pub use pe::{Pe32Reader, Pe64Reader};

/// Decoder for one container format at one address width.
///
/// Readers hold no state: every call re-reads what it needs from the stream.
pub trait BinaryReader {
    const FORMAT: Format;

    /// Returns true if the stream starts with this format's signature.
    ///
    /// Short files and read failures are a plain `false`.
    fn detect<R: Read + Seek>(stream: &mut Stream<R>) -> bool;

    /// Section names in section-table order.
    fn sections<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Vec<String>>;

    /// Names of all visible symbols.
    fn symbols<R: Read + Seek>(stream: &mut Stream<R>) -> Result<Vec<String>>;

    /// Names of visible symbols defined in the first section named `section`.
    fn section_symbols<R: Read + Seek>(
        stream: &mut Stream<R>,
        section: &str,
    ) -> Result<Vec<String>>;
}

/// First index whose name equals `wanted`.
pub(crate) fn find_section(names: &[String], wanted: &str) -> Result<usize> {
    names
        .iter()
        .position(|name| name == wanted)
        .ok_or_else(|| Error::NotFound(wanted.to_string()))
}

pub(crate) fn log_header<H: Header>(header: &H) {
    log::debug!(
        "{} header: machine {:#x}, 64-bit: {}",
        header.format_name(),
        header.machine(),
        header.is_64()
    );
}

/// `count * size`, failing on overflow.
pub(crate) fn table_size(count: u64, size: u64, what: &str) -> Result<u64> {
    count.checked_mul(size).ok_or_else(|| {
        Error::malformed(format!("{what}: {count} entries of {size} bytes overflow"))
    })
}
