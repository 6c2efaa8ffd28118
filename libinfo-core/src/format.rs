use std::fmt;

/// Container family, independent of address width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Elf,
    Pe,
    MachO,
}

/// The concrete layout recognised for an opened file.
///
/// Exactly one of these is chosen when a [`crate::LibraryInfo`] is built and
/// it never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Elf32,
    Elf64,
    Pe32,
    Pe64,
    MachO32,
    MachO64,
}

impl Format {
    /// Order in which detectors are tried.
    pub const PROBE_ORDER: [Format; 6] = [
        Format::Elf32,
        Format::Elf64,
        Format::Pe32,
        Format::Pe64,
        Format::MachO32,
        Format::MachO64,
    ];

    pub fn family(self) -> Family {
        match self {
            Format::Elf32 | Format::Elf64 => Family::Elf,
            Format::Pe32 | Format::Pe64 => Family::Pe,
            Format::MachO32 | Format::MachO64 => Family::MachO,
        }
    }

    /// Returns true for the 64-bit variant of a family.
    pub fn is_64(self) -> bool {
        matches!(self, Format::Elf64 | Format::Pe64 | Format::MachO64)
    }

    pub fn bits(self) -> u32 {
        if self.is_64() {
            64
        } else {
            32
        }
    }

    /// Returns a short human-readable name, e.g. "ELF64" or "PE32".
    pub fn format_name(self) -> &'static str {
        match self {
            Format::Elf32 => "ELF32",
            Format::Elf64 => "ELF64",
            Format::Pe32 => "PE32",
            Format::Pe64 => "PE32+",
            Format::MachO32 => "Mach-O32",
            Format::MachO64 => "Mach-O64",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_name())
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::Elf => "ELF",
            Family::Pe => "PE",
            Family::MachO => "Mach-O",
        };
        write!(f, "{}", name)
    }
}
