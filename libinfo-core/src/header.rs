pub mod elf;
pub mod macho;
pub mod pe;

pub trait Header: std::fmt::Debug {
    /// Returns the machine architecture identifier.
    fn machine(&self) -> u32;

    /// Returns true if this is a 64-bit binary.
    fn is_64(&self) -> bool;

    /// Returns a short human-readable name, e.g. "ELF" or "PE".
    fn format_name(&self) -> &'static str;
}
