use crate::error::{Error, Result};
use crate::format::{Family, Format};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Apple,
    /// Linux, the BSDs and everything else that loads ELF.
    Other,
}

impl OsFamily {
    pub fn native_family(self) -> Family {
        match self {
            OsFamily::Windows => Family::Pe,
            OsFamily::Apple => Family::MachO,
            OsFamily::Other => Family::Elf,
        }
    }
}

/// The running platform, as far as loadability is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: OsFamily,
    pub pointer_width: u32,
}

impl HostPlatform {
    pub fn current() -> Self {
        let os = if cfg!(windows) {
            OsFamily::Windows
        } else if cfg!(target_vendor = "apple") {
            OsFamily::Apple
        } else {
            OsFamily::Other
        };
        HostPlatform {
            os,
            pointer_width: usize::BITS,
        }
    }
}

/// Rejects formats the host could never load.
///
/// A 32-bit binary is accepted on a 64-bit host of the right family.
pub fn check_native(format: Format, host: &HostPlatform) -> Result<()> {
    let native = host.os.native_family();
    if format.family() != native {
        let reason = match native {
            Family::Pe => "not a PE binary",
            Family::MachO => "not a Mach-O binary",
            Family::Elf => "not an ELF binary",
        };
        return Err(Error::NotNativeFormat { format, reason });
    }
    if format.is_64() && host.pointer_width < 64 {
        return Err(Error::NotNativeFormat {
            format,
            reason: "64-bit binary on a 32-bit host",
        });
    }
    Ok(())
}
