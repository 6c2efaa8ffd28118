//! Section and exported-symbol listing for ELF, PE and Mach-O binaries.
//!
//! Files are only read, never loaded or executed, and every offset taken from
//! the file is bounds-checked before it is followed.

pub mod binary;
pub mod error;
pub mod format;
pub mod header;
pub mod policy;
pub mod reader;
pub mod stream;
pub mod strtab;

pub use binary::*;
pub use error::{Error, Result};
pub use format::{Family, Format};
pub use policy::{check_native, HostPlatform, OsFamily};
