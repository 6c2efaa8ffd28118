use crate::error::{Error, Result};

/// A blob of NUL-terminated strings addressed by byte offset.
#[derive(Debug, Clone)]
pub struct StringTable {
    data: Vec<u8>,
}

impl StringTable {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the string starting at `offset`.
    ///
    /// The offset must lie inside the table and the string must be terminated
    /// before the table ends.
    pub fn get_at(&self, offset: u64) -> Result<String> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < self.data.len())
            .ok_or_else(|| {
                Error::malformed(format!(
                    "string offset {offset:#x} outside table of {:#x} bytes",
                    self.data.len()
                ))
            })?;

        let len = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| {
                Error::malformed(format!("unterminated string at offset {offset:#x}"))
            })?;

        Ok(String::from_utf8_lossy(&self.data[start..start + len]).into_owned())
    }
}
