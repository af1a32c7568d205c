use std::fmt;
use std::str::FromStr;

/// Resume point for backward paging: the next page holds the events of
/// `chunk` strictly before `index`, then older chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    pub chunk: u32,
    pub index: usize,
}

impl Cursor {
    pub fn new(chunk: u32, index: usize) -> Self {
        Self { chunk, index }
    }
}

/// Rendered as `chunk:index`, e.g. `3:17`.
impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chunk, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorParseError(pub String);

impl fmt::Display for CursorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid cursor: {}", self.0)
    }
}

impl std::error::Error for CursorParseError {}

impl FromStr for Cursor {
    type Err = CursorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || CursorParseError(s.to_string());
        let (chunk, index) = s.trim().split_once(':').ok_or_else(err)?;
        let chunk: u32 = chunk.parse().map_err(|_| err())?;
        if chunk == 0 {
            return Err(err());
        }
        Ok(Cursor {
            chunk,
            index: index.parse().map_err(|_| err())?,
        })
    }
}
