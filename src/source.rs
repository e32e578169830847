//! Line sources feeding the encoder

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::error::Result;

/// Lazily reads trimmed lines from a file or stdin
pub struct LineSource {
    lines: Lines<BufReader<Box<dyn AsyncRead + Unpin + Send>>>,
}

impl LineSource {
    /// Open a file, or stdin when `path` is `-`
    pub async fn open(path: &Path) -> Result<Self> {
        let reader: Box<dyn AsyncRead + Unpin + Send> = if path == Path::new("-") {
            Box::new(tokio::io::stdin())
        } else {
            Box::new(tokio::fs::File::open(path).await?)
        };
        Ok(Self::from_reader(reader))
    }

    pub fn from_reader(reader: Box<dyn AsyncRead + Unpin + Send>) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// Next line with surrounding whitespace removed
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| line.trim().to_string()))
    }
}
