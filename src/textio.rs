//! Text file helpers shared by the label rewriters.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::PrepError;

/// Encoding a text file was decoded with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    Utf8,
    /// The bytes were not valid UTF-8 and were read as ISO-8859-1.
    Latin1,
}

/// Decode bytes as UTF-8, falling back to Latin-1 (every byte is one char).
pub fn decode_with_fallback(bytes: Vec<u8>) -> (String, TextEncoding) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, TextEncoding::Utf8),
        Err(err) => {
            let text = err.into_bytes().iter().map(|&b| b as char).collect();
            (text, TextEncoding::Latin1)
        }
    }
}

/// Read a text file, or `None` if it does not exist.
pub fn read_text(path: &Path) -> Result<Option<(String, TextEncoding)>, PrepError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(decode_with_fallback(bytes))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(PrepError::IoAt {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

/// Overwrite `path` with `lines`, each terminated by `\n`.
///
/// An empty slice truncates the file to zero bytes.
pub fn write_lines(path: &Path, lines: &[String]) -> Result<(), PrepError> {
    let file = fs::File::create(path).map_err(PrepError::io_at(path))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(PrepError::io_at(path))?;
    }
    writer.flush().map_err(PrepError::io_at(path))
}
