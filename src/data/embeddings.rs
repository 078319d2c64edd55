// ============================================================
// Layer 4 — Pretrained Embedding Loader
// ============================================================
// Reads word vectors from disk into an immutable Embeddings table.
//
// Supported formats:
//   glove           "<token> <f1> <f2> ... <fD>" per line
//   word2vec        "<count> <dim>" header, then glove-style rows
//   word2vec_bin    "<count> <dim>\n" header, then per row the token
//                   bytes up to a space followed by D little-endian
//                   f32 values (and an optional '\n')
//
// The dimensionality of a glove file is taken from its first row;
// every later row must match it.

use std::{
    fmt,
    fs,
    io::{BufRead, BufReader, Read},
    path::Path,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::domain::embeddings::Embeddings;
use crate::error::{ReaderError, Result};

/// Upper bound on rows reserved up front for a binary word2vec file.
const PREALLOCATED_ROWS: usize = 1 << 16;
/// Largest vector (in bytes) a binary row may declare.
const MAX_BINARY_ROW_BYTES: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingFormat {
    #[serde(rename = "glove")]
    Glove,
    #[serde(rename = "word2vec")]
    Word2VecText,
    #[serde(rename = "word2vec_bin")]
    Word2VecBinary,
}

impl FromStr for EmbeddingFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "glove"                             => Ok(Self::Glove),
            "word2vec" | "word2vec_text"        => Ok(Self::Word2VecText),
            "word2vec_bin" | "word2vec_binary"  => Ok(Self::Word2VecBinary),
            other => Err(format!(
                "unknown embedding format '{other}' (expected glove, word2vec or word2vec_bin)"
            )),
        }
    }
}

impl fmt::Display for EmbeddingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Glove          => "glove",
            Self::Word2VecText   => "word2vec",
            Self::Word2VecBinary => "word2vec_bin",
        };
        f.write_str(name)
    }
}

/// Load an embedding table from `path`.
pub fn load_embeddings(path: impl AsRef<Path>, format: EmbeddingFormat) -> Result<Embeddings> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|e| ReaderError::io(path, e))?;
    let mut reader = BufReader::new(file);

    let embeddings = match format {
        EmbeddingFormat::Glove          => read_text_rows(path, &mut reader, None)?,
        EmbeddingFormat::Word2VecText   => {
            let (_, dim) = read_header(path, &mut reader)?;
            read_text_rows(path, &mut reader, Some(dim))?
        }
        EmbeddingFormat::Word2VecBinary => read_binary_rows(path, &mut reader)?,
    };

    if embeddings.is_empty() {
        return Err(ReaderError::format(path, "no embedding rows found"));
    }

    tracing::info!(
        "Loaded {} embeddings of dim {} from '{}' ({})",
        embeddings.len(),
        embeddings.dim(),
        path.display(),
        format
    );
    Ok(embeddings)
}

/// Parse the "<count> <dim>" header of a word2vec file.
fn read_header(path: &Path, reader: &mut impl BufRead) -> Result<(usize, usize)> {
    let mut line = String::new();
    reader.read_line(&mut line).map_err(|e| ReaderError::io(path, e))?;

    let mut fields = line.split_whitespace().map(str::parse::<usize>);
    match (fields.next(), fields.next(), fields.next()) {
        (Some(Ok(count)), Some(Ok(dim)), None) if dim > 0 => Ok((count, dim)),
        _ => Err(ReaderError::format(
            path,
            format!("line 1: expected '<count> <dim>' header, found '{}'", line.trim_end()),
        )),
    }
}

fn read_text_rows(
    path:     &Path,
    reader:   &mut impl BufRead,
    mut dim:  Option<usize>,
) -> Result<Embeddings> {
    // The header (if any) has already been consumed.
    let first_line = if dim.is_some() { 2 } else { 1 };
    let mut rows = Vec::new();

    for (offset, line) in reader.lines().enumerate() {
        let line_no = first_line + offset;
        let line = line.map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => {
                ReaderError::format(path, format!("line {line_no}: invalid UTF-8"))
            }
            _ => ReaderError::io(path, e),
        })?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split(' ');
        let token = fields.next().unwrap_or_default().to_string();
        let vector = fields
            .filter(|f| !f.is_empty())
            .map(str::parse::<f32>)
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| ReaderError::format(path, format!("line {line_no}: {e}")))?;

        let expected = *dim.get_or_insert(vector.len());
        if vector.is_empty() || vector.len() != expected {
            return Err(ReaderError::format(
                path,
                format!(
                    "line {line_no}: '{token}' has {} components, expected {expected}",
                    vector.len()
                ),
            ));
        }
        rows.push((token, vector));
    }

    build_table(path, dim.unwrap_or(0), rows)
}

fn read_binary_rows(path: &Path, reader: &mut BufReader<fs::File>) -> Result<Embeddings> {
    let (count, dim) = read_header(path, reader)?;
    let row_bytes = dim
        .checked_mul(4)
        .filter(|&n| n <= MAX_BINARY_ROW_BYTES)
        .ok_or_else(|| ReaderError::format(path, format!("line 1: dimension {dim} too large")))?;
    // The header count is untrusted; grow the table as rows arrive.
    let mut rows = Vec::with_capacity(count.min(PREALLOCATED_ROWS));
    let mut buf  = vec![0u8; row_bytes];

    for row in 0..count {
        let mut token_bytes = Vec::new();
        reader
            .read_until(b' ', &mut token_bytes)
            .map_err(|e| ReaderError::io(path, e))?;
        if token_bytes.last() != Some(&b' ') {
            return Err(ReaderError::format(
                path,
                format!("row {}: truncated file, expected {count} rows", row + 1),
            ));
        }
        token_bytes.pop();
        let token = String::from_utf8_lossy(&token_bytes)
            .trim_start_matches('\n')
            .to_string();

        reader
            .read_exact(&mut buf)
            .map_err(|_| ReaderError::format(path, format!("row {}: truncated vector for '{token}'", row + 1)))?;
        let vector = buf
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        rows.push((token, vector));
    }

    build_table(path, dim, rows)
}

fn build_table(path: &Path, dim: usize, rows: Vec<(String, Vec<f32>)>) -> Result<Embeddings> {
    let total = rows.len();
    let embeddings = Embeddings::from_rows(dim, rows)
        .map_err(|message| ReaderError::format(path, message))?;
    if embeddings.len() < total {
        tracing::warn!(
            "Skipped {} duplicate tokens in '{}'",
            total - embeddings.len(),
            path.display()
        );
    }
    Ok(embeddings)
}
