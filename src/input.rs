// Input stream resolution
//
// An input is "-" (stdin), an http(s) URL, or a local path. A ".gz" suffix
// selects gzip decompression. Every input is newline-delimited JSON.

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::str::FromStr;
use stream2parquet_core::{JsonLinesSource, RecordSource};

const READ_BUFFER: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    Stdin,
    Url(String),
    Path(PathBuf),
}

impl FromStr for InputSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            anyhow::bail!("input must not be empty");
        }
        if s == "-" {
            return Ok(InputSpec::Stdin);
        }
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(InputSpec::Url(s.to_string()));
        }
        Ok(InputSpec::Path(PathBuf::from(s)))
    }
}

impl fmt::Display for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSpec::Stdin => write!(f, "-"),
            InputSpec::Url(url) => write!(f, "{}", url),
            InputSpec::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl InputSpec {
    pub fn is_gzip(&self) -> bool {
        let name = match self {
            InputSpec::Stdin => return false,
            InputSpec::Url(url) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
            InputSpec::Path(path) => path.to_string_lossy().to_string(),
        };
        name.to_ascii_lowercase().ends_with(".gz")
    }

    /// Whether the input can be opened again from the start. Stdin is
    /// consumed by the first reader.
    pub fn is_reopenable(&self) -> bool {
        !matches!(self, InputSpec::Stdin)
    }

    /// Open the raw byte stream, decompressed when needed.
    pub fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        let raw: Box<dyn Read + Send> = match self {
            InputSpec::Stdin => Box::new(std::io::stdin()),
            InputSpec::Path(path) => Box::new(
                File::open(path)
                    .with_context(|| format!("Failed to open input file: {}", path.display()))?,
            ),
            InputSpec::Url(url) => {
                let response = reqwest::blocking::get(url)
                    .with_context(|| format!("Failed to fetch {}", url))?
                    .error_for_status()
                    .with_context(|| format!("Request for {} was rejected", url))?;
                Box::new(response)
            }
        };

        tracing::debug!(input = %self, gzip = self.is_gzip(), "Opened input");
        if self.is_gzip() {
            Ok(Box::new(BufReader::with_capacity(
                READ_BUFFER,
                MultiGzDecoder::new(raw),
            )))
        } else {
            Ok(Box::new(BufReader::with_capacity(READ_BUFFER, raw)))
        }
    }

    /// Open the input as a record source.
    pub fn open_source(&self) -> Result<Box<dyn RecordSource + Send>> {
        Ok(Box::new(JsonLinesSource::new(self.open()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn parses_input_kinds() {
        assert_eq!("-".parse::<InputSpec>().unwrap(), InputSpec::Stdin);
        assert_eq!(
            "https://example.com/reviews.jsonl.gz".parse::<InputSpec>().unwrap(),
            InputSpec::Url("https://example.com/reviews.jsonl.gz".to_string())
        );
        assert_eq!(
            "data/reviews.jsonl".parse::<InputSpec>().unwrap(),
            InputSpec::Path(PathBuf::from("data/reviews.jsonl"))
        );
        assert!("  ".parse::<InputSpec>().is_err());
    }

    #[test]
    fn detects_gzip_suffix() {
        assert!("a/b.jsonl.GZ".parse::<InputSpec>().unwrap().is_gzip());
        assert!("https://h/x.gz?sig=1".parse::<InputSpec>().unwrap().is_gzip());
        assert!(!"a/b.jsonl".parse::<InputSpec>().unwrap().is_gzip());
        assert!(!InputSpec::Stdin.is_gzip());
    }

    #[test]
    fn only_stdin_is_single_pass() {
        assert!(!InputSpec::Stdin.is_reopenable());
        assert!("data/reviews.jsonl".parse::<InputSpec>().unwrap().is_reopenable());
        assert!("https://h/x.jsonl".parse::<InputSpec>().unwrap().is_reopenable());
    }

    #[test]
    fn reads_gzip_file_as_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.jsonl.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        for i in 0..5 {
            writeln!(encoder, "{{\"id\": {}}}", i).unwrap();
        }
        encoder.finish().unwrap();

        let spec = InputSpec::Path(path);
        let mut source = spec.open_source().unwrap();
        let batch = source.next_batch().unwrap().unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[4]["id"], serde_json::json!(4));
    }

    #[test]
    fn missing_file_is_an_error() {
        let spec = InputSpec::Path(PathBuf::from("/nonexistent/reviews.jsonl"));
        assert!(spec.open().is_err());
    }
}
