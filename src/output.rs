use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::app::ClearResult;
use crate::cache::ContentBody;
use crate::content::DatasetContent;
use crate::metadata::{DatasetMetadata, Distribution};
use crate::search::SearchResults;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_metadata(result: &DatasetMetadata) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_formats(result: &[Distribution]) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_search(result: &SearchResults) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    /// Writes the body to `path` and prints the content descriptor, or streams a text body to
    /// stdout when no path is given.
    pub fn print_content(result: &DatasetContent, path: Option<&Utf8Path>) -> io::Result<()> {
        match (path, &result.content) {
            (Some(path), body) => {
                std::fs::write(path.as_std_path(), body.as_bytes())?;
                Self::print_json(result)
            }
            (None, ContentBody::Text(text)) => {
                let mut stdout = io::stdout();
                stdout.write_all(text.as_bytes())?;
                if !text.ends_with('\n') {
                    stdout.write_all(b"\n")?;
                }
                Ok(())
            }
            (None, ContentBody::Binary(_)) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "content from {} is binary ({}), use --output to save it",
                    result.source_url, result.content_type
                ),
            )),
        }
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
