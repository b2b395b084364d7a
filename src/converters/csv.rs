//! CSV to a Markdown pipe table.
//!
//! The first record is the header row. Records may have differing lengths;
//! short rows are padded with empty cells to the widest record.

use crate::converters::plain_text::decode;
use crate::converters::{markdown_table, DocumentConverter, PRIORITY_SPECIFIC_FILE_FORMAT};
use crate::error::ConverterError;
use crate::output::ConversionResult;
use crate::pipeline::dispatch::DispatchContext;
use crate::stream::ReadSeek;
use crate::stream_info::StreamInfo;
use std::io::Read;
use tracing::debug;

const ACCEPTED_MIME_TYPE_PREFIXES: &[&str] = &["text/csv", "application/csv"];
const ACCEPTED_FILE_EXTENSIONS: &[&str] = &[".csv"];

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvConverter;

impl CsvConverter {
    pub const NAME: &'static str = "csv";
}

impl DocumentConverter for CsvConverter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_priority(&self) -> f32 {
        PRIORITY_SPECIFIC_FILE_FORMAT
    }

    fn accepts(&self, _stream: &mut dyn ReadSeek, info: &StreamInfo, _ctx: &DispatchContext<'_>) -> bool {
        info.has_extension(ACCEPTED_FILE_EXTENSIONS)
            || info.mimetype_starts_with(ACCEPTED_MIME_TYPE_PREFIXES)
    }

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        info: &StreamInfo,
        ctx: &DispatchContext<'_>,
    ) -> Result<ConversionResult, ConverterError> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        let text = decode(&bytes, info.charset.as_deref(), ctx.options().text_decoding)?;
        let rows = parse_rows(&text)?;
        debug!("csv: {} records", rows.len());
        Ok(ConversionResult::new(markdown_table(&rows).unwrap_or_default()))
    }
}

fn parse_rows(text: &str) -> Result<Vec<Vec<String>>, ConverterError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ConverterError::Malformed {
            format: "csv".to_string(),
            detail: e.to_string(),
        })?;
        rows.push(
            record
                .iter()
                .map(|cell| cell.trim().replace("\r\n", "<br>").replace('\n', "<br>"))
                .collect(),
        );
    }
    Ok(rows)
}
