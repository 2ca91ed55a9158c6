use std::io::{self, Read, Write};

use csv::{ReaderBuilder, WriterBuilder};

use super::{Transform, TransformError, TransformSummary};

/// Cleans delimited text: trims whitespace in the header and every cell,
/// drops rows whose cells are all blank, and pads or truncates each row to
/// the header width.
#[derive(Debug, Clone)]
pub struct CsvCleaner {
    delimiter: u8,
    output_extension: &'static str,
}

impl CsvCleaner {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            output_extension: "csv",
        }
    }

    pub fn tab_separated() -> Self {
        Self {
            delimiter: b'\t',
            output_extension: "tsv",
        }
    }
}

impl Default for CsvCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for CsvCleaner {
    fn name(&self) -> &str {
        "clean-rows"
    }

    fn output_extension(&self) -> &str {
        self.output_extension
    }

    fn apply(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<TransformSummary, TransformError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(LineTally::new(input));
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(output);

        let mut records = reader.records();
        let header = match records.next() {
            Some(header) => header?,
            None => return Err(TransformError::EmptyInput),
        };
        let mut record_lines = physical_lines(&header);
        let header: Vec<&str> = header.iter().map(str::trim).collect();
        let width = header.len();
        writer.write_record(&header)?;

        let mut summary = TransformSummary {
            columns: width as u64,
            ..TransformSummary::default()
        };

        for record in records {
            let record = record?;
            summary.input_rows += 1;
            record_lines += physical_lines(&record);

            let mut cells: Vec<&str> = record.iter().map(str::trim).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            cells.resize(width, "");
            writer.write_record(&cells)?;
            summary.output_rows += 1;
        }

        // The parser skips empty lines without yielding a record; they are
        // still input rows, and always dropped.
        let blank_lines = reader.get_ref().lines().saturating_sub(record_lines);
        summary.input_rows += blank_lines;

        writer.flush()?;
        summary.dropped_rows = summary.input_rows - summary.output_rows;
        Ok(summary)
    }
}

/// Lines a parsed record spans, counting newlines inside quoted cells.
fn physical_lines(record: &csv::StringRecord) -> u64 {
    1 + record
        .iter()
        .map(|cell| cell.bytes().filter(|&b| b == b'\n').count() as u64)
        .sum::<u64>()
}

/// Counts the lines read through it. A final line without a terminator
/// still counts.
struct LineTally<R> {
    inner: R,
    newlines: u64,
    last: Option<u8>,
}

impl<R> LineTally<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            newlines: 0,
            last: None,
        }
    }

    fn lines(&self) -> u64 {
        match self.last {
            Some(b'\n') | None => self.newlines,
            Some(_) => self.newlines + 1,
        }
    }
}

impl<R: Read> Read for LineTally<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.newlines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
            self.last = Some(buf[n - 1]);
        }
        Ok(n)
    }
}
