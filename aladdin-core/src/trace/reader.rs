//! Streaming reader over a gzip-compressed trace file.
//!
//! Wraps `flate2::read::GzDecoder` in a `BufReader` so the whole trace is
//! never materialized in memory — traces from real benchmarks run into the
//! gigabytes uncompressed. Tracks whether we are inside the `%%%% LABEL MAP
//! ... %%%%` preamble so callers get fully-typed `Line`s without needing to
//! run their own state machine.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::AladdinError;
use crate::progress::ProgressTracker;
use crate::trace::{parse_labelmap_entry, parse_line, Line};

pub struct TraceReader {
    lines: std::io::Lines<BufReader<GzDecoder<File>>>,
    record_index: u64,
    in_labelmap: bool,
    progress: ProgressTracker,
}

impl TraceReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AladdinError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|_| AladdinError::MissingTrace(path.display().to_string()))?;
        let decoder = GzDecoder::new(file);
        Ok(TraceReader {
            lines: BufReader::new(decoder).lines(),
            record_index: 0,
            in_labelmap: false,
            progress: ProgressTracker::new(format!("trace[{}]", path.display())),
        })
    }

    /// Read and classify the next line, skipping blank lines. Returns `Ok(None)`
    /// at a clean end of trace (spec §4.1: "truncated trace -> build what was
    /// seen"; the builder decides there's nothing more to see the same way
    /// whether the stream ended cleanly or was cut short mid-record).
    pub fn next_line(&mut self) -> Result<Option<Line>, AladdinError> {
        loop {
            let raw = match self.lines.next() {
                None => {
                    self.progress.finish();
                    return Ok(None);
                }
                Some(result) => result.map_err(|e| AladdinError::TraceDecode {
                    record_index: self.record_index,
                    reason: e.to_string(),
                })?,
            };
            self.record_index += 1;
            self.progress.tick();

            if raw.trim().is_empty() {
                continue;
            }

            let line = if self.in_labelmap {
                match parse_line(&raw, self.record_index) {
                    Ok(marker @ Line::LabelMapEnd) => marker,
                    _ => parse_labelmap_entry(&raw, self.record_index)?,
                }
            } else {
                parse_line(&raw, self.record_index)?
            };

            match &line {
                Line::LabelMapStart => self.in_labelmap = true,
                Line::LabelMapEnd => self.in_labelmap = false,
                _ => {}
            }
            return Ok(Some(line));
        }
    }

    pub fn record_index(&self) -> u64 {
        self.record_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_gz(path: &Path, text: &str) {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let file = File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn reads_labelmap_then_body() {
        let dir = std::env::temp_dir();
        let path = dir.join("aladdin_trace_reader_test.gz");
        let text = "\
%%%% LABEL MAP START %%%%
foo/loop1 10
%%%% LABEL MAP END %%%%
0,10,foo,bb.0,i1,0,1
";
        write_gz(&path, text);

        let mut reader = TraceReader::open(&path).unwrap();
        assert_eq!(reader.next_line().unwrap(), Some(Line::LabelMapStart));
        assert_eq!(
            reader.next_line().unwrap(),
            Some(Line::LabelMapEntry {
                function: "foo".to_string(),
                label: "loop1".to_string(),
                line_number: 10,
            })
        );
        assert_eq!(reader.next_line().unwrap(), Some(Line::LabelMapEnd));
        assert!(matches!(
            reader.next_line().unwrap(),
            Some(Line::Instruction { .. })
        ));
        assert_eq!(reader.next_line().unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_missing_trace_error() {
        let err = TraceReader::open("/nonexistent/path/to/trace.gz").unwrap_err();
        assert!(matches!(err, AladdinError::MissingTrace(_)));
    }
}
