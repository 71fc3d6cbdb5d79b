//! Command handlers for the `usf` tool

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use tracing::info;
use usf_format::{
    ATime, Access, Compression, Event, EventType, Header, ReaderOptions, UsfReader, UsfWriter,
    WriterOptions,
};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// One JSON document per line
    Json,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionArg {
    /// No compression
    None,
    /// bzip2
    Bzip2,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Self::None,
            CompressionArg::Bzip2 => Self::Bzip2,
        }
    }
}

fn open(path: &Path, options: &ReaderOptions) -> Result<UsfReader<BufReader<File>>> {
    UsfReader::open_with(path, options).with_context(|| format!("failed to open {}", path.display()))
}

/// Print the header followed by every event
pub fn dump<W: Write>(path: &Path, format: OutputFormat, out: &mut W) -> Result<()> {
    let mut reader = open(path, &ReaderOptions::default())?;

    match format {
        OutputFormat::Text => write!(out, "{}", reader.header())?,
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, reader.header())?;
            writeln!(out)?;
        }
    }

    for event in reader.events() {
        let event = event.with_context(|| format!("failed to read {}", path.display()))?;
        match format {
            OutputFormat::Text => writeln!(out, "{event}")?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, &event)?;
                writeln!(out)?;
            }
        }
    }

    reader.close()?;
    Ok(())
}

/// Result of a conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Backend the source was decoded with
    pub from: Compression,
    /// Backend of the destination
    pub to: Compression,
    /// Events copied
    pub events: u64,
}

impl fmt::Display for ConvertSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Converted {} events ({} -> {})",
            self.events, self.from, self.to
        )
    }
}

/// Copy `input` to `output`, re-encoding the event stream
pub fn convert(
    input: &Path,
    output: &Path,
    compression: Option<Compression>,
    compression_override: Option<Compression>,
    block_size: u32,
) -> Result<ConvertSummary> {
    let mut read_options = ReaderOptions::new();
    if let Some(forced) = compression_override {
        read_options = read_options.with_compression_override(forced);
    }
    let mut reader = open(input, &read_options)?;

    let from = reader.header().compression_backend()?;
    let to = compression.unwrap_or(from);
    let header: Header = reader.header().clone().with_compression(to);

    let write_options = WriterOptions::new().with_block_size(block_size);
    let mut writer = UsfWriter::create_with(output, &header, &write_options)
        .with_context(|| format!("failed to create {}", output.display()))?;

    for event in reader.events() {
        let event = event.with_context(|| format!("failed to read {}", input.display()))?;
        writer.append(&event)?;
    }

    let events = writer.events_written();
    writer
        .close()
        .with_context(|| format!("failed to finish {}", output.display()))?;
    reader.close()?;

    info!(events, from = from.name(), to = to.name(), "conversion complete");
    Ok(ConvertSummary { from, to, events })
}

/// Event counts and time span of a file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub events: u64,
    pub samples: u64,
    pub dangling: u64,
    pub bursts: u64,
    pub traces: u64,
    pub accesses: u64,
    pub first_time: Option<ATime>,
    pub last_time: Option<ATime>,
}

impl Stats {
    fn record_access(&mut self, access: &Access) {
        self.accesses += 1;
        self.first_time = Some(self.first_time.map_or(access.time, |t| t.min(access.time)));
        self.last_time = Some(self.last_time.map_or(access.time, |t| t.max(access.time)));
    }

    fn record(&mut self, event: &Event) {
        self.events += 1;
        match event {
            Event::Sample(s) => {
                self.samples += 1;
                self.record_access(&s.begin);
                self.record_access(&s.end);
            }
            Event::Dangling(d) => {
                self.dangling += 1;
                self.record_access(&d.begin);
            }
            Event::Burst(_) => self.bursts += 1,
            Event::Trace(a) => {
                self.traces += 1;
                self.record_access(a);
            }
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Events: {}", self.events)?;
        for (kind, count) in [
            (EventType::Sample, self.samples),
            (EventType::Dangling, self.dangling),
            (EventType::Burst, self.bursts),
            (EventType::Trace, self.traces),
        ] {
            writeln!(f, "\t{kind}: {count}")?;
        }
        writeln!(f, "Accesses: {}", self.accesses)?;
        if let (Some(first), Some(last)) = (self.first_time, self.last_time) {
            writeln!(f, "Access time: {first}-{last}")?;
        }
        Ok(())
    }
}

/// Count the events of a file
pub fn collect_stats(path: &Path) -> Result<Stats> {
    let mut reader = open(path, &ReaderOptions::default())?;
    let mut stats = Stats::default();
    for event in reader.events() {
        let event = event.with_context(|| format!("failed to read {}", path.display()))?;
        stats.record(&event);
    }
    reader.close()?;
    Ok(stats)
}

/// Print event statistics
pub fn stats<W: Write>(path: &Path, format: OutputFormat, out: &mut W) -> Result<()> {
    let stats = collect_stats(path)?;
    match format {
        OutputFormat::Text => write!(out, "{stats}")?,
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &stats)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use usf_format::{AccessType, Burst, Dangling, HeaderFlags, Sample};

    fn access(pc: u64, time: u64) -> Access {
        Access {
            pc,
            addr: 0x8000 + pc,
            time,
            tid: 2,
            len: 4,
            kind: AccessType::WRITE,
        }
    }

    fn events() -> Vec<Event> {
        vec![
            Event::Burst(Burst { begin_time: 10 }),
            Event::Sample(Sample {
                begin: access(0x10, 11),
                end: access(0x20, 40),
                line_size: 6,
            }),
            Event::Dangling(Dangling {
                begin: access(0x14, 12),
                line_size: 6,
            }),
        ]
    }

    fn write_fixture(dir: &TempDir, compression: Compression) -> std::path::PathBuf {
        let path = dir.path().join(format!("fixture-{compression}.usf"));
        let header = Header::new()
            .with_compression(compression)
            .with_flags(HeaderFlags::BURST | HeaderFlags::DELTA)
            .with_args(["sampler", "-p", "1000"]);
        let mut writer = UsfWriter::create(&path, &header).unwrap();
        for event in events() {
            writer.append(&event).unwrap();
        }
        writer.close().unwrap();
        path
    }

    #[test]
    fn test_dump_text() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, Compression::None);

        let mut out = Vec::new();
        dump(&path, OutputFormat::Text, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Header:\n"));
        assert!(text.contains("\t\tsampler\n"));
        assert!(text.contains("[BURST] begin_time: 10"));
        assert_eq!(text.lines().filter(|l| l.starts_with('[')).count(), 3);
    }

    #[test]
    fn test_dump_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, Compression::Bzip2);

        let mut out = Vec::new();
        dump(&path, OutputFormat::Json, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["argv"][0], "sampler");
        assert_eq!(lines[1]["event"], "burst");
        assert_eq!(lines[2]["event"], "sample");
    }

    #[test]
    fn test_convert_changes_backend() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir, Compression::None);
        let output = dir.path().join("converted.usf");

        let summary = convert(&input, &output, Some(Compression::Bzip2), None, 9).unwrap();
        assert_eq!(summary.from, Compression::None);
        assert_eq!(summary.to, Compression::Bzip2);
        assert_eq!(summary.events, 3);

        let mut reader = UsfReader::open(&output).unwrap();
        assert_eq!(reader.header().compression, Compression::Bzip2.id());
        assert_eq!(reader.header().argv, vec!["sampler", "-p", "1000"]);
        let copied: Vec<Event> = reader.events().collect::<usf_format::Result<_>>().unwrap();
        assert_eq!(copied, events());
    }

    #[test]
    fn test_convert_rejects_bad_block_size() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir, Compression::None);
        let output = dir.path().join("never.usf");

        assert!(convert(&input, &output, Some(Compression::Bzip2), None, 0).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, Compression::Bzip2);

        let stats = collect_stats(&path).unwrap();
        assert_eq!(stats.events, 3);
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.dangling, 1);
        assert_eq!(stats.bursts, 1);
        assert_eq!(stats.traces, 0);
        assert_eq!(stats.accesses, 3);
        assert_eq!(stats.first_time, Some(11));
        assert_eq!(stats.last_time, Some(40));

        let text = stats.to_string();
        assert!(text.contains("\tSAMPLE: 1\n"));
        assert!(text.contains("Access time: 11-40"));
    }
}
