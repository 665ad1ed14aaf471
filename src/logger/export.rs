//! Read-back of stored logs for the operator console.

use core::fmt;
use core::str::FromStr;
use std::io;

use embedded_hal::delay::DelayNs;

use super::layout::{self, BLOCKS_PREFIX, LogCategory, MEMPOOL_PREFIX, PRICE_PREFIX};
use super::PersistentLogger;
use crate::app::ports::{ClockPort, StorageError, StoragePort};

const CHUNK: usize = 512;

/// Data series selectable by `EXPORT_DATA=<KIND>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Price,
    Blocks,
    Mempool,
    All,
}

impl ExportKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "PRICE",
            Self::Blocks => "BLOCKS",
            Self::Mempool => "MEMPOOL",
            Self::All => "ALL",
        }
    }

    /// File-name prefix in `/logs/data`; empty for every file.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Price => PRICE_PREFIX,
            Self::Blocks => BLOCKS_PREFIX,
            Self::Mempool => MEMPOOL_PREFIX,
            Self::All => "",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownExportKind;

impl fmt::Display for UnknownExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown export kind (expected PRICE, BLOCKS, MEMPOOL or ALL)")
    }
}

impl FromStr for ExportKind {
    type Err = UnknownExportKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Price, Self::Blocks, Self::Mempool, Self::All]
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(UnknownExportKind)
    }
}

/// What an export streamed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub files: usize,
    pub lines: usize,
    pub bytes: u64,
}

fn sink_err(e: io::Error) -> StorageError {
    log::warn!("Export sink failed: {}", e);
    StorageError::IoError
}

impl<S: StoragePort, C: ClockPort, D: DelayNs> PersistentLogger<S, C, D> {
    /// Stream every file in `category` accepted by `predicate` to `sink`,
    /// in file-name order, each preceded by a `--- FILE: <name> ---` line.
    /// Read-only.
    pub fn export_all<W: io::Write>(
        &self,
        category: LogCategory,
        predicate: impl Fn(&str) -> bool,
        sink: &mut W,
    ) -> Result<ExportSummary, StorageError> {
        self.export_all_with(category, predicate, sink, &mut || {})
    }

    /// [`export_all`](Self::export_all), calling `keepalive` after every
    /// chunk so a long export can feed the watchdog.
    pub fn export_all_with<W: io::Write>(
        &self,
        category: LogCategory,
        predicate: impl Fn(&str) -> bool,
        sink: &mut W,
        keepalive: &mut impl FnMut(),
    ) -> Result<ExportSummary, StorageError> {
        if !self.is_ready() {
            return Err(StorageError::NotPresent);
        }
        let dir = category.dir();
        let mut names: Vec<String> = self
            .storage()
            .list(dir)?
            .into_iter()
            .filter(|n| predicate(n))
            .collect();
        names.sort();

        let mut summary = ExportSummary::default();
        let mut chunk = [0u8; CHUNK];
        for name in names {
            let path = layout::join(dir, &name);
            keepalive();
            writeln!(sink, "--- FILE: {} ---", name).map_err(sink_err)?;

            let mut offset = 0u64;
            let mut ends_with_newline = true;
            loop {
                let n = self.storage().read_at(&path, offset, &mut chunk)?;
                if n == 0 {
                    break;
                }
                let data = &chunk[..n];
                sink.write_all(data).map_err(sink_err)?;
                summary.lines += data.iter().filter(|&&b| b == b'\n').count();
                ends_with_newline = data[n - 1] == b'\n';
                offset += n as u64;
                keepalive();
            }
            if !ends_with_newline {
                sink.write_all(b"\n").map_err(sink_err)?;
                summary.lines += 1;
            }
            summary.files += 1;
            summary.bytes += offset;
        }
        Ok(summary)
    }

    /// Export one CSV series (or all of them) framed by start and end
    /// markers.
    pub fn export_data<W: io::Write>(
        &self,
        kind: ExportKind,
        sink: &mut W,
    ) -> Result<ExportSummary, StorageError> {
        self.export_data_with(kind, sink, || {})
    }

    /// [`export_data`](Self::export_data) with a per-chunk `keepalive`.
    pub fn export_data_with<W: io::Write>(
        &self,
        kind: ExportKind,
        sink: &mut W,
        mut keepalive: impl FnMut(),
    ) -> Result<ExportSummary, StorageError> {
        if !self.is_ready() {
            return Err(StorageError::NotPresent);
        }
        writeln!(sink, "=== EXPORT START: {} ===", kind).map_err(sink_err)?;
        let prefix = kind.prefix();
        let summary =
            self.export_all_with(LogCategory::Data, |n| n.starts_with(prefix), sink, &mut keepalive)?;
        writeln!(
            sink,
            "=== EXPORT END: {} ({} files, {} lines) ===",
            kind, summary.files, summary.lines
        )
        .map_err(sink_err)?;
        Ok(summary)
    }
}
