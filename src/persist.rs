//! One file per trace, named `<timestamp>.<NET.STA.LOC.CHA>.<ext>`.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::{FileNameFormat, OutputFormat};
use crate::mseed::MS3Record;
use crate::sac;
use crate::trace::Trace;

pub trait TraceWriter {
    /// Writes `trace` below `dir` and returns the path written.
    fn write(&mut self, trace: &Trace, format: &FileNameFormat, dir: &Path) -> anyhow::Result<PathBuf>;
}

/// File name of `trace`, the timestamp taken from its start time.
pub fn file_name(trace: &Trace, format: &FileNameFormat, extension: &str) -> String {
    format!(
        "{}.{}.{}",
        trace.start_time.format(format.pattern()),
        trace.id,
        extension
    )
}

/// Writes SAC or miniSEED 3 files to disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileWriter {
    format: OutputFormat,
}

impl FileWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

impl TraceWriter for FileWriter {
    fn write(&mut self, trace: &Trace, format: &FileNameFormat, dir: &Path) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(file_name(trace, format, self.format.extension()));
        let file = fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        let mut out = BufWriter::new(file);
        match self.format {
            OutputFormat::Sac => sac::write(trace, &mut out)?,
            OutputFormat::MiniSeed3 => {
                let bytes = MS3Record::from_trace(trace)?.to_bytes()?;
                out.write_all(&bytes)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        out.flush().with_context(|| format!("flushing {}", path.display()))?;
        log::info!("wrote {}", path.display());
        Ok(path)
    }
}
