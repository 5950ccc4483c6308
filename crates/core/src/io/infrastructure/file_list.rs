use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `files` to `path`, one per line, replacing any existing file.
pub fn write_file_list(path: &Path, files: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut out = std::io::BufWriter::new(fs::File::create(path)?);
    for file in files {
        writeln!(out, "{}", file.display())?;
    }
    out.flush()?;
    log::info!("Wrote {} file names to {}", files.len(), path.display());
    Ok(())
}
