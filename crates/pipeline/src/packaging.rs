//! Enumerate produced stems and bundle them into the delivery archive.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use mixbuster_core::hashing::sha256_file;
use mixbuster_core::naming::{archive_name, is_output_file};

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("Failed to read outputs in {dir}: {source}")]
    Scan {
        dir: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write archive {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write archive {path}: {source}")]
    Zip {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("No output files to package")]
    Empty,
}

/// A written archive and what went into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub path: PathBuf,
    /// Entry names, sorted.
    pub files: Vec<String>,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Output files directly inside `dir`, sorted by name.
///
/// Only stem extensions count; `exclude` names (the staged input) are
/// skipped even when they carry one.
pub fn list_outputs(dir: &Path, exclude: &[&str]) -> Result<Vec<String>, PackagingError> {
    let scan_err = |source| PackagingError::Scan {
        dir: dir.display().to_string(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        if !entry.file_type().map_err(scan_err)?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if is_output_file(&name) && !exclude.contains(&name.as_str()) {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

/// Zip the outputs of `dir` into `<dir>/<job_id>-mixbusted.zip`.
///
/// Entries are stored flat under their base names with deflate
/// compression. Blocking; run it on the blocking pool.
pub fn package_outputs(
    dir: &Path,
    job_id: &str,
    input_filename: &str,
) -> Result<PackagedArchive, PackagingError> {
    let archive = archive_name(job_id);
    let files = list_outputs(dir, &[input_filename, &archive])?;
    if files.is_empty() {
        return Err(PackagingError::Empty);
    }

    let path = dir.join(&archive);
    let write_err = |source| PackagingError::Write {
        path: path.display().to_string(),
        source,
    };
    let zip_err = |source| PackagingError::Zip {
        path: path.display().to_string(),
        source,
    };

    let out = File::create(&path).map_err(write_err)?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for name in &files {
        writer.start_file(name.as_str(), options).map_err(zip_err)?;
        let mut input = BufReader::new(File::open(dir.join(name)).map_err(write_err)?);
        io::copy(&mut input, &mut writer).map_err(write_err)?;
    }
    writer.finish().map_err(zip_err)?;

    let size_bytes = std::fs::metadata(&path).map_err(write_err)?.len();
    let sha256 = sha256_file(&path).map_err(write_err)?;

    tracing::info!(
        job_id,
        archive = %path.display(),
        entries = files.len(),
        size_bytes,
        "Outputs packaged"
    );

    Ok(PackagedArchive {
        path,
        files,
        size_bytes,
        sha256,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use assert_matches::assert_matches;

    use super::*;

    fn work_area() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [
            ("song.mp3", "input"),
            ("song_(Vocals).wav", "vocals"),
            ("song_(Instrumental).WAV", "inst"),
            ("notes.txt", "log"),
        ] {
            std::fs::write(dir.path().join(name), body).unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.wav")).unwrap();
        dir
    }

    // -- list_outputs --------------------------------------------------------

    #[test]
    fn lists_only_stems_excluding_input() {
        let dir = work_area();
        let files = list_outputs(dir.path(), &["song.mp3"]).unwrap();
        assert_eq!(files, vec!["song_(Instrumental).WAV", "song_(Vocals).wav"]);
    }

    #[test]
    fn missing_dir_is_scan_error() {
        assert_matches!(
            list_outputs(Path::new("/nonexistent/work"), &[]),
            Err(PackagingError::Scan { .. })
        );
    }

    // -- package_outputs -----------------------------------------------------

    #[test]
    fn archive_contains_sorted_flat_entries() {
        let dir = work_area();
        let packaged = package_outputs(dir.path(), "job-9", "song.mp3").unwrap();

        assert_eq!(packaged.path, dir.path().join("job-9-mixbusted.zip"));
        assert_eq!(packaged.sha256.len(), 64);

        let mut archive = zip::ZipArchive::new(File::open(&packaged.path).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(sorted, packaged.files);

        let mut vocals = String::new();
        archive
            .by_name("song_(Vocals).wav")
            .unwrap()
            .read_to_string(&mut vocals)
            .unwrap();
        assert_eq!(vocals, "vocals");
    }

    #[test]
    fn repackaging_skips_previous_archive() {
        let dir = work_area();
        package_outputs(dir.path(), "job-9", "song.mp3").unwrap();
        let again = package_outputs(dir.path(), "job-9", "song.mp3").unwrap();
        assert_eq!(again.files.len(), 2);
    }

    #[test]
    fn nothing_to_package_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("song.wav"), b"input").unwrap();
        assert_matches!(
            package_outputs(dir.path(), "job-1", "song.wav"),
            Err(PackagingError::Empty)
        );
    }
}
