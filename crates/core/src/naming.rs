//! Naming rules for job identifiers, archives and user-supplied filenames.
//!
//! Job IDs become directory names and object keys, so they are restricted to
//! a path-safe alphabet before they ever touch the filesystem.

use crate::error::CoreError;

/// Maximum length of a caller-supplied job ID.
const MAX_JOB_ID_LEN: usize = 128;

/// Suffix appended to the job ID to form the delivered archive name.
pub const ARCHIVE_SUFFIX: &str = "-mixbusted.zip";

/// Extensions of files considered separation output.
pub const OUTPUT_EXTENSIONS: &[&str] = &["wav", "mp3", "flac"];

/// Validate a job ID: non-empty, bounded, alphanumeric plus `-` and `_`.
///
/// Rejecting `.`, `/` and `\` rules out traversal (`..`) and nested paths.
pub fn validate_job_id(job_id: &str) -> Result<(), CoreError> {
    if job_id.is_empty() {
        return Err(CoreError::Validation("Job ID must not be empty".to_string()));
    }
    if job_id.len() > MAX_JOB_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Job ID must not exceed {MAX_JOB_ID_LEN} characters"
        )));
    }
    if !job_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(
            "Job ID may only contain ASCII alphanumeric, hyphen, or underscore characters"
                .to_string(),
        ));
    }
    Ok(())
}

/// Generate a fresh job ID.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Deterministic archive name for a job's packaged outputs.
pub fn archive_name(job_id: &str) -> String {
    format!("{job_id}{ARCHIVE_SUFFIX}")
}

/// Reduce a user-supplied filename to a safe base name.
///
/// Directory components are stripped (both `/` and `\` separators) and the
/// names `.`/`..` are rejected. Returns `None` when nothing usable remains.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();
    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return None;
    }
    Some(base.to_string())
}

/// Whether `filename` has one of the [`OUTPUT_EXTENSIONS`] (case-insensitive).
pub fn is_output_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            OUTPUT_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- validate_job_id -----------------------------------------------------

    #[test]
    fn uuid_job_ids_are_valid() {
        assert!(validate_job_id(&new_job_id()).is_ok());
    }

    #[test]
    fn traversal_characters_rejected() {
        assert!(validate_job_id("../etc").is_err());
        assert!(validate_job_id("a/b").is_err());
        assert!(validate_job_id("a\\b").is_err());
        assert!(validate_job_id("job.1").is_err());
    }

    #[test]
    fn empty_and_oversized_ids_rejected() {
        assert!(validate_job_id("").is_err());
        assert!(validate_job_id(&"a".repeat(MAX_JOB_ID_LEN + 1)).is_err());
        assert!(validate_job_id(&"a".repeat(MAX_JOB_ID_LEN)).is_ok());
    }

    #[test]
    fn new_job_ids_are_distinct() {
        assert_ne!(new_job_id(), new_job_id());
    }

    // -- archive_name --------------------------------------------------------

    #[test]
    fn archive_name_is_derived_from_job_id() {
        assert_eq!(archive_name("abc-123"), "abc-123-mixbusted.zip");
    }

    // -- sanitize_filename ---------------------------------------------------

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("song.mp3").as_deref(), Some("song.mp3"));
        assert_eq!(
            sanitize_filename("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_filename("C:\\music\\track.wav").as_deref(),
            Some("track.wav")
        );
    }

    #[test]
    fn sanitize_rejects_empty_and_dot_names() {
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename(".."), None);
    }

    // -- is_output_file ------------------------------------------------------

    #[test]
    fn output_extensions_match_case_insensitively() {
        assert!(is_output_file("a_(Vocals).wav"));
        assert!(is_output_file("b.FLAC"));
        assert!(is_output_file("c.Mp3"));
        assert!(!is_output_file("notes.txt"));
        assert!(!is_output_file("job-mixbusted.zip"));
        assert!(!is_output_file(".wav"));
    }
}
