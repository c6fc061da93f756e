//! Job name sanitization as applied by the log service.
//!
//! The service strips characters that are not allowed in file paths from a
//! job's display name and caps it at 90 UTF-16 code units before using it as
//! the archive directory name. Names supplied by users are not sanitized, so
//! lookups have to apply the same transform.

/// Longest job directory name, in UTF-16 code units
pub const JOB_NAME_MAX_UTF16_LEN: usize = 90;

const DISALLOWED: [char; 9] = ['/', ':', '*', '?', '<', '>', '|', '"', '\\'];

/// Apply the service's job name transform.
pub fn sanitize_job_name(name: &str) -> String {
    let mut sanitized: String = name.chars().filter(|c| !DISALLOWED.contains(c)).collect();
    let len = truncate_utf16(&sanitized, JOB_NAME_MAX_UTF16_LEN).len();
    sanitized.truncate(len);
    sanitized
}

/// Longest prefix of `s` that fits in `max_units` UTF-16 code units.
///
/// Cuts only on character boundaries, so a surrogate pair is either kept
/// whole or dropped.
pub fn truncate_utf16(s: &str, max_units: usize) -> &str {
    let mut units = 0;
    for (idx, c) in s.char_indices() {
        units += c.len_utf16();
        if units > max_units {
            return &s[..idx];
        }
    }
    s
}
