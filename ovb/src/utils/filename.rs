//! Sanitizing attachment names before they touch the workspace.
//!
//! Attachment names come from remote users. A staged file must land directly
//! inside the job directory, so directory components are dropped and anything
//! a filesystem could interpret specially is replaced.

/// Characters that are invalid in Windows filenames
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Upper bound on a staged name, in bytes. Most filesystems cap at 255.
const MAX_NAME_BYTES: usize = 200;

const FALLBACK_STEM: &str = "input";

/// Produce a name that is safe to join onto the job directory.
///
/// Only the final path component of `name` is kept. The extension is
/// preserved so media classification still works on the staged file.
///
/// ```
/// use ovb::utils::filename::staged_file_name;
///
/// assert_eq!(staged_file_name("../../etc/passwd"), "passwd");
/// assert_eq!(staged_file_name("my clip?.mp4"), "my clip_.mp4");
/// assert_eq!(staged_file_name("CON.png"), "_CON.png");
/// assert_eq!(staged_file_name(".."), "input");
/// ```
pub fn staged_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = replace_invalid(base);
    let trimmed = cleaned.trim_matches(|c| c == ' ' || c == '.');

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        return FALLBACK_STEM.to_string();
    }

    let guarded = guard_reserved(trimmed);
    truncate_keeping_extension(&guarded, MAX_NAME_BYTES)
}

fn replace_invalid(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }
    result
}

fn guard_reserved(name: &str) -> String {
    let upper = name.to_uppercase();
    let stem = upper.split('.').next().unwrap_or_default();
    if RESERVED_NAMES.contains(&stem) {
        format!("_{}", name)
    } else {
        name.to_string()
    }
}

fn truncate_keeping_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 && name.len() - idx <= 16 => name.split_at(idx),
        _ => (name, ""),
    };

    let budget = max_bytes.saturating_sub(ext.len());
    let mut cut = budget.min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], ext)
}
