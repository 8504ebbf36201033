mod bucket;

pub use bucket::{BucketClient, MAX_OBJECT_BYTES};

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"))
}

/// Reduces a user-supplied name to characters that are safe in an object path.
pub fn sanitize(name: &str) -> String {
    let cleaned = unsafe_chars().replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches(|c| c == '_' || c == '.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Per-submission folder, e.g. `20260201_Tariro_Moyo_1a2b3c4d`.
pub fn generate_folder_name(name: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}",
        at.format("%Y%m%d"),
        sanitize(name),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

/// `index` is the file's position in the submission, so names that sanitize
/// to the same string still land on distinct objects.
pub fn object_path(folder: &str, perspective_key: &str, index: usize, filename: &str) -> String {
    format!("{}/{}/{:02}_{}", folder, perspective_key, index, sanitize(filename))
}

pub fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sanitize_strips_path_tricks() {
        assert_eq!(sanitize("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize("Q3 report (final).pdf"), "Q3_report_final_.pdf");
        assert_eq!(sanitize("   "), "file");
    }

    #[test]
    fn folder_name_has_date_and_suffix() {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        let folder = generate_folder_name("Tariro Moyo", at);
        assert!(folder.starts_with("20260201_Tariro_Moyo_"));
        assert_eq!(folder.len(), "20260201_Tariro_Moyo_".len() + 8);
    }

    #[test]
    fn object_path_nests_by_perspective() {
        assert_eq!(
            object_path("20260201_x_abcd1234", "financial", 0, "fuel savings.xlsx"),
            "20260201_x_abcd1234/financial/00_fuel_savings.xlsx"
        );
    }

    #[test]
    fn colliding_names_get_distinct_paths() {
        let folder = "20260201_x_abcd1234";
        let first = object_path(folder, "financial", 0, "a b.pdf");
        let second = object_path(folder, "financial", 1, "a_b.pdf");
        let third = object_path(folder, "financial", 2, "a b.pdf");
        assert_ne!(first, second);
        assert_ne!(first, third);
        assert_ne!(second, third);
    }

    #[test]
    fn content_type_falls_back_to_octet_stream() {
        assert_eq!(guess_content_type("evidence.pdf"), "application/pdf");
        assert_eq!(guess_content_type("evidence.unknownext"), "application/octet-stream");
    }
}
