use crate::joblog::JobLog;
use crate::metadata;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions of files worth scanning for filename references.
const TEXT_EXTENSIONS: [&str; 5] = [".txt", ".md", ".html", ".json", ".xml"];

/// Map an on-disk filename back to its registry content key.
///
/// Registry keys carry the `@` of the content key; the on-disk name escapes
/// it to `_`. The match is the key whose own `@` to `_` transform equals the
/// on-disk name. No match, or no loadable registry, means the name is
/// already canonical and comes back unchanged.
pub fn resolve_logical_name(asset_registry: &Path, on_disk_name: &str) -> String {
    let Ok(document) = metadata::load_document(asset_registry) else {
        return on_disk_name.to_string();
    };
    let Some(map) = document.as_object() else {
        return on_disk_name.to_string();
    };

    map.keys()
        .find(|key| key.replace('@', "_") == on_disk_name)
        .cloned()
        .unwrap_or_else(|| on_disk_name.to_string())
}

/// Collect every text-bearing file under `course_root` whose content
/// mentions `logical_name`, case-insensitively.
///
/// Hidden files and the asset registry itself are never counted as
/// references. Files that cannot be read as text are logged and skipped.
pub fn find_references(logical_name: &str, course_root: &Path, log: &JobLog) -> Vec<PathBuf> {
    let needle = logical_name.to_lowercase();
    let mut matches = Vec::new();

    for entry in WalkDir::new(course_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.starts_with('.') || name == "assets.json" {
            continue;
        }
        if !TEXT_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            continue;
        }

        match fs::read_to_string(entry.path()) {
            Ok(content) => {
                if content.to_lowercase().contains(&needle) {
                    matches.push(entry.into_path());
                }
            }
            Err(error) => {
                log.error(&format!(
                    "Could not read file {}: {error}",
                    entry.path().display()
                ));
            }
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_log(dir: &TempDir) -> JobLog {
        JobLog::create(&dir.path().join("test.log"), false).unwrap()
    }

    #[test]
    fn test_resolve_escaped_key() {
        let tmp = TempDir::new().unwrap();
        let registry = tmp.path().join("assets.json");
        fs::write(
            &registry,
            json!({"photo@2x.jpg": {"contentType": "image/jpeg"}}).to_string(),
        )
        .unwrap();

        assert_eq!(
            resolve_logical_name(&registry, "photo_2x.jpg"),
            "photo@2x.jpg"
        );
    }

    #[test]
    fn test_resolve_without_match_returns_input() {
        let tmp = TempDir::new().unwrap();
        let registry = tmp.path().join("assets.json");
        fs::write(&registry, json!({"other.png": {}}).to_string()).unwrap();

        assert_eq!(resolve_logical_name(&registry, "photo.png"), "photo.png");
    }

    #[test]
    fn test_resolve_with_missing_registry() {
        let tmp = TempDir::new().unwrap();
        let registry = tmp.path().join("assets.json");

        assert_eq!(resolve_logical_name(&registry, "photo.png"), "photo.png");
    }

    #[test]
    fn test_resolve_exact_key_without_escape() {
        let tmp = TempDir::new().unwrap();
        let registry = tmp.path().join("assets.json");
        fs::write(&registry, json!({"plain.png": {}}).to_string()).unwrap();

        assert_eq!(resolve_logical_name(&registry, "plain.png"), "plain.png");
    }

    #[test]
    fn test_find_references_scans_allowed_extensions_only() {
        let tmp = TempDir::new().unwrap();
        let course = tmp.path().join("course");
        fs::create_dir_all(course.join("chapter")).unwrap();

        fs::write(
            course.join("chapter").join("page.html"),
            "<img src=\"/static/photo.png\">",
        )
        .unwrap();
        fs::write(course.join("notes.txt"), "see photo.png here").unwrap();
        fs::write(course.join("data.bin"), "photo.png").unwrap();

        let log = test_log(&tmp);
        let mut found = find_references("photo.png", &course, &log);
        found.sort();

        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|p| p.ends_with("chapter/page.html")));
        assert!(found.iter().any(|p| p.ends_with("notes.txt")));
    }

    #[test]
    fn test_find_references_is_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        let course = tmp.path().join("course");
        fs::create_dir_all(&course).unwrap();
        fs::write(course.join("page.md"), "![banner](/static/Photo.PNG)").unwrap();

        let log = test_log(&tmp);
        let found = find_references("photo.png", &course, &log);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_find_references_skips_registry_and_hidden_files() {
        let tmp = TempDir::new().unwrap();
        let course = tmp.path().join("course");
        fs::create_dir_all(course.join("policies")).unwrap();

        fs::write(
            course.join("policies").join("assets.json"),
            json!({"banner.png": {"filename": "/static/banner.png"}}).to_string(),
        )
        .unwrap();
        fs::write(course.join(".hidden.txt"), "banner.png").unwrap();

        let log = test_log(&tmp);
        let found = find_references("banner.png", &course, &log);
        assert!(found.is_empty());
    }

    #[test]
    fn test_find_references_policy_document_counts() {
        let tmp = TempDir::new().unwrap();
        let course = tmp.path().join("course");
        fs::create_dir_all(course.join("policies")).unwrap();
        fs::write(
            course.join("policies").join("policy.json"),
            json!({"course_image": "logo.png"}).to_string(),
        )
        .unwrap();

        let log = test_log(&tmp);
        let found = find_references("logo.png", &course, &log);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_unreadable_file_is_logged_and_skipped() {
        let tmp = TempDir::new().unwrap();
        let course = tmp.path().join("course");
        fs::create_dir_all(&course).unwrap();
        fs::write(course.join("valid.txt"), "mentions photo.png").unwrap();
        fs::write(course.join("binary.txt"), [0xFFu8, 0xFE, 0x00, 0x80]).unwrap();

        let log_path = tmp.path().join("scan.log");
        let log = JobLog::create(&log_path, false).unwrap();
        let found = find_references("photo.png", &course, &log);

        assert_eq!(found.len(), 1);
        let logged = fs::read_to_string(&log_path).unwrap();
        assert!(logged.contains("Could not read file"));
        assert!(logged.contains("binary.txt"));
    }
}
