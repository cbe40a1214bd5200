use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use studio_contracts::runs::{write_summary, RunResultSet, RunSummary};

#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub summary_path: PathBuf,
}

/// Writes every succeeded task as `portrait-<slug>-<millis>.<ext>` and a
/// `summary.json` covering the whole set, failures included. `cancelled`
/// comes from the run report, never from task error text.
pub fn export_results(
    results: &RunResultSet,
    out_dir: &Path,
    run_id: &str,
    started_at: &str,
    client: &str,
    cancelled: bool,
) -> Result<ExportReport> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed creating {}", out_dir.display()))?;

    let mut summary = RunSummary::from_results(run_id, started_at, results, cancelled);
    let mut written = Vec::new();
    let mut last_millis = 0_i64;

    for task in results.iter() {
        let Some(image) = task.result_image() else {
            continue;
        };
        let bytes = image
            .decode()
            .with_context(|| format!("task {} carries invalid base64", task.id))?;
        // Several exports can land in the same millisecond.
        let millis = chrono::Utc::now().timestamp_millis().max(last_millis + 1);
        last_millis = millis;
        let file_name = format!(
            "portrait-{}-{millis}.{}",
            slugify(&task.display_name),
            image.extension()
        );
        let path = out_dir.join(&file_name);
        fs::write(&path, &bytes).with_context(|| format!("failed writing {}", path.display()))?;
        summary.attach_file(&task.id, file_name);
        written.push(path);
    }

    let summary_path = out_dir.join("summary.json");
    let mut extra = Map::new();
    extra.insert("client".to_string(), json!(client));
    extra.insert(
        "out_dir".to_string(),
        Value::String(out_dir.to_string_lossy().to_string()),
    );
    write_summary(&summary_path, &summary, Some(&extra))?;

    Ok(ExportReport {
        written,
        summary_path,
    })
}

/// Lowercases and joins alphanumeric runs with `-`; "Navy Suit & Tie"
/// becomes `navy-suit-tie`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "image".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::Value;
    use studio_contracts::image::EncodedImage;
    use studio_contracts::runs::{GenerationTask, RunResultSet};

    use super::{export_results, slugify};

    #[test]
    fn slugs_are_lowercase_and_dash_joined() {
        assert_eq!(slugify("Navy Suit & Tie"), "navy-suit-tie");
        assert_eq!(slugify("  Custom Edit  "), "custom-edit");
        assert_eq!(slugify("Café Crème"), "café-crème");
        assert_eq!(slugify("***"), "image");
    }

    #[test]
    fn export_writes_succeeded_images_and_summary() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut results = RunResultSet::from_tasks(vec![
            GenerationTask::pending("custom-1", "add sunglasses", "Custom Edit"),
            GenerationTask::pending("custom-2", "add a hat", "Custom Edit"),
            GenerationTask::pending("suit-navy", "navy suit", "Navy Suit"),
        ]);
        results.succeed("custom-1", EncodedImage::from_bytes("image/png", b"one"))?;
        results.succeed("custom-2", EncodedImage::from_bytes("image/jpeg", b"two"))?;
        results.fail("suit-navy", "Rate limit exceeded")?;

        let report = export_results(
            &results,
            temp.path(),
            "run-1",
            "2026-01-01T00:00:00Z",
            "dryrun",
            false,
        )?;
        assert_eq!(report.written.len(), 2);

        let names: Vec<String> = report
            .written
            .iter()
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        assert!(names[0].starts_with("portrait-custom-edit-") && names[0].ends_with(".png"));
        assert!(names[1].starts_with("portrait-custom-edit-") && names[1].ends_with(".jpg"));
        assert_ne!(names[0], names[1]);
        assert_eq!(fs::read(&report.written[1])?, b"two");

        let summary: Value = serde_json::from_str(&fs::read_to_string(&report.summary_path)?)?;
        assert_eq!(summary["run_id"], "run-1");
        assert_eq!(summary["succeeded"], 2);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["cancelled"], false);
        assert_eq!(summary["client"], "dryrun");
        assert_eq!(summary["tasks"][0]["file"], Value::String(names[0].clone()));
        assert_eq!(summary["tasks"][2]["error"], "Rate limit exceeded");
        assert!(summary["tasks"][2]["file"].is_null());
        Ok(())
    }

    #[test]
    fn cancelled_flag_follows_the_run_not_error_text() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut results = RunResultSet::from_tasks(vec![GenerationTask::pending(
            "custom-1",
            "add sunglasses",
            "Custom Edit",
        )]);
        results.fail("custom-1", "Cancelled")?;

        let report = export_results(&results, temp.path(), "run-1", "now", "gemini", false)?;
        let summary: Value = serde_json::from_str(&fs::read_to_string(&report.summary_path)?)?;
        assert_eq!(summary["cancelled"], false);

        let report = export_results(&results, temp.path(), "run-1", "now", "gemini", true)?;
        let summary: Value = serde_json::from_str(&fs::read_to_string(&report.summary_path)?)?;
        assert_eq!(summary["cancelled"], true);
        Ok(())
    }
}
