//! Export of a finished run: redacted text plus its mapping file.

use crate::canonical::{counts_by_type, total_redactions, CanonicalMap};
use crate::coordinator::SessionView;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const FALLBACK_BASE: &str = "scrubchef_output";

/// Output and map of one successful result.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportBundle {
    pub output: String,
    pub map: CanonicalMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportPaths {
    pub redacted: PathBuf,
    pub mapping: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MappingFile<'a> {
    source: &'a str,
    generated_at: String,
    total_redactions: u64,
    counts_by_type: BTreeMap<String, u64>,
    map: &'a CanonicalMap,
}

impl ExportBundle {
    /// Nothing to export while the view shows an error or no output.
    pub fn from_view(view: &SessionView) -> Option<Self> {
        if view.error.is_some() || view.output.is_empty() {
            return None;
        }
        Some(Self {
            output: view.output.clone(),
            map: view.map.clone(),
        })
    }
}

/// Input file stem, or a fixed name for pasted text.
pub fn base_name(input_name: Option<&str>) -> String {
    input_name
        .map(Path::new)
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_BASE.to_string())
}

pub fn export_file_names(input_name: Option<&str>, now: NaiveDateTime) -> (String, String) {
    let base = base_name(input_name);
    let ts = now.format("%Y-%m-%dT%H-%M-%S");
    (
        format!("{}_redacted_{}.txt", base, ts),
        format!("{}_mapping_{}.json", base, ts),
    )
}

pub fn write_export(
    dir: &Path,
    bundle: &ExportBundle,
    input_name: Option<&str>,
    now: NaiveDateTime,
) -> Result<ExportPaths> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;
    let (redacted_name, mapping_name) = export_file_names(input_name, now);
    let paths = ExportPaths {
        redacted: dir.join(redacted_name),
        mapping: dir.join(mapping_name),
    };

    std::fs::write(&paths.redacted, &bundle.output)
        .with_context(|| format!("Failed to write {}", paths.redacted.display()))?;

    let mapping = MappingFile {
        source: input_name.unwrap_or(FALLBACK_BASE),
        generated_at: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        total_redactions: total_redactions(&bundle.map),
        counts_by_type: counts_by_type(&bundle.map),
        map: &bundle.map,
    };
    let json = serde_json::to_string_pretty(&mapping).context("Failed to encode mapping")?;
    std::fs::write(&paths.mapping, json)
        .with_context(|| format!("Failed to write {}", paths.mapping.display()))?;

    tracing::info!(
        redacted = %paths.redacted.display(),
        mapping = %paths.mapping.display(),
        total = mapping.total_redactions,
        "export written"
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalMapEntry;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 5, 7)
            .unwrap()
    }

    fn view_with_output(output: &str) -> SessionView {
        let mut map = CanonicalMap::default();
        map.canonical.insert(
            "k1".to_string(),
            CanonicalMapEntry {
                id: "EMAIL_1".to_string(),
                kind: "email".to_string(),
                original: "a@b.io".to_string(),
                occurrences: 2,
                context_before: None,
                context_after: None,
                method: Some("regex".to_string()),
            },
        );
        SessionView {
            output: output.to_string(),
            map,
            ..Default::default()
        }
    }

    #[test]
    fn test_file_names() {
        let (txt, json) = export_file_names(Some("server.log"), noon());
        assert_eq!(txt, "server_redacted_2024-03-09T12-05-07.txt");
        assert_eq!(json, "server_mapping_2024-03-09T12-05-07.json");
        let (txt, _) = export_file_names(None, noon());
        assert!(txt.starts_with("scrubchef_output_redacted_"));
    }

    #[test]
    fn test_no_bundle_for_error_or_empty_view() {
        let mut view = view_with_output("<EMAIL_1>");
        assert!(ExportBundle::from_view(&view).is_some());
        view.error = Some("boom".to_string());
        assert!(ExportBundle::from_view(&view).is_none());
        assert!(ExportBundle::from_view(&SessionView::default()).is_none());
    }

    #[test]
    fn test_write_export() {
        let dir = tempfile::tempdir().unwrap();
        // Missing output directories are created.
        let out = dir.path().join("exports");
        let bundle = ExportBundle::from_view(&view_with_output("hi <EMAIL_1>")).unwrap();
        let paths = write_export(&out, &bundle, Some("app.txt"), noon()).unwrap();

        assert_eq!(std::fs::read_to_string(&paths.redacted).unwrap(), "hi <EMAIL_1>");
        let mapping: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.mapping).unwrap()).unwrap();
        assert_eq!(mapping["source"], "app.txt");
        assert_eq!(mapping["totalRedactions"], 2);
        assert_eq!(mapping["countsByType"]["email"], 2);
        assert_eq!(mapping["map"]["canonical"]["k1"]["original"], "a@b.io");
    }
}
