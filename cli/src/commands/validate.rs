//! Disruption document validation

use anyhow::{Context, Result};
use chaos_controller::DisruptionDocument;
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ValidateArgs {
    /// Disruption document (YAML or JSON)
    #[arg(short, long)]
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationReport {
    name: String,
    namespace: String,
    level: String,
    kind: String,
    count: u32,
    duration: String,
    selector: BTreeMap<String, String>,
    allow_empty_selection: bool,
    valid: bool,
}

impl ValidationReport {
    fn new(document: &DisruptionDocument) -> Self {
        let key = document.key();
        let spec = &document.spec;
        Self {
            name: key.name,
            namespace: key.namespace,
            level: spec.level.to_string(),
            kind: spec.kind.to_string(),
            count: spec.count,
            duration: output::format_duration(spec.duration),
            selector: spec.selector.clone(),
            allow_empty_selection: spec.allow_empty_selection,
            valid: true,
        }
    }
}

/// Parse and validate the document at `path`.
pub fn load(path: &Path) -> Result<DisruptionDocument> {
    let document = DisruptionDocument::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    document
        .validate()
        .with_context(|| format!("{} is not a valid disruption", path.display()))?;
    Ok(document)
}

pub fn execute(args: ValidateArgs, format: OutputFormat) -> Result<()> {
    let document = load(&args.path)?;
    let report = ValidationReport::new(&document);

    if format.is_structured() {
        return output::print_structured(&report, format);
    }

    output::success(format!("{} is valid", args.path.display()));
    output::print_kv("Disruption", document.key());
    output::print_kv("Level", &report.level);
    output::print_kv("Fault", &report.kind);
    output::print_kv("Count", report.count);
    output::print_kv("Duration", &report.duration);
    output::print_kv("Selector", document.spec.label_selector());
    if report.allow_empty_selection {
        output::warning("an empty selection completes without injecting anything");
    }
    Ok(())
}
