use std::process::Command;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info};

use crate::cli::{ImportArgs, SourceFormat};
use crate::country::primary_prefix;
use crate::extract::csv::CsvRoster;
use crate::extract::excel::ExcelRoster;
use crate::extract::pdf::PdfRoster;
use crate::extract::{ExtractContext, RosterExtractor};
use crate::model::{ImportCounts, ImportPaths, ImportRunManifest, RosterSource, ToolVersions};
use crate::normalize::normalize_ascii;
use crate::reconcile::{AbsenceScope, ReconcileOptions, reconcile};
use crate::registry::{DB_SCHEMA_VERSION, Registry};
use crate::util::{ensure_directory, now_utc_string, sha256_file, utc_compact_string};

pub fn run(args: ImportArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| cache_root.join("callbook_registry.sqlite"));
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("import_run_{}.json", utc_compact_string(started_ts)))
    });

    let format = resolve_format(&args)?;
    info!(
        source = %args.source.display(),
        format = format.as_str(),
        run_id = %run_id,
        "starting import"
    );

    let sha256 = sha256_file(&args.source)?;

    let extractor = build_extractor(format, &args);
    let progress = |current: i64, total: i64| {
        debug!(current, total, "extraction progress");
    };
    let context = ExtractContext {
        progress: Some(&progress),
        cancel: None,
    };
    let outcome = extractor.extract(&args.source, &context)?;

    let batch_country = args
        .country
        .as_deref()
        .map(normalize_ascii)
        .unwrap_or_else(|| outcome.country.clone());
    let absence_scope = resolve_absence_scope(args.absence_scope.as_deref(), format, &batch_country)?;

    info!(
        rows = outcome.rows.len(),
        skipped = outcome.rows_skipped,
        country = %batch_country,
        cutoff = %outcome
            .cutoff
            .map(|cutoff| cutoff.to_rfc3339())
            .unwrap_or_else(|| "none".to_string()),
        scope = %absence_scope.describe(),
        "extraction completed"
    );

    let mut registry = Registry::open(&db_path)?;
    let existing = registry.list_all()?;

    let plan = reconcile(
        &outcome.rows,
        &existing,
        &ReconcileOptions {
            cutoff: outcome.cutoff,
            absence_scope: absence_scope.clone(),
            now: Utc::now(),
        },
    );
    let counts = plan.counts;

    info!(
        total = counts.total,
        new = counts.new,
        updated = counts.updated,
        unchanged = counts.unchanged,
        disabled = counts.disabled,
        reenabled = counts.reenabled,
        protected = counts.protected,
        "reconciliation plan computed"
    );

    if args.dry_run {
        info!("dry-run requested, registry left untouched");
    } else {
        let written = registry
            .upsert_many(&plan.upserts)
            .context("failed to apply reconciliation plan to the registry")?;
        info!(written, "registry updated");
    }

    let manifest = ImportRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_import_command(&args),
        dry_run: args.dry_run,
        tool_versions: collect_tool_versions(),
        paths: ImportPaths {
            cache_root: cache_root.display().to_string(),
            manifest_dir: manifest_dir.display().to_string(),
            db_path: db_path.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        },
        source: RosterSource {
            path: args.source.display().to_string(),
            format: format.as_str().to_string(),
            sha256,
            country: batch_country,
            cutoff_at: outcome.cutoff,
        },
        absence_scope: absence_scope.describe(),
        counts: ImportCounts {
            rows_extracted: outcome.rows.len(),
            rows_skipped: outcome.rows_skipped,
            pages_processed: outcome.pages_processed,
            plan: counts,
        },
        warnings: outcome.warnings,
        notes: vec![
            "Import completed against the local sqlite registry.".to_string(),
            "Counters partition the incoming batch; disabled/protected cover the absence pass."
                .to_string(),
        ],
    };

    crate::util::write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote import run manifest");

    Ok(())
}

fn resolve_format(args: &ImportArgs) -> Result<SourceFormat> {
    if args.format != SourceFormat::Auto {
        return Ok(args.format);
    }

    let extension = args
        .source
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => Ok(SourceFormat::Pdf),
        "xlsx" | "xls" => Ok(SourceFormat::Xlsx),
        "csv" => Ok(SourceFormat::Csv),
        _ => bail!(
            "cannot infer source format of {}; pass --format",
            args.source.display()
        ),
    }
}

fn build_extractor(format: SourceFormat, args: &ImportArgs) -> Box<dyn RosterExtractor> {
    match format {
        SourceFormat::Pdf | SourceFormat::Auto => Box::new(PdfRoster {
            max_pages: args.max_pages,
        }),
        SourceFormat::Xlsx => Box::new(ExcelRoster {
            expected_country: args
                .country
                .as_deref()
                .map(normalize_ascii)
                .unwrap_or_else(|| "CHL".to_string()),
        }),
        SourceFormat::Csv => Box::new(CsvRoster),
    }
}

/// The disabling scope is source-specific policy, passed explicitly to
/// the engine. The derived defaults reproduce the historical behaviors:
/// a national PDF roster disables under its country's primary prefix, a
/// national spreadsheet under its country code, and a CSV export never
/// disables.
fn resolve_absence_scope(
    flag: Option<&str>,
    format: SourceFormat,
    country: &str,
) -> Result<AbsenceScope> {
    if let Some(flag) = flag {
        if flag.eq_ignore_ascii_case("none") {
            return Ok(AbsenceScope::None);
        }
        if let Some(prefix) = flag.strip_prefix("prefix:") {
            return Ok(AbsenceScope::CallsignPrefix(normalize_ascii(prefix)));
        }
        if let Some(code) = flag.strip_prefix("country:") {
            return Ok(AbsenceScope::Country(normalize_ascii(code)));
        }
        bail!("invalid --absence-scope value: {flag}");
    }

    let scope = match format {
        SourceFormat::Pdf | SourceFormat::Auto => primary_prefix(country)
            .map(|prefix| AbsenceScope::CallsignPrefix(prefix.to_string()))
            .unwrap_or(AbsenceScope::None),
        SourceFormat::Xlsx if !country.is_empty() => AbsenceScope::Country(country.to_string()),
        _ => AbsenceScope::None,
    };
    Ok(scope)
}

fn collect_tool_versions() -> ToolVersions {
    ToolVersions {
        rustc: command_version("rustc", &["--version"]).unwrap_or_else(|| "unknown".to_string()),
        cargo: command_version("cargo", &["--version"]).unwrap_or_else(|| "unknown".to_string()),
        pdftotext: command_version("pdftotext", &["-v"]),
    }
}

fn command_version(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}

fn render_import_command(args: &ImportArgs) -> String {
    let mut command = vec![
        "callbook".to_string(),
        "import".to_string(),
        args.source.display().to_string(),
        "--cache-root".to_string(),
        args.cache_root.display().to_string(),
    ];

    if let Some(path) = &args.db_path {
        command.push("--db-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.manifest_path {
        command.push("--manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if args.format != SourceFormat::Auto {
        command.push("--format".to_string());
        command.push(args.format.as_str().to_string());
    }
    if let Some(country) = &args.country {
        command.push("--country".to_string());
        command.push(country.clone());
    }
    if let Some(scope) = &args.absence_scope {
        command.push("--absence-scope".to_string());
        command.push(scope.clone());
    }
    if let Some(max_pages) = args.max_pages {
        command.push("--max-pages".to_string());
        command.push(max_pages.to_string());
    }
    if args.dry_run {
        command.push("--dry-run".to_string());
    }

    command.join(" ")
}
