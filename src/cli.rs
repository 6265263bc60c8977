use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "callbook",
    version,
    about = "Local amateur-radio operator roster import and registry tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Import(ImportArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Roster file to import (.pdf, .xlsx/.xls, or .csv)
    pub source: PathBuf,

    #[arg(long, default_value = ".cache/callbook")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = SourceFormat::Auto)]
    pub format: SourceFormat,

    /// Override the batch's source country (ISO/ITU-style code)
    #[arg(long)]
    pub country: Option<String>,

    /// Absence-disabling scope: "none", "prefix:<P>", or "country:<C>".
    /// When omitted, a default is derived from the source format.
    #[arg(long)]
    pub absence_scope: Option<String>,

    /// Stop reading PDF sources after this many pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Compute and report the plan without writing to the registry
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SourceFormat {
    Auto,
    Pdf,
    Xlsx,
    Csv,
}

impl SourceFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Pdf => "pdf",
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/callbook")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
