use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "catalog-import",
    version,
    about = "Bulk faculty/department/course catalog import with navigation sync"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Import(ImportArgs),
    Template(TemplateArgs),
    Anchor(AnchorArgs),
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum InputFormat {
    /// Comma-delimited text with optional double-quote escaping.
    Csv,
    /// JSON array of rows, each an array of cells.
    Grid,
}

impl InputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Grid => "grid",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(Self::Csv),
            "json" => Some(Self::Grid),
            _ => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[arg(long, default_value = ".cache/catalog")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub file: PathBuf,

    #[arg(long, value_enum)]
    pub format: Option<InputFormat>,

    #[arg(long, default_value_t = 50)]
    pub chunk_size: usize,

    #[arg(long, default_value = "academic")]
    pub anchor_term: String,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value_t = InputFormat::Csv)]
    pub format: InputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct AnchorArgs {
    #[arg(long, default_value = ".cache/catalog")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub path: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/catalog")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

pub fn resolve_db_path(data_root: &Path, db_path: Option<&PathBuf>) -> PathBuf {
    db_path
        .cloned()
        .unwrap_or_else(|| data_root.join("catalog.sqlite"))
}
