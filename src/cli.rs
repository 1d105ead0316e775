use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_API_URL: &str = "https://manifesto-project.wzb.eu/api/v1";
pub const DEFAULT_BASE_ORIGIN: &str = "https://manifesto-project.wzb.eu";

/// Labour, Conservatives, Liberal Democrats.
pub const DEFAULT_PARTIES: [u32; 3] = [51320, 51620, 51421];

#[derive(Parser, Debug)]
#[command(
    name = "manifesto-fetch",
    version,
    about = "Download Manifesto Project documents and annotated texts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Fetch(FetchArgs),
    Rename(RenameArgs),
    ExportText(ExportTextArgs),
    PdfText(PdfTextArgs),
    Status(StatusArgs),
    Versions(VersionsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    #[arg(long, env = "MANIFESTO_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    #[arg(long, env = "MANIFESTO_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, default_value = "manifesto_apikey.txt")]
    pub api_key_file: PathBuf,

    /// Request timeout for catalog calls and downloads; unset waits forever.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    #[arg(long, default_value = ".")]
    pub output_root: PathBuf,

    #[arg(long)]
    pub pdf_dir: Option<PathBuf>,

    #[arg(long)]
    pub csv_dir: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long = "party", default_values_t = DEFAULT_PARTIES)]
    pub parties: Vec<u32>,

    #[arg(long, default_value = DEFAULT_BASE_ORIGIN)]
    pub base_origin: String,

    #[arg(long)]
    pub core_version: Option<String>,

    #[arg(long)]
    pub metadata_version: Option<String>,

    #[arg(long, default_value_t = false)]
    pub skip_pdfs: bool,

    #[arg(long, default_value_t = false)]
    pub skip_csvs: bool,

    /// Exit non-zero when any document download failed.
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RenameArgs {
    #[arg(long, default_value = ".")]
    pub output_root: PathBuf,

    #[arg(long)]
    pub pdf_dir: Option<PathBuf>,

    #[arg(long)]
    pub csv_dir: Option<PathBuf>,

    #[arg(long)]
    pub party_codes: Option<PathBuf>,

    #[arg(long)]
    pub additional_dir: Option<PathBuf>,

    #[arg(long, default_value = "renamed")]
    pub destination: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ExportTextArgs {
    #[arg(long, default_value = "csv")]
    pub source_dir: PathBuf,

    #[arg(long, default_value = "text")]
    pub destination: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PdfTextArgs {
    #[arg(long, default_value = "pdf")]
    pub source_dir: PathBuf,

    #[arg(long, default_value = "text")]
    pub destination: PathBuf,

    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    /// Render resolution for OCR page images.
    #[arg(long, default_value_t = 300)]
    pub ocr_dpi: u32,

    #[arg(long, default_value_t = false)]
    pub skip_text_layer: bool,

    #[arg(long, default_value_t = false)]
    pub skip_ocr: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".")]
    pub output_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct VersionsArgs {
    #[command(flatten)]
    pub api: ApiArgs,
}
