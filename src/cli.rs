use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pipeline::DocumentKind;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "specimport",
    about = "Run .docx specification parsers and report their outcome",
    version
)]
pub struct Cli {
    /// Config file (default: <config dir>/specimport/.specimportrc).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (repeat for more).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Parse a document and import it into the database.
    Import {
        /// The .docx document to process.
        #[arg(value_name = "DOCX")]
        document: PathBuf,

        /// Which parser to run.
        #[arg(long, value_enum, default_value_t = DocumentKind::Spec)]
        kind: DocumentKind,

        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Parse a document and write the results into a new timestamped folder.
    Export {
        /// The .docx document to process.
        #[arg(value_name = "DOCX")]
        document: PathBuf,

        /// Folder in which the timestamped output folder is created.
        #[arg(long = "output-root")]
        output_root: Option<PathBuf>,

        /// Open the output folder in the file manager afterwards.
        #[arg(long)]
        open: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Process every book folder (`Книга ...`) under a directory.
    Batch {
        /// A book folder, or a folder containing book folders.
        #[arg(value_name = "DIR")]
        folder: PathBuf,

        /// Write files here instead of importing into the database.
        #[arg(long = "output-root")]
        output_root: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Interactive terminal front-end.
    Tui {
        /// Start with this document selected.
        #[arg(value_name = "DOCX")]
        document: Option<PathBuf>,

        /// Write files under this folder instead of importing into the database.
        #[arg(long = "output-root")]
        output_root: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Print the Python interpreter that would be used.
    Locate {
        /// Explicit interpreter to check first.
        #[arg(long)]
        python: Option<PathBuf>,
    },
}

/// Options shared by every command that runs a script.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Python interpreter to use instead of searching for one.
    #[arg(long)]
    pub python: Option<PathBuf>,

    /// Directory containing the parser scripts.
    #[arg(long = "script-dir")]
    pub script_dir: Option<PathBuf>,

    /// Kill the script if it runs longer than this.
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Database connection overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct DbArgs {
    #[arg(long = "db-host")]
    pub host: Option<String>,
    #[arg(long = "db-port")]
    pub port: Option<String>,
    #[arg(long = "db-name")]
    pub name: Option<String>,
    #[arg(long = "db-user")]
    pub user: Option<String>,
    /// Prefer SPECIMPORT_DB_PASSWORD; command lines are visible to other users.
    #[arg(long = "db-password")]
    pub password: Option<String>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
