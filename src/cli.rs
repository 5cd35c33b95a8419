use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::Backend;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for values from config.yaml.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Directory the artifacts are written to
    #[clap(short, long)]
    pub out: Option<PathBuf>,

    /// Number of neighbors kept per post
    #[clap(short)]
    pub k: Option<usize>,

    /// Texts per embedding call
    #[clap(long)]
    pub batch_size: Option<usize>,

    /// Characters of each post that get embedded
    #[clap(long)]
    pub max_chars: Option<usize>,

    /// Embedding backend
    #[clap(long, value_enum)]
    pub backend: Option<Backend>,

    /// Model name for the selected backend
    #[clap(long)]
    pub model: Option<String>,

    /// Batch parallelism: "auto" or a positive integer
    #[clap(long)]
    pub parallelism: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed a corpus and write the vector dump and neighbor index
    Build {
        /// JSON or CSV file with id, title and content of every post
        #[clap(short, long)]
        corpus: PathBuf,

        #[command(flatten)]
        args: BuildArgs,

        /// Don't show a progress bar
        #[clap(long, default_value = "false")]
        no_progress: bool,
    },

    /// Print the stored neighbors of one post
    Similar {
        /// Post id
        id: String,

        /// Directory holding similarity-matrix.json
        #[clap(short, long)]
        out: Option<PathBuf>,

        /// Hide neighbors scoring below this
        #[clap(long, default_value = "0.4")]
        min_score: f32,

        /// Maximum neighbors to print
        #[clap(short, long, default_value = "10")]
        limit: usize,
    },
}
