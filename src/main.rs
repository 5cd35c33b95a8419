use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod corpus;
mod semantic;
#[cfg(test)]
mod tests;

use cli::{BuildArgs, Command};
use config::{Backend, Config};
use semantic::{ArtifactStorage, IndexPipeline, NeighborList};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let mut config = Config::load().context("Failed to load config")?;

    match args.command {
        Command::Build {
            corpus,
            args,
            no_progress,
        } => {
            apply_overrides(&mut config, args);
            config.validate().context("Invalid configuration")?;

            // corpus first: a bad input file should not cost a model download
            let documents = corpus::load_corpus(&corpus)
                .with_context(|| format!("Failed to load corpus from {}", corpus.display()))?;

            let embedder = semantic::create_embedder(&config)?;
            let pipeline = IndexPipeline::from_config(&config, embedder)?.with_progress(!no_progress);
            log::info!("Writing artifacts to {}", pipeline.output_dir().display());
            let report = pipeline.run(&documents)?;

            println!("{} posts indexed", report.documents);
            println!("- {}", report.paths.embeddings.display());
            println!("- {}", report.paths.neighbors.display());
            println!("- {}", report.paths.manifest.display());
            Ok(())
        }

        Command::Similar {
            id,
            out,
            min_score,
            limit,
        } => {
            let dir = out.unwrap_or_else(|| config.output_dir.clone());
            let storage = ArtifactStorage::new(dir);
            let index = storage
                .load_neighbors()
                .context("Failed to load neighbor index; run `build` first")?;
            match storage.load_manifest() {
                Ok(manifest) => log::info!(
                    "Index of {} documents built {} with '{}' (top-{})",
                    manifest.documents,
                    manifest.built_at,
                    manifest.model,
                    manifest.neighbors
                ),
                Err(e) => log::warn!("No readable manifest: {}", e),
            }

            let similar: NeighborList = index
                .get(&id)
                .map(|list| {
                    list.iter()
                        .filter(|e| e.score >= min_score)
                        .take(limit)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            println!("{}", serde_json::to_string_pretty(&similar)?);
            Ok(())
        }
    }
}

fn apply_overrides(config: &mut Config, args: BuildArgs) {
    if let Some(out) = args.out {
        config.output_dir = out;
    }
    if let Some(k) = args.k {
        config.neighbors = k;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(max_chars) = args.max_chars {
        config.max_chars = max_chars;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(model) = args.model {
        match config.backend {
            Backend::Local => config.model = model,
            Backend::Openai => config.remote_model = model,
        }
    }
    if let Some(parallelism) = args.parallelism {
        config.parallelism = parallelism;
    }
}
