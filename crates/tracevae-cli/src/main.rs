//! tracevae CLI - train a calcium-trace VAE and export embeddings
//!
//! Usage:
//!   tracevae train --data traces.txt.gz --latent 4 --hidden 64 --epochs 200
//!   tracevae train --data traces.txt.gz --normalize --beta-kl 0.5 --outdir run1
//!   tracevae embed --model-dir run1 --data more_traces.txt.gz --output embeddings.txt.gz

mod embed;
mod train;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tracevae",
    about = "Train a variational autoencoder on calcium-imaging traces",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a VAE on a trace matrix and export model, losses, and embeddings
    Train(train::TrainArgs),

    /// Compute latent embeddings for a trace matrix using a saved checkpoint
    Embed(embed::EmbedArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Train(args) => train::run(args),
        Commands::Embed(args) => embed::run(args),
    }
}
