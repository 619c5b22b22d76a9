//! Embed subcommand - project traces into the latent space of a saved model.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use clap::Args;
use flate2::write::GzEncoder;
use flate2::Compression;

use tracevae_core::{TraceVae, VaeError};
use tracevae_training::{artifacts, ArtifactWriter, TraceMatrix};

use crate::train::compute_embeddings;

#[derive(Args)]
pub struct EmbedArgs {
    /// Directory holding a finished run (vae.safetensors + hyperparameters.json)
    #[arg(long)]
    pub model_dir: PathBuf,

    /// Path to the trace matrix to embed (delimited text, .gz supported)
    #[arg(long)]
    pub data: PathBuf,

    /// Output path; gzipped when it ends in .gz
    #[arg(long, default_value = "embeddings.txt.gz")]
    pub output: PathBuf,
}

pub fn run(args: EmbedArgs) -> Result<()> {
    let record = ArtifactWriter::read_hyperparameters(&args.model_dir)?;

    println!("Loading traces from {}", args.data.display());
    let mut traces = TraceMatrix::load(&args.data)?;
    if record.config.normalize {
        traces.normalize();
    }
    if traces.cols() != record.input_dim {
        return Err(VaeError::ShapeMismatch {
            what: "trace width vs checkpoint",
            got: traces.cols(),
            expected: record.input_dim,
        }
        .into());
    }

    let device = Device::Cpu;
    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = TraceVae::new(
        record.input_dim,
        record.config.hidden_dim,
        record.config.latent_dim,
        vb,
    )?;
    let model_path = args.model_dir.join(artifacts::MODEL_FILE);
    varmap
        .load(&model_path)
        .with_context(|| format!("failed to load checkpoint {}", model_path.display()))?;

    let embeddings = compute_embeddings(&model, &traces, record.config.batch_size, &device)?;
    let rows: Vec<Vec<f32>> = embeddings.to_vec2()?;

    let file = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let gzipped = args
        .output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    let mut writer: Box<dyn Write> = if gzipped {
        Box::new(GzEncoder::new(file, Compression::default()))
    } else {
        Box::new(file)
    };
    for row in &rows {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(writer, "{}", line.join("\t"))?;
    }
    writer.flush()?;

    println!(
        "Wrote {} embeddings of dimension {} to {}",
        rows.len(),
        record.config.latent_dim,
        args.output.display()
    );
    Ok(())
}
