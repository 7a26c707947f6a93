mod run_embed;
mod vetch_common;
mod vetch_input;

use clap::{Parser, Subcommand};
use log::info;
use run_embed::{run_embed, EmbedArgs};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "VETCH",
    long_about = "Vector Embedding of Tissue Coordinates with Hidden masking\n\
		  Learns per-spot embeddings of spatially-resolved expression data\n\
		  with a masked graph autoencoder over the spatial neighbour graph,\n\
		  then clusters the embeddings into spatial domains."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Embed one sample and cluster the embeddings",
        long_about = "Run the full pipeline on one sample folder: \n\
		      (1) Reduce expression features (PCA or node degree)\n\
		      (2) Build the radius-threshold spatial graph\n\
		      (3) Train a masked graph autoencoder per seed\n\
		      (4) Extract embeddings and cluster them with k-means.\n"
    )]
    Embed(EmbedArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Embed(args) => {
            if args.verbose {
                std::env::set_var("RUST_LOG", "info");
            }
            env_logger::init();
            run_embed(args)?;
        }
    }

    info!("Done");
    Ok(())
}
