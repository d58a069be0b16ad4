use anyhow::{ensure, Result};
use clap::Parser;
use tracing::{info, warn};

use product_bg_remove::{
    default_output_path, load_rgb, logging, visualize, BackgroundRemover, RemoveArgs,
};

fn main() -> Result<()> {
    let args = RemoveArgs::parse();
    logging::init(args.verbose);

    ensure!(
        args.input.exists(),
        "Input image does not exist: {}",
        args.input.display()
    );

    let remover = BackgroundRemover::new(args.model.load_model()?);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    let result = remover.remove_background(&args.input, Some(&output))?;

    if args.visualize {
        match &result {
            Some(result) => {
                let original = load_rgb(&args.input)?;
                let comparison = visualize::comparison_path(&output);
                visualize::save_comparison(&original, result, &comparison)?;
                info!("saved comparison: {}", comparison.display());
            }
            None => warn!("nothing to visualize, no output was written"),
        }
    }

    println!("Done.");
    Ok(())
}
