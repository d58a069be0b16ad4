use anyhow::{ensure, Result};
use clap::Parser;

use product_bg_remove::{logging, process_directory, BackgroundRemover, BatchArgs};

fn main() -> Result<()> {
    let args = BatchArgs::parse();
    logging::init(args.verbose);

    ensure!(
        args.input_dir.is_dir(),
        "Input directory does not exist: {}",
        args.input_dir.display()
    );

    let remover = BackgroundRemover::new(args.model.load_model()?);
    let summary = process_directory(&remover, &args.input_dir, &args.output_dir())?;

    println!("Done: processed {} image file(s).", summary.processed);
    Ok(())
}
