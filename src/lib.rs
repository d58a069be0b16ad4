pub mod batch;
pub mod config;
pub mod errors;
pub mod image_processor;
pub mod imageops;
pub mod logging;
pub mod mask;
pub mod mocks;
pub mod model;
pub mod traits;
pub mod visualize;

pub use batch::{process_directory, BatchSummary};
pub use config::{BatchArgs, ModelArgs, RemoveArgs};
pub use errors::{BgRemoveError, Result};
pub use image_processor::{default_output_path, load_rgb, output_file_name, BackgroundRemover};
pub use mask::{select_mask, Mask};
pub use model::{MobileSam, SamOptions};
pub use traits::*;
