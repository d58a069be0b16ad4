use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::errors::{BgRemoveError, Result};
use crate::image_processor::{output_file_name, BackgroundRemover};
use crate::traits::SegmentationModel;

/// File name suffixes picked up by the batch driver, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Name of the output directory created under the input directory by default.
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "output";

/// A file whose processing failed, with the rendered error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Number of files for which an output image was written.
    pub processed: usize,
    /// Files for which the model found no mask.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
}

impl BatchSummary {
    pub fn attempted(&self) -> usize {
        self.processed + self.skipped.len() + self.failed.len()
    }
}

pub fn default_output_dir(input_dir: &Path) -> PathBuf {
    input_dir.join(DEFAULT_OUTPUT_DIR_NAME)
}

pub fn is_supported_image_name(file_name: &str) -> bool {
    let file_name = file_name.to_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|ext| file_name.ends_with(&format!(".{}", ext)))
}

/// Regular files directly inside `input_dir` with a supported suffix, in
/// directory listing order.
///
/// Failing to list `input_dir` itself is an error; unreadable entries inside
/// it are logged and skipped.
pub fn collect_image_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();
    let walker = WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let message = e.to_string();
                return Err(BgRemoveError::FileSystem {
                    path: input_dir.to_path_buf(),
                    operation: "ディレクトリ読み込み".to_string(),
                    source: e.into_io_error().unwrap_or_else(|| io::Error::other(message)),
                });
            }
            Err(e) => {
                warn!("skipping unreadable directory entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_file()
            && is_supported_image_name(&entry.file_name().to_string_lossy())
        {
            image_files.push(entry.into_path());
        }
    }

    Ok(image_files)
}

/// Runs `remover` on every supported image in `input_dir`, writing
/// `<stem>_nobg.png` files into `output_dir`.
///
/// Files are processed one at a time. A failing file is logged and skipped;
/// it never aborts the batch.
pub fn process_directory<M: SegmentationModel>(
    remover: &BackgroundRemover<M>,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<BatchSummary> {
    if !input_dir.is_dir() {
        return Err(BgRemoveError::FileSystem {
            path: input_dir.to_path_buf(),
            operation: "ディレクトリ存在確認".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "入力ディレクトリが存在しません"),
        });
    }

    fs::create_dir_all(output_dir).map_err(|e| BgRemoveError::FileSystem {
        path: output_dir.to_path_buf(),
        operation: "ディレクトリ作成".to_string(),
        source: e,
    })?;

    let image_files = collect_image_files(input_dir)?;
    let mut summary = BatchSummary::default();
    if image_files.is_empty() {
        info!("no image files found in {}", input_dir.display());
        return Ok(summary);
    }

    let pb = ProgressBar::new(image_files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    for path in &image_files {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = output_dir.join(output_file_name(path));
        pb.set_message(file_name.clone());

        pb.suspend(|| info!("processing: {}", file_name));
        match remover.remove_background(path, Some(&output)) {
            Ok(Some(_)) => summary.processed += 1,
            Ok(None) => summary.skipped.push(path.clone()),
            Err(e) => {
                let message = e.report();
                pb.suspend(|| error!("error ({}): {}", file_name, message));
                summary.failed.push(FailedFile {
                    path: path.clone(),
                    message,
                });
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("done: processed {} image file(s)", summary.processed);
    Ok(summary)
}
