/// Fetches the e5 model files from HuggingFace on first use.
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

const HF_BASE: &str = "https://huggingface.co/intfloat";

/// Local file name and path within the model repository.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
];

#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Download any missing model files for `model_name` into `model_dir`.
pub fn ensure_model_files(model_name: &str, model_dir: &Path) -> Result<()> {
    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create model directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        return Ok(());
    }

    info!(model = model_name, dir = %model_dir.display(), "downloading model files");
    for &(filename, remote) in MODEL_FILES {
        let dest = model_dir.join(filename);
        if dest.exists() {
            continue;
        }
        let url = format!("{HF_BASE}/{model_name}/resolve/main/{remote}");
        download_file(&dest, &url).with_context(|| format!("failed to download {filename}"))?;
        info!(file = filename, "downloaded");
    }
    Ok(())
}

fn download_file(dest: &Path, url: &str) -> Result<()> {
    let resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;
    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes})")
            {
                pb.set_style(style);
            }
            pb
        }
        _ => ProgressBar::new_spinner(),
    };

    let bytes = resp.bytes().context("failed to read response body")?;
    // Write next to the destination, then rename, so a partial file never looks complete
    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;
    file.write_all(&bytes).context("failed to write file")?;
    fs::rename(&partial, dest)?;
    pb.set_position(bytes.len() as u64);
    pb.finish_and_clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_files_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!all_files_present(dir.path()));

        fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();
        assert!(!all_files_present(dir.path()));

        fs::write(dir.path().join("model.onnx"), "dummy").unwrap();
        assert!(all_files_present(dir.path()));
    }

    #[test]
    fn test_ensure_skips_when_present() {
        let dir = tempfile::tempdir().unwrap();
        for &(name, _) in MODEL_FILES {
            fs::write(dir.path().join(name), "dummy").unwrap();
        }
        assert!(ensure_model_files("multilingual-e5-small", dir.path()).is_ok());
    }
}
