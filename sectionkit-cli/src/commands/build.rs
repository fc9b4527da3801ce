//! Build command implementation.

use anyhow::{Context, Result};
use futures::future::try_join_all;
use sectionkit_core::{Config, SectionSettings};
use sectionkit_render::{RenderConfig, Scope, SiteRenderer};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// Build the preview page, returning the path of the written file
pub async fn build_site(config: &Config) -> Result<PathBuf> {
    let output_dir = config.output_dir();
    fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let settings = SectionSettings::load(&config.settings_path()).await;
    let renderer = SiteRenderer::new(RenderConfig::from_config(config, settings));

    let copied = copy_assets(&config.asset_paths(), &output_dir).await?;
    tracing::info!("Copied {} asset files", copied);

    // Template reads are blocking; nested sections render on the same thread
    let root_template = config.root_template.clone();
    let html = tokio::task::spawn_blocking(move || {
        renderer.render_file(&root_template, &Scope::root())
    })
    .await
    .context("Render task panicked")?
    .with_context(|| format!("Failed to render {}", config.root_template))?;

    let output_path = config.output_path();
    fs::write(&output_path, html)
        .await
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    let display_path = output_path
        .strip_prefix(config.root())
        .unwrap_or(&output_path);
    println!("Built {}", display_path.display());

    Ok(output_path)
}

/// Copy every asset into `output_dir` concurrently. Returns the number of
/// files written.
async fn copy_assets(assets: &[PathBuf], output_dir: &Path) -> Result<usize> {
    let counts = try_join_all(assets.iter().map(|src| copy_asset(src, output_dir))).await?;
    Ok(counts.into_iter().sum())
}

async fn copy_asset(src: &Path, output_dir: &Path) -> Result<usize> {
    let file_name = src
        .file_name()
        .with_context(|| format!("Asset path {:?} has no file name", src))?;
    let metadata = fs::metadata(src)
        .await
        .with_context(|| format!("Failed to read asset {:?}", src))?;
    let target = output_dir.join(file_name);

    if metadata.is_dir() {
        return copy_dir(src, &target).await;
    }

    fs::copy(src, &target)
        .await
        .with_context(|| format!("Failed to copy {:?} to {:?}", src, target))?;
    tracing::debug!("Copied {:?}", src);

    Ok(1)
}

fn collect_files(src: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(src) {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", src))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

async fn copy_dir(src: &Path, dest: &Path) -> Result<usize> {
    let files = collect_files(src)?;

    for file in &files {
        let relative = file.strip_prefix(src).unwrap_or(file);
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(file, &target)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", file, target))?;
    }

    tracing::debug!("Copied {} files from {:?}", files.len(), src);
    Ok(files.len())
}
