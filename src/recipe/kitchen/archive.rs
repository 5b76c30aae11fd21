// src/recipe/kitchen/archive.rs

//! Archive and source file utilities for the Kitchen

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use xz2::read::XzDecoder;

/// Connect timeout for source downloads
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether a source location needs the network
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Fetch a source location (URL, `file://` URL, or path) to `dest`
pub fn fetch_to(location: &str, dest: &Path) -> Result<()> {
    if is_remote(location) {
        download_file(location, dest)
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        debug!("Copying local source {}", path);
        fs::copy(path, dest)
            .map_err(|e| Error::Download(format!("Failed to copy {}: {}", path, e)))?;
        Ok(())
    }
}

/// Download a file from a URL, streaming to disk
pub fn download_file(url: &str, dest: &Path) -> Result<()> {
    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Download(format!("Failed to create HTTP client: {e}")))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| Error::Download(format!("Failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(Error::Download(format!(
            "HTTP {} from {}",
            response.status(),
            url
        )));
    }

    let progress = ProgressBar::new(response.content_length().unwrap_or(0));
    progress.set_style(
        ProgressStyle::with_template("{msg} [{bar:30}] {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_message(
        url.rsplit('/')
            .next()
            .unwrap_or(url)
            .to_string(),
    );

    let mut file = File::create(dest)?;
    let mut reader = progress.wrap_read(response);
    let bytes = io::copy(&mut reader, &mut file)
        .map_err(|e| Error::Download(format!("Failed to read response from {}: {}", url, e)))?;
    progress.finish_and_clear();

    info!("Downloaded {} ({} bytes)", url, bytes);
    Ok(())
}

/// Extract an archive to a destination directory
///
/// Supports: .tar.gz, .tgz, .tar.xz, .txz, .tar
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let filename = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let file = || File::open(archive);
    let reader: Box<dyn Read> = if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
        Box::new(GzDecoder::new(file()?))
    } else if filename.ends_with(".tar.xz") || filename.ends_with(".txz") {
        Box::new(XzDecoder::new(file()?))
    } else if filename.ends_with(".tar") {
        Box::new(file()?)
    } else {
        return Err(Error::Parse(format!("Unknown archive format: {}", filename)));
    };

    fs::create_dir_all(dest)?;
    let mut tarball = tar::Archive::new(reader);
    tarball.set_preserve_permissions(true);
    tarball.unpack(dest)?;
    Ok(())
}

/// Apply a unified diff to the source directory
///
/// Each file section is applied in order; the first hunk that does not
/// apply fails the whole patch. Returns the number of files touched.
pub fn apply_patch(source_dir: &Path, patch_path: &Path, strip: u32) -> Result<usize> {
    let patch_name = patch_path.display().to_string();
    let fail = |reason: String| Error::Patch {
        patch: patch_name.clone(),
        reason,
    };

    let text = fs::read_to_string(patch_path).map_err(|e| fail(format!("cannot read: {}", e)))?;
    let sections = split_file_diffs(&text);
    if sections.is_empty() {
        return Err(fail("no file diffs found".to_string()));
    }

    for section in &sections {
        let patch = diffy::Patch::from_str(section)
            .map_err(|e| fail(format!("malformed diff: {}", e)))?;

        let original = patch.original().map(header_path);
        let modified = patch.modified().map(header_path);
        let creates = original == Some("/dev/null");
        let deletes = modified == Some("/dev/null");

        let header = (if deletes { original } else { modified.or(original) })
            .ok_or_else(|| fail("file section has no header".to_string()))?;
        let relative = strip_path(header, strip)
            .ok_or_else(|| fail(format!("cannot strip {} components from {}", strip, header)))?;
        let target = source_dir.join(&relative);

        let base = if creates {
            String::new()
        } else {
            fs::read_to_string(&target)
                .map_err(|e| fail(format!("{}: {}", relative.display(), e)))?
        };

        let patched = diffy::apply(&base, &patch)
            .map_err(|e| fail(format!("{}: {}", relative.display(), e)))?;

        if deletes {
            fs::remove_file(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, patched)?;
        }
        debug!("Patched {}", relative.display());
    }

    Ok(sections.len())
}

/// Split a multi-file diff into one text per file
///
/// Drops `diff --git`/`index` preambles and a trailing `git format-patch`
/// signature, which diffy does not accept.
fn split_file_diffs(text: &str) -> Vec<String> {
    let mut lines: Vec<&str> = text.lines().collect();
    if let Some(sig) = signature_start(&lines) {
        lines.truncate(sig);
    }

    let starts: Vec<usize> = (0..lines.len())
        .filter(|&i| {
            lines[i].starts_with("--- ")
                && lines.get(i + 1).is_some_and(|next| next.starts_with("+++ "))
        })
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(lines.len());
            let mut body = &lines[start..end];
            while let Some(last) = body.last() {
                if is_hunk_line(last) {
                    break;
                }
                body = &body[..body.len() - 1];
            }
            let mut section = body.join("\n");
            section.push('\n');
            section
        })
        .collect()
}

/// Index of a `-- ` signature line outside any hunk
///
/// Hunk bodies are skipped by their header counts, so a removed line that
/// reads `-` (shown as `--`) is never mistaken for the signature.
fn signature_start(lines: &[&str]) -> Option<usize> {
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if let Some((mut old, mut new)) = hunk_counts(line) {
            i += 1;
            while (old > 0 || new > 0) && i < lines.len() {
                match lines[i].chars().next() {
                    Some('-') => old = old.saturating_sub(1),
                    Some('+') => new = new.saturating_sub(1),
                    Some('\\') => {}
                    _ => {
                        old = old.saturating_sub(1);
                        new = new.saturating_sub(1);
                    }
                }
                i += 1;
            }
            continue;
        }
        if line.trim_end() == "--" {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Old and new line counts from a `@@ -l,n +l,n @@` header
fn hunk_counts(line: &str) -> Option<(usize, usize)> {
    let ranges = line.strip_prefix("@@ ")?.split(" @@").next()?;
    let (old, new) = ranges.split_once(' ')?;
    let count = |range: &str| -> Option<usize> {
        match range.split_once(',') {
            Some((_, n)) => n.parse().ok(),
            None => range.parse::<usize>().ok().map(|_| 1),
        }
    };
    Some((
        count(old.strip_prefix('-')?)?,
        count(new.strip_prefix('+')?)?,
    ))
}

fn is_hunk_line(line: &str) -> bool {
    matches!(line.chars().next(), Some(' ' | '+' | '-' | '@' | '\\'))
}

/// File path from a `---`/`+++` header, without any trailing timestamp
fn header_path(header: &str) -> &str {
    header.split('\t').next().unwrap_or(header).trim_end()
}

/// Drop leading components like `patch -p<strip>`
fn strip_path(path: &str, strip: u32) -> Option<PathBuf> {
    let components: Vec<&str> = path
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    let strip = strip as usize;
    if components.len() <= strip {
        return None;
    }
    let rest = &components[strip..];
    if rest.contains(&"..") {
        return None;
    }
    Some(rest.iter().collect())
}
