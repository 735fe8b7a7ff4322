//! Parsing of team members and photos given on the command line.

use anyhow::{Context, Result, bail};
use std::path::Path;
use teamintro_core::draft::{MemberDraft, PhotoUpload};

/// Parses `NAME:INTRO TEXT`. Only the first `:` separates the two, so the
/// intro text may itself contain colons.
pub fn parse_member(raw: &str) -> Result<MemberDraft> {
    let (name, intro_text) = raw
        .split_once(':')
        .with_context(|| format!("Member '{}' must look like NAME:INTRO TEXT", raw))?;
    Ok(MemberDraft::new(name, intro_text))
}

/// Parses `INDEX=PATH`, where INDEX is the member's position as given on the
/// command line (before incomplete members are dropped).
pub fn parse_photo_arg(raw: &str) -> Result<(usize, String)> {
    let (index, path) = raw
        .split_once('=')
        .with_context(|| format!("Photo '{}' must look like INDEX=PATH", raw))?;
    let index = index
        .trim()
        .parse::<usize>()
        .with_context(|| format!("Photo index '{}' is not a number", index))?;
    Ok((index, path.to_string()))
}

/// Content type for a member photo, judged by file extension.
pub fn photo_content_type(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => Ok("image/jpeg"),
        Some("png") => Ok("image/png"),
        _ => bail!("Photo '{}' must be a JPEG or PNG image", path.display()),
    }
}

pub fn read_photo(path: &Path) -> Result<PhotoUpload> {
    let content_type = photo_content_type(path)?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read photo '{}'", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("photo")
        .to_string();
    Ok(PhotoUpload::new(file_name, content_type, bytes))
}
