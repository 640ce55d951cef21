use std::path::Path;

use super::{ExtractError, TextChunk, TextExtractor};

/// Describes an image by its name and pixel metadata so it can be found by
/// keyword. The pixels themselves are not interpreted.
pub struct ImageExtractor;

impl TextExtractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn extract(&self, path: &Path) -> Result<Vec<TextChunk>, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }

        let (width, height) = ::image::image_dimensions(path).map_err(|source| match source {
            ::image::ImageError::IoError(e) => ExtractError::from_io(path, e),
            source => ExtractError::Image {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let format = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_uppercase())
            .unwrap_or_default();

        let mut description = format!("Image file {}.", file_name);
        let keywords = keywords_from_name(path);
        if !keywords.is_empty() {
            description.push_str(&format!(" Keywords: {}.", keywords.join(", ")));
        }
        if let Some(parent) = path.parent().and_then(|p| p.file_name()) {
            description.push_str(&format!(" Folder: {}.", parent.to_string_lossy()));
        }
        description.push_str(&format!(
            " Format: {}. Dimensions: {}x{} pixels.",
            format, width, height
        ));

        Ok(vec![TextChunk::whole(description)])
    }
}

/// Split a file stem like `beach_sunset-2024` into `["beach", "sunset", "2024"]`.
fn keywords_from_name(path: &Path) -> Vec<String> {
    let Some(stem) = path.file_stem() else {
        return Vec::new();
    };

    stem.to_string_lossy()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}
