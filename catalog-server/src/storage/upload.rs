//! Upload validation
//!
//! Everything here runs before the first byte reaches storage.

use std::path::Path;

use axum::body::Bytes;
use image::ImageFormat;
use shared::error::{AppError, AppResult, ErrorCode};

/// Longest file-name stem kept in a stored name
const MAX_STEM_LEN: usize = 64;

/// Image formats accepted for product pictures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    WebP,
    Gif,
}

impl ImageKind {
    /// Detect the format from magic bytes
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match image::guess_format(data).ok()? {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::WebP => Some(Self::WebP),
            ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Gif => "gif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
        }
    }
}

/// Per-request upload limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_size: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_file_size: 5 * 1024 * 1024,
        }
    }
}

impl UploadLimits {
    /// Whole request body cap: every file at full size plus 1 MiB for fields
    pub fn body_limit(&self) -> usize {
        self.max_files
            .saturating_mul(self.max_file_size)
            .saturating_add(1024 * 1024)
    }

    pub fn file_too_large(&self, file_name: &str) -> AppError {
        AppError::with_message(
            ErrorCode::FileTooLarge,
            format!(
                "File {file_name} exceeds the maximum size of {} bytes",
                self.max_file_size
            ),
        )
        .with_detail("max_file_size", self.max_file_size)
    }

    pub fn too_many_files(&self) -> AppError {
        AppError::with_message(
            ErrorCode::TooManyFiles,
            format!("At most {} images may be uploaded per request", self.max_files),
        )
        .with_detail("max_files", self.max_files)
    }
}

/// An uploaded image that passed validation
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// File name as sent by the client
    pub original_name: String,
    pub kind: ImageKind,
    pub data: Bytes,
}

impl UploadedImage {
    /// Validate raw upload content
    ///
    /// Rejects empty files, files over the size cap, a declared content type
    /// other than `image/*`, and content that is not PNG, JPEG, WebP or GIF.
    pub fn validate(
        original_name: Option<&str>,
        content_type: Option<&str>,
        data: Bytes,
        limits: &UploadLimits,
    ) -> AppResult<Self> {
        let original_name = original_name.unwrap_or("image").to_string();

        if data.is_empty() {
            return Err(AppError::with_message(
                ErrorCode::EmptyFile,
                format!("File {original_name} is empty"),
            ));
        }

        if data.len() > limits.max_file_size {
            return Err(limits.file_too_large(&original_name));
        }

        if let Some(ct) = content_type
            && !ct.trim().to_ascii_lowercase().starts_with("image/")
        {
            return Err(AppError::with_message(
                ErrorCode::InvalidImageFile,
                format!("File {original_name} is not an image ({ct})"),
            )
            .with_detail("content_type", ct));
        }

        let kind = ImageKind::sniff(&data).ok_or_else(|| {
            AppError::with_message(
                ErrorCode::UnsupportedFileFormat,
                format!("File {original_name} is not a PNG, JPEG, WebP or GIF image"),
            )
        })?;

        Ok(Self {
            original_name,
            kind,
            data,
        })
    }

    /// Client file name reduced to `[A-Za-z0-9_-]`, never empty
    pub fn sanitized_stem(&self) -> String {
        sanitize_stem(&self.original_name)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub(crate) fn sanitize_stem(file_name: &str) -> String {
    // Some clients send full paths
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let mut out = String::with_capacity(stem.len().min(MAX_STEM_LEN));
    for c in stem.chars() {
        if out.len() >= MAX_STEM_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}
