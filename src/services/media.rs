use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::MediaConfig;

const SHOW_IMAGE_DIR: &str = "uploads/astronomy_shows";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("uploaded file is not a supported image")]
    NotAnImage,
    #[error("failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Определяет формат по сигнатуре файла.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Файловое хранилище картинок шоу. В БД лежит относительный путь,
/// наружу отдаётся URL с префиксом `MEDIA_URL`.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStorage {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            root: config.root.clone(),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Сохраняет картинку шоу и возвращает относительный путь.
    pub async fn save_show_image(&self, title: &str, bytes: &[u8]) -> Result<String, MediaError> {
        let format = ImageFormat::sniff(bytes).ok_or(MediaError::NotAnImage)?;
        let relative = show_image_path(title, format);

        let full = self.root.join(&relative);
        if let Some(dir) = full.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&full, bytes).await?;

        info!("Stored show image {} ({} bytes)", relative, bytes.len());
        Ok(relative)
    }

    /// Удаляет старую картинку. Отсутствующий файл ошибкой не считается.
    pub async fn remove(&self, relative: &str) -> Result<(), MediaError> {
        match tokio::fs::remove_file(self.root.join(relative)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn url_for(&self, relative: &str) -> String {
        format!("{}/{}", self.url_prefix, relative)
    }
}

fn show_image_path(title: &str, format: ImageFormat) -> String {
    format!("{}/{}-{}.{}", SHOW_IMAGE_DIR, slugify(title), Uuid::new_v4(), format.extension())
}

/// Слаг для имени файла: латиница и цифры в нижнем регистре через дефис.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("show");
    }
    slug
}
