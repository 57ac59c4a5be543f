//! # galagallery - Listing des images de la galerie
//!
//! Liste les images d'un dossier parmi une liste autorisée (`hero`,
//! `couple` par défaut) et les expose sous forme de chemins publics
//! `/images/{folder}/{file}`, triés par nom.
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use galagallery::Gallery;
//!
//! # async fn example() -> galagallery::Result<()> {
//! let gallery = Gallery::new("public/images", ["hero", "couple"]);
//! for path in gallery.list("hero").await? {
//!     println!("{}", path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Avec la feature `galaserver` (active par défaut), le trait [`GalleryExt`]
//! enregistre `GET /api/images?folder=...` sur un `galaserver::Server`.

use galaconfig::Config;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(feature = "galaserver")]
pub mod api;
#[cfg(feature = "galaserver")]
mod server_ext;

#[cfg(feature = "galaserver")]
pub use api::{ImageListResponse, ImagesApiDoc, ImagesQuery};
#[cfg(feature = "galaserver")]
pub use server_ext::GalleryExt;

/// Extensions reconnues comme images (comparaison insensible à la casse)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "svg"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("Invalid folder. Must be one of: {}", allowed.join(", "))]
    InvalidFolder { folder: String, allowed: Vec<String> },
    #[error("Error reading images in {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GalleryError>;

/// Un répertoire racine et les sous-dossiers qu'on a le droit d'y lister
#[derive(Debug, Clone)]
pub struct Gallery {
    root: PathBuf,
    folders: Vec<String>,
}

impl Gallery {
    pub fn new<I, S>(root: impl Into<PathBuf>, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.into(),
            folders: folders.into_iter().map(Into::into).collect(),
        }
    }

    /// Construit la galerie depuis la section `gallery` de la configuration
    pub fn from_config(config: &Config) -> Self {
        let root = config.resolve_path(&config.get_gallery_dir());
        Self::new(root, config.get_gallery_folders())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folders(&self) -> &[String] {
        &self.folders
    }

    pub fn is_allowed(&self, folder: &str) -> bool {
        self.folders.iter().any(|f| f == folder)
    }

    /// Liste les images d'un dossier autorisé
    ///
    /// Un dossier absent du disque donne une liste vide. Les fichiers cachés
    /// et les extensions non image sont ignorés.
    pub async fn list(&self, folder: &str) -> Result<Vec<String>> {
        if !self.is_allowed(folder) {
            return Err(GalleryError::InvalidFolder {
                folder: folder.to_string(),
                allowed: self.folders.clone(),
            });
        }

        let dir = self.root.join(folder);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Gallery folder missing, empty listing");
                return Ok(Vec::new());
            }
            Err(source) => return Err(read_error(&dir, source)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| read_error(&dir, source))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_image_file(&name) {
                files.push(name);
            }
        }
        files.sort();

        debug!(folder, count = files.len(), "Gallery folder listed");
        Ok(files
            .into_iter()
            .map(|name| format!("/images/{}/{}", folder, name))
            .collect())
    }
}

fn read_error(dir: &Path, source: io::Error) -> GalleryError {
    warn!(dir = %dir.display(), "❌ Cannot read gallery folder: {}", source);
    GalleryError::Read {
        path: dir.to_path_buf(),
        source,
    }
}

/// Vrai pour un fichier visible dont l'extension est une image
pub fn is_image_file(name: &str) -> bool {
    if name.starts_with('.') {
        return false;
    }
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file("a.jpg"));
        assert!(is_image_file("B.JPEG"));
        assert!(is_image_file("c.Png"));
        assert!(is_image_file("logo.svg"));
        assert!(!is_image_file(".hidden.jpg"));
        assert!(!is_image_file("notes.txt"));
        assert!(!is_image_file("noext"));
        assert!(!is_image_file("archive.jpg.zip"));
    }

    #[test]
    fn test_invalid_folder_message() {
        let err = GalleryError::InvalidFolder {
            folder: "other".into(),
            allowed: vec!["hero".into(), "couple".into()],
        };
        assert_eq!(err.to_string(), "Invalid folder. Must be one of: hero, couple");
    }
}
