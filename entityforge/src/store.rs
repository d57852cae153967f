//! Definition JSON documents on disk.
//!
//! One file per definition, named `entity_<slug(id)>.json`, inside a single
//! directory. [`DefinitionStore::store`] overwrites (last writer wins);
//! [`DefinitionStore::store_new`] creates exclusively and is the uniqueness
//! guard for concurrent creates of the same id.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::definition::EntityDefinition;
use crate::error::{ForgeError, Result, ValidationFailure};
use crate::slug::slugify;

pub const DEFAULT_DEFINITIONS_DIR: &str = "var/entities/definitions";

const FILE_PREFIX: &str = "entity_";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct DefinitionStore {
    dir: PathBuf,
}

impl DefinitionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a definition id: `entity_<slug(id)>.json`.
    pub fn file_name(id: &str) -> String {
        format!("{FILE_PREFIX}{}{FILE_SUFFIX}", slugify(id))
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(Self::file_name(id))
    }

    /// Write the definition, replacing any previous document for the same id.
    ///
    /// The JSON goes to a sibling temp file first and is renamed into place, so
    /// readers never observe a half-written document.
    pub async fn store(&self, definition: &EntityDefinition) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&definition.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(definition)?;

        fs::write(&tmp, &body).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        log::debug!("stored definition '{}' at {}", definition.id, path.display());
        Ok(path)
    }

    /// Write the definition only if no document exists for its slug yet.
    pub async fn store_new(&self, definition: &EntityDefinition) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&definition.id);
        let body = serde_json::to_vec_pretty(definition)?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ValidationFailure::DuplicateId {
                    id: definition.id.clone(),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = async {
            file.write_all(&body).await?;
            file.flush().await
        }
        .await
        {
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(e.into());
        }
        log::debug!("created definition '{}' at {}", definition.id, path.display());
        Ok(path)
    }

    pub async fn load_by_id(&self, id: &str) -> Result<EntityDefinition> {
        let path = self.path_for(id);
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ForgeError::DefinitionNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&body)?)
    }

    /// Every stored definition, ordered by file name. A missing directory
    /// means nothing has been stored yet.
    pub async fn load_all(&self) -> Result<Vec<EntityDefinition>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX) {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            let body = fs::read(&path).await?;
            definitions.push(serde_json::from_slice(&body)?);
        }
        Ok(definitions)
    }

    /// Remove the document for `id`. Returns whether a file was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        remove_if_exists(&self.path_for(id)).await
    }
}

pub(crate) async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
