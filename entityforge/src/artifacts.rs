//! Generated schema text, one `<table>.sql` file per entity table.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::Result;
use crate::store::remove_if_exists;

pub const DEFAULT_SCHEMA_DIR: &str = "database/schema";

#[derive(Debug, Clone)]
pub struct SchemaArtifacts {
    dir: PathBuf,
}

impl SchemaArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, table_name: &str) -> PathBuf {
        self.dir.join(format!("{table_name}.sql"))
    }

    /// Write (or overwrite) the schema text for a table.
    pub async fn write(&self, table_name: &str, ddl: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(table_name);
        fs::write(&path, ddl).await?;
        Ok(path)
    }

    pub async fn read(&self, table_name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path_for(table_name)).await?)
    }

    /// Returns whether a file was removed.
    pub async fn delete(&self, table_name: &str) -> Result<bool> {
        remove_if_exists(&self.path_for(table_name)).await
    }
}
