//! Resolution of `file:` and `mysql:` payload references.
//!
//! The queue engine stores these payloads verbatim; only the request layer
//! looks behind them, to check a target exists on SET and to serve its
//! bytes on FETCH and DOWNLOAD.

use std::io;
use std::path::{Component, Path, PathBuf};

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use thiserror::Error;

use crate::config::PayloadConfig;
use crate::core::{Message, PayloadRef};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid locator {0:?}")]
    InvalidLocator(String),

    #[error("file {0:?} does not exist")]
    FileNotFound(String),

    #[error("record {0:?} does not exist")]
    RecordNotFound(String),

    #[error("no record storage configured")]
    NotConfigured,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Bytes behind a payload reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

impl Blob {
    fn new(data: Vec<u8>) -> Self {
        let content_type = if std::str::from_utf8(&data).is_ok() {
            "text/plain; charset=utf-8"
        } else {
            "application/octet-stream"
        };
        Self { content_type, data }
    }
}

#[derive(Debug, Clone)]
pub struct PayloadResolver {
    file_base: PathBuf,
    mysql: Option<MySqlPool>,
}

impl PayloadResolver {
    /// The MySQL pool connects lazily, so a configured but unreachable
    /// server only fails the requests that need it.
    pub fn new(config: &PayloadConfig) -> Result<Self, ResolveError> {
        let mysql = match config.mysql_url.as_deref() {
            Some(url) => Some(MySqlPoolOptions::new().max_connections(10).connect_lazy(url)?),
            None => None,
        };
        Ok(Self {
            file_base: config.file_base_path.clone(),
            mysql,
        })
    }

    /// Succeeds when `message` is plain or its target exists.
    pub async fn check(&self, message: &Message) -> Result<(), ResolveError> {
        match message.reference() {
            PayloadRef::Plain => Ok(()),
            PayloadRef::File(path) => {
                let full = self.file_path(path)?;
                match tokio::fs::metadata(&full).await {
                    Ok(meta) if meta.is_file() => Ok(()),
                    Ok(_) => Err(ResolveError::FileNotFound(path.to_string())),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        Err(ResolveError::FileNotFound(path.to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            PayloadRef::Record(locator) => {
                let (pool, table, id) = self.record_target(locator)?;
                let sql = format!("SELECT 1 FROM `{table}` WHERE id = ? LIMIT 1");
                let found: Option<i64> = sqlx::query_scalar(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await?;
                found
                    .map(|_| ())
                    .ok_or_else(|| ResolveError::RecordNotFound(locator.to_string()))
            }
        }
    }

    /// Loads the blob behind `message`; `None` for plain payloads.
    pub async fn resolve(&self, message: &Message) -> Result<Option<Blob>, ResolveError> {
        match message.reference() {
            PayloadRef::Plain => Ok(None),
            PayloadRef::File(path) => {
                let full = self.file_path(path)?;
                match tokio::fs::read(&full).await {
                    Ok(data) => Ok(Some(Blob::new(data))),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        Err(ResolveError::FileNotFound(path.to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            PayloadRef::Record(locator) => {
                let (pool, table, id) = self.record_target(locator)?;
                let sql = format!("SELECT data FROM `{table}` WHERE id = ?");
                let data: Option<Vec<u8>> = sqlx::query_scalar(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await?;
                data.map(|d| Some(Blob::new(d)))
                    .ok_or_else(|| ResolveError::RecordNotFound(locator.to_string()))
            }
        }
    }

    /// Joins `path` under the base directory. Absolute paths and `..` are
    /// rejected so a payload cannot reach outside the base.
    fn file_path(&self, path: &str) -> Result<PathBuf, ResolveError> {
        let relative = Path::new(path);
        let mut has_name = false;
        for component in relative.components() {
            match component {
                Component::Normal(_) => has_name = true,
                Component::CurDir => {}
                _ => return Err(ResolveError::InvalidLocator(path.to_string())),
            }
        }
        if !has_name {
            return Err(ResolveError::InvalidLocator(path.to_string()));
        }
        Ok(self.file_base.join(relative))
    }

    fn record_target<'a>(
        &self,
        locator: &'a str,
    ) -> Result<(&MySqlPool, &'a str, &'a str), ResolveError> {
        let (table, id) = locator
            .split_once('/')
            .filter(|(table, id)| {
                !table.is_empty()
                    && table.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
                    && !id.is_empty()
            })
            .ok_or_else(|| ResolveError::InvalidLocator(locator.to_string()))?;
        let pool = self.mysql.as_ref().ok_or(ResolveError::NotConfigured)?;
        Ok((pool, table, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(base: &Path) -> PayloadResolver {
        PayloadResolver::new(&PayloadConfig {
            file_base_path: base.to_path_buf(),
            mysql_url: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn plain_payloads_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());
        let msg = Message::from("hello");
        r.check(&msg).await.unwrap();
        assert!(r.resolve(&msg).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_payloads_are_read_from_the_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/a.txt"), "content").unwrap();
        std::fs::write(dir.path().join("b.bin"), [0xff, 0xfe, 0x00]).unwrap();
        let r = resolver(dir.path());

        let msg = Message::from("file:docs/a.txt");
        r.check(&msg).await.unwrap();
        let blob = r.resolve(&msg).await.unwrap().unwrap();
        assert_eq!(blob.data, b"content");
        assert_eq!(blob.content_type, "text/plain; charset=utf-8");

        let blob = r.resolve(&Message::from("file:b.bin")).await.unwrap().unwrap();
        assert_eq!(blob.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn missing_and_escaping_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());

        assert!(matches!(
            r.check(&Message::from("file:nope.txt")).await,
            Err(ResolveError::FileNotFound(_))
        ));
        for bad in ["file:../etc/passwd", "file:/etc/passwd", "file:", "file:."] {
            assert!(
                matches!(
                    r.check(&Message::from(bad)).await,
                    Err(ResolveError::InvalidLocator(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn record_payloads_need_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());

        assert!(matches!(
            r.check(&Message::from("mysql:blobs/1")).await,
            Err(ResolveError::NotConfigured)
        ));
        for bad in ["mysql:blobs", "mysql:/1", "mysql:blobs/", "mysql:bl obs/1", "mysql:a;b/1"] {
            assert!(
                matches!(
                    r.resolve(&Message::from(bad)).await,
                    Err(ResolveError::InvalidLocator(_))
                ),
                "{bad} should be rejected"
            );
        }
    }
}
