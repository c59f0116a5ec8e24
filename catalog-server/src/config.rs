//! Catalog server configuration
//!
//! All settings come from environment variables (a `.env` file is loaded
//! first by `main`):
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | DATABASE_URL | required | PostgreSQL URL |
//! | DATABASE_MAX_CONNECTIONS | 5 | pool size |
//! | HTTP_PORT | 3000 | listen port |
//! | ENVIRONMENT | development | development / staging / production |
//! | STORAGE_BACKEND | local | `local` or `s3` |
//! | UPLOAD_DIR | uploads | local storage root |
//! | UPLOAD_URL_PREFIX | /uploads | local reference prefix and static mount |
//! | S3_BUCKET | required for s3 | bucket |
//! | S3_KEY_PREFIX | product_images | object key prefix |
//! | S3_PUBLIC_BASE_URL | `https://{bucket}.s3.amazonaws.com` | URL base of references |
//! | S3_ENDPOINT_URL | - | custom endpoint (path-style addressing) |
//! | MAX_FILES_PER_REQUEST | 5 | upload cap |
//! | MAX_FILE_SIZE_BYTES | 5242880 | per-file cap |
//! | LOG_LEVEL | info | default filter when `RUST_LOG` is unset |
//! | LOG_FORMAT | pretty | `pretty` or `json` |
//! | LOG_DIR | - | daily rolling log files |

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Configuration loading error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Where uploaded images are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// Files on local disk, served back by the server itself
    Local {
        upload_dir: PathBuf,
        url_prefix: String,
    },
    /// Objects in an S3-compatible bucket
    S3 {
        bucket: String,
        key_prefix: String,
        public_base_url: String,
        endpoint_url: Option<String>,
    },
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Catalog server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    pub database_max_connections: u32,
    /// HTTP listen port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    pub storage: StorageConfig,
    pub max_files_per_request: usize,
    pub max_file_size_bytes: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let storage = match var("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".into())
            .to_lowercase()
            .as_str()
        {
            "local" => StorageConfig::Local {
                upload_dir: PathBuf::from(var("UPLOAD_DIR").unwrap_or_else(|| "uploads".into())),
                url_prefix: normalize_url_prefix(
                    &var("UPLOAD_URL_PREFIX").unwrap_or_else(|| "/uploads".into()),
                )?,
            },
            "s3" => {
                let bucket = var("S3_BUCKET").ok_or(ConfigError::Missing("S3_BUCKET"))?;
                let public_base_url = var("S3_PUBLIC_BASE_URL")
                    .unwrap_or_else(|| format!("https://{bucket}.s3.amazonaws.com"))
                    .trim_end_matches('/')
                    .to_string();
                StorageConfig::S3 {
                    key_prefix: normalize_key_prefix(
                        &var("S3_KEY_PREFIX").unwrap_or_else(|| "product_images".into()),
                    )?,
                    public_base_url,
                    endpoint_url: var("S3_ENDPOINT_URL"),
                    bucket,
                }
            }
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                    reason: "expected `local` or `s3`".into(),
                });
            }
        };

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected `pretty` or `json`".into(),
                });
            }
        };

        let max_files_per_request = parse_or(&var, "MAX_FILES_PER_REQUEST", 5usize)?;
        let max_file_size_bytes = parse_or(&var, "MAX_FILE_SIZE_BYTES", 5 * 1024 * 1024usize)?;
        if max_files_per_request == 0 || max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_FILES_PER_REQUEST",
                value: format!("{max_files_per_request} files of {max_file_size_bytes} bytes"),
                reason: "upload limits must be positive".into(),
            });
        }

        Ok(Self {
            database_url,
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5u32)?,
            http_port: parse_or(&var, "HTTP_PORT", 3000u16)?,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            storage,
            max_files_per_request,
            max_file_size_bytes,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_format,
            log_dir: var("LOG_DIR").map(PathBuf::from),
        })
    }

}

fn parse_or<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

/// `uploads/` -> `/uploads`
fn normalize_url_prefix(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() || trimmed.contains("..") {
        return Err(ConfigError::Invalid {
            name: "UPLOAD_URL_PREFIX",
            value: raw.to_string(),
            reason: "must be a non-root path".into(),
        });
    }
    Ok(format!("/{trimmed}"))
}

/// `/catalog/` -> `catalog`; every segment must be a plain name
fn normalize_key_prefix(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_matches('/');
    let plain = !trimmed.is_empty()
        && trimmed
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if !plain {
        return Err(ConfigError::Invalid {
            name: "S3_KEY_PREFIX",
            value: raw.to_string(),
            reason: "must be a non-empty key path without empty, . or .. segments".into(),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/catalog")]).unwrap();
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.max_files_per_request, 5);
        assert_eq!(config.max_file_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.log_dir.is_none());
        assert_eq!(
            config.storage,
            StorageConfig::Local {
                upload_dir: PathBuf::from("uploads"),
                url_prefix: "/uploads".into(),
            }
        );
    }

    #[test]
    fn test_database_url_required() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("DATABASE_URL"))));
        assert!(matches!(
            load(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn test_s3_backend() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/catalog"),
            ("STORAGE_BACKEND", "S3"),
            ("S3_BUCKET", "shop-assets"),
            ("S3_KEY_PREFIX", "/catalog/"),
        ])
        .unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::S3 {
                bucket: "shop-assets".into(),
                key_prefix: "catalog".into(),
                public_base_url: "https://shop-assets.s3.amazonaws.com".into(),
                endpoint_url: None,
            }
        );

        let missing = load(&[
            ("DATABASE_URL", "postgres://localhost/catalog"),
            ("STORAGE_BACKEND", "s3"),
        ]);
        assert!(matches!(missing, Err(ConfigError::Missing("S3_BUCKET"))));
    }

    #[test]
    fn test_s3_key_prefix_must_be_plain() {
        for prefix in ["/", "//", "a//b", "../up", "a/./b"] {
            let err = load(&[
                ("DATABASE_URL", "postgres://localhost/catalog"),
                ("STORAGE_BACKEND", "s3"),
                ("S3_BUCKET", "shop-assets"),
                ("S3_KEY_PREFIX", prefix),
            ])
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { name: "S3_KEY_PREFIX", .. }),
                "prefix {prefix:?}"
            );
        }
        assert_eq!(normalize_key_prefix("shop/images/").unwrap(), "shop/images");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/catalog"),
            ("HTTP_PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "HTTP_PORT", .. }));

        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/catalog"),
            ("STORAGE_BACKEND", "ftp"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "STORAGE_BACKEND", .. }));

        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/catalog"),
            ("MAX_FILES_PER_REQUEST", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_url_prefix_normalized() {
        assert_eq!(normalize_url_prefix("uploads/").unwrap(), "/uploads");
        assert_eq!(normalize_url_prefix("/static/img").unwrap(), "/static/img");
        assert!(normalize_url_prefix("/").is_err());
        assert!(normalize_url_prefix("/../etc").is_err());
    }
}
