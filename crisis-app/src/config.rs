use crisis_core::BackendConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no backend configured: set SUPABASE_URL and SUPABASE_ANON_KEY or add a [backend] table")]
    MissingBackend,
}

/// Credentials for non-interactive sign-in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AuthConfig {
    pub email: String,
    pub password: String,
}

/// Contents of `crisis-suite.toml`.
///
/// ```toml
/// [backend]
/// url = "https://project.supabase.co"
/// anon_key = "${SUPABASE_ANON_KEY}"
///
/// [auth]
/// email = "ops@example.org"
/// password = "${CRISIS_PASSWORD}"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: Option<BackendConfig>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl AppConfig {
    /// Loads the config file, if any, then applies `${VAR}` expansion and the
    /// `SUPABASE_URL` / `SUPABASE_ANON_KEY` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        Ok(config.resolve(|name| std::env::var(name).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        toml::from_str(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    pub fn resolve(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(backend) = self.backend.as_mut() {
            backend.url = expand_vars(&backend.url, &lookup);
            backend.anon_key = expand_vars(&backend.anon_key, &lookup);
            backend.redirect_url = backend.redirect_url.as_deref().map(|v| expand_vars(v, &lookup));
        }
        if let Some(auth) = self.auth.as_mut() {
            auth.email = expand_vars(&auth.email, &lookup);
            auth.password = expand_vars(&auth.password, &lookup);
        }

        let url = lookup("SUPABASE_URL").filter(|v| !v.trim().is_empty());
        let anon_key = lookup("SUPABASE_ANON_KEY").filter(|v| !v.trim().is_empty());
        if let Some(backend) = self.backend.as_mut() {
            if let Some(url) = url {
                backend.url = url;
            }
            if let Some(anon_key) = anon_key {
                backend.anon_key = anon_key;
            }
        } else if let (Some(url), Some(anon_key)) = (url, anon_key) {
            self.backend = Some(BackendConfig {
                url,
                anon_key,
                redirect_url: None,
            });
        }
        self
    }

    pub fn backend(&self) -> Result<&BackendConfig, ConfigError> {
        self.backend.as_ref().ok_or(ConfigError::MissingBackend)
    }
}

/// `CRISIS_CONFIG` if set, else `<config dir>/crisis-suite/crisis-suite.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CRISIS_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("crisis-suite").join("crisis-suite.toml"))
}

/// Replaces `${VAR}` with the looked-up value; unknown variables become
/// empty and an unclosed `${` is kept as is.
pub fn expand_vars(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..start + 2 + end];
        if !name.is_empty() {
            out.push_str(&lookup(name).unwrap_or_default());
        }
        rest = &rest[start + 2 + end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn expands_known_and_blanks_unknown() {
        let lookup = env(&[("A", "alpha"), ("B", "beta")]);
        assert_eq!(expand_vars("${A}-${B}", &lookup), "alpha-beta");
        assert_eq!(expand_vars("x ${MISSING} y", &lookup), "x  y");
        assert_eq!(expand_vars("keep ${OPEN", &lookup), "keep ${OPEN");
        assert_eq!(expand_vars("plain", &lookup), "plain");
    }

    #[test]
    fn file_values_expand_and_env_overrides_win() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("crisis-suite.toml");
        std::fs::write(
            &path,
            r#"
                [backend]
                url = "https://${PROJECT}.supabase.co"
                anon_key = "${KEY}"

                [auth]
                email = "ops@example.org"
                password = "${PASS}"
            "#,
        )
        .expect("write");

        let config = AppConfig::from_file(&path)
            .expect("parse")
            .resolve(env(&[("PROJECT", "demo"), ("KEY", "k1"), ("PASS", "pw")]));
        let backend = config.backend().expect("backend");
        assert_eq!(backend.url, "https://demo.supabase.co");
        assert_eq!(backend.anon_key, "k1");
        assert_eq!(config.auth.as_ref().map(|a| a.password.as_str()), Some("pw"));

        let overridden = AppConfig::from_file(&path)
            .expect("parse")
            .resolve(env(&[("SUPABASE_URL", "http://localhost:8080")]));
        assert_eq!(overridden.backend().expect("backend").url, "http://localhost:8080");
    }

    #[test]
    fn env_alone_configures_backend() {
        let config = AppConfig::default().resolve(env(&[
            ("SUPABASE_URL", "http://localhost:8080"),
            ("SUPABASE_ANON_KEY", "local-anon-key"),
        ]));
        assert_eq!(config.backend().expect("backend").anon_key, "local-anon-key");
        assert!(matches!(
            AppConfig::default().resolve(env(&[])).backend(),
            Err(ConfigError::MissingBackend)
        ));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[backend\nurl = ").expect("write");
        assert!(matches!(AppConfig::from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
