//! Locating checkpoint files locally or on the Hugging Face Hub.

use std::path::{Path, PathBuf};

use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use text_tokenizer::{TOKENIZER_CONFIG_FILE, VOCAB_FILE};
use tracing::{debug, info, warn};
use tts_core::{ModelConfig, TtsError, TtsResult};
use vits_model::{CONFIG_FILE, PYTORCH_FILE, SAFETENSORS_FILE};

/// Paths of every file a checkpoint load needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
    pub vocab: PathBuf,
    pub tokenizer_config: Option<PathBuf>,
}

/// Resolve the model id to local files, downloading them if needed.
///
/// An id naming an existing directory is used as-is; anything else is
/// treated as a hub repository id.
pub fn resolve_model_files(config: &ModelConfig) -> TtsResult<ModelFiles> {
    let dir = Path::new(&config.id);
    if dir.is_dir() {
        debug!("Using local checkpoint directory {}", dir.display());
        return local_files(dir);
    }
    hub_files(config)
}

/// Checkpoint files inside a local directory.
pub fn local_files(dir: &Path) -> TtsResult<ModelFiles> {
    let label = dir.display().to_string();
    let require = |name: &str| {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(TtsError::model_load(&label, format!("missing {name}")))
        }
    };

    let weights = [SAFETENSORS_FILE, PYTORCH_FILE]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            TtsError::model_load(
                &label,
                format!("neither {SAFETENSORS_FILE} nor {PYTORCH_FILE} found"),
            )
        })?;
    let tokenizer_config = Some(dir.join(TOKENIZER_CONFIG_FILE)).filter(|p| p.is_file());

    Ok(ModelFiles {
        config: require(CONFIG_FILE)?,
        weights,
        vocab: require(VOCAB_FILE)?,
        tokenizer_config,
    })
}

fn hub_files(config: &ModelConfig) -> TtsResult<ModelFiles> {
    let model_id = config.id.as_str();
    info!("Fetching {} from the Hugging Face Hub", model_id);

    let token = std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty());
    let mut builder = ApiBuilder::new().with_token(token).with_progress(false);
    if let Some(cache_dir) = &config.cache_dir {
        builder = builder.with_cache_dir(cache_dir.clone());
    }
    let api = builder
        .build()
        .map_err(|e| TtsError::model_load(model_id, e))?;

    let repo = match &config.revision {
        Some(rev) => Repo::with_revision(model_id.to_string(), RepoType::Model, rev.clone()),
        None => Repo::model(model_id.to_string()),
    };
    let repo = api.repo(repo);

    let fetch = |name: &str| {
        repo.get(name)
            .map_err(|e| TtsError::model_load(model_id, format!("{name}: {e}")))
    };

    let config_path = fetch(CONFIG_FILE)?;
    let vocab = fetch(VOCAB_FILE)?;
    let tokenizer_config = optional_file(TOKENIZER_CONFIG_FILE, repo.get(TOKENIZER_CONFIG_FILE));
    let weights = fetch_weights(&repo, model_id)?;

    Ok(ModelFiles {
        config: config_path,
        weights,
        vocab,
        tokenizer_config,
    })
}

/// Keep an optional download, or warn and fall back to defaults.
///
/// The hub client reports a missing file and a failed request the same way,
/// so both are logged.
fn optional_file<E: std::fmt::Display>(
    name: &str,
    fetched: Result<PathBuf, E>,
) -> Option<PathBuf> {
    match fetched {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("{name} unavailable ({e}); using default tokenizer settings");
            None
        }
    }
}

fn fetch_weights(repo: &ApiRepo, model_id: &str) -> TtsResult<PathBuf> {
    match repo.get(SAFETENSORS_FILE) {
        Ok(path) => Ok(path),
        Err(e) => {
            debug!("{SAFETENSORS_FILE} unavailable ({e}), trying {PYTORCH_FILE}");
            repo.get(PYTORCH_FILE)
                .map_err(|e| TtsError::model_load(model_id, format!("{PYTORCH_FILE}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"{}").unwrap();
    }

    #[test]
    fn test_local_dir_prefers_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        for name in [CONFIG_FILE, VOCAB_FILE, SAFETENSORS_FILE, PYTORCH_FILE] {
            touch(dir.path(), name);
        }

        let files = local_files(dir.path()).unwrap();
        assert_eq!(files.weights, dir.path().join(SAFETENSORS_FILE));
        assert_eq!(files.tokenizer_config, None);
    }

    #[test]
    fn test_local_dir_pytorch_fallback() {
        let dir = tempfile::tempdir().unwrap();
        for name in [CONFIG_FILE, VOCAB_FILE, TOKENIZER_CONFIG_FILE, PYTORCH_FILE] {
            touch(dir.path(), name);
        }

        let files = local_files(dir.path()).unwrap();
        assert_eq!(files.weights, dir.path().join(PYTORCH_FILE));
        assert!(files.tokenizer_config.is_some());
    }

    #[test]
    fn test_local_dir_missing_weights() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), CONFIG_FILE);
        touch(dir.path(), VOCAB_FILE);

        let err = local_files(dir.path()).unwrap_err();
        assert!(matches!(err, TtsError::ModelLoad { .. }));
    }

    #[test]
    fn test_resolve_uses_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        for name in [CONFIG_FILE, VOCAB_FILE, SAFETENSORS_FILE] {
            touch(dir.path(), name);
        }
        let config = ModelConfig {
            id: dir.path().display().to_string(),
            ..Default::default()
        };
        let files = resolve_model_files(&config).unwrap();
        assert_eq!(files.config, dir.path().join(CONFIG_FILE));
    }

    #[test]
    fn test_optional_file_falls_back_on_error() {
        let path = PathBuf::from("tokenizer_config.json");
        assert_eq!(
            optional_file::<String>(TOKENIZER_CONFIG_FILE, Ok(path.clone())),
            Some(path)
        );
        assert_eq!(
            optional_file(TOKENIZER_CONFIG_FILE, Err("request error: 401 Unauthorized")),
            None
        );
    }
}
