//! Model loading and the load-once model slot.

use once_cell::unsync::OnceCell;
use text_tokenizer::VitsTokenizer;
use tracing::{info, instrument};
use tts_core::{
    InferenceConfig, LoadedModel, ModelConfig, ModelLoader, SpeechModel, TtsError, TtsResult,
};
use vits_model::VitsModel;

use crate::device::{device_name, select_device};
use crate::hub::resolve_model_files;

/// Loads a VITS checkpoint from a local directory or the hub.
#[derive(Debug, Clone)]
pub struct HubModelLoader {
    model: ModelConfig,
    inference: InferenceConfig,
}

impl HubModelLoader {
    pub fn new(model: ModelConfig, inference: InferenceConfig) -> Self {
        Self { model, inference }
    }
}

impl ModelLoader for HubModelLoader {
    fn model_id(&self) -> &str {
        &self.model.id
    }

    #[instrument(skip(self), fields(model = %self.model.id))]
    fn load(&self) -> TtsResult<LoadedModel> {
        info!("Loading model {}", self.model.id);

        let (device, compute) = select_device(self.model.device)?;
        let files = resolve_model_files(&self.model)?;

        let tokenizer = VitsTokenizer::from_files(&files.vocab, files.tokenizer_config.as_deref())?;
        let model = VitsModel::load(&files.config, &files.weights, &device, &self.inference)?;

        let params = model.params();
        info!(
            device = device_name(model.device()),
            compute = %compute,
            sampling_rate = model.sampling_rate(),
            noise_scale = params.noise_scale,
            speaking_rate = params.speaking_rate,
            seeded = params.seed.is_some(),
            "Model loaded"
        );

        Ok(LoadedModel {
            tokenizer: Box::new(tokenizer),
            model: Box::new(model),
            compute,
        })
    }
}

/// Process-wide model state: loaded on first use, at most once.
///
/// A failed load leaves the slot empty, so a later call would retry.
pub struct ModelSlot<L> {
    loader: L,
    cell: OnceCell<LoadedModel>,
}

impl<L: ModelLoader> ModelSlot<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            cell: OnceCell::new(),
        }
    }

    /// The loaded model, loading it now if needed.
    pub fn get_or_load(&self) -> TtsResult<&LoadedModel> {
        self.cell.get_or_try_init(|| {
            self.loader.load().map_err(|e| match e {
                e @ TtsError::ModelLoad { .. } => e,
                other => TtsError::model_load(self.loader.model_id(), other),
            })
        })
    }

    /// Whether a model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The underlying loader.
    pub fn loader(&self) -> &L {
        &self.loader
    }
}

impl<L: ModelLoader> std::fmt::Debug for ModelSlot<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSlot")
            .field("model", &self.loader.model_id())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
