//! M2M-100 inference on ONNX Runtime
//!
//! Runs the encoder once per line, then beam-searches the decoder with the
//! target language forced as the first generated token.

use half::f16;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::core::beam::BeamSearch;
use crate::core::config::TranslatorConfig;
use crate::core::engine::TranslationEngine;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{language_token, TargetLanguage, SOURCE_LANG};

/// Where inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

/// Numeric precision of the loaded graphs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Fp32,
    Fp16,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Fp32 => write!(f, "fp32"),
            Precision::Fp16 => write!(f, "fp16"),
        }
    }
}

/// Engine construction options
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub max_input_tokens: usize,
    pub num_beams: usize,
    pub intra_threads: usize,
    pub use_gpu: bool,
}

impl From<&TranslatorConfig> for EngineOptions {
    fn from(config: &TranslatorConfig) -> Self {
        Self {
            max_input_tokens: config.max_input_tokens,
            num_beams: config.num_beams,
            intra_threads: config.intra_threads,
            use_gpu: config.use_gpu,
        }
    }
}

/// Files that make up an exported model
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub encoder: PathBuf,
    pub decoder: PathBuf,
    pub encoder_fp16: Option<PathBuf>,
    pub decoder_fp16: Option<PathBuf>,
}

impl ModelFiles {
    /// Find model files anywhere under `dir`
    pub fn locate(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(TranslationError::ModelNotFound {
                location: dir.display().to_string(),
            });
        }

        let mut found: HashMap<String, (usize, PathBuf)> = HashMap::new();
        for entry in walkdir::WalkDir::new(dir)
            .max_depth(3)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            // Shallowest match wins
            let depth = entry.depth();
            match found.get(&name) {
                Some((seen_depth, _)) if *seen_depth <= depth => {}
                _ => {
                    found.insert(name, (depth, entry.path().to_path_buf()));
                }
            }
        }

        let require = |name: &str| {
            found.get(name).map(|(_, path)| path.clone()).ok_or_else(|| TranslationError::ModelLoad {
                message: format!("{} is missing from {}", name, dir.display()),
            })
        };

        Ok(Self {
            config: require("config.json")?,
            tokenizer: require("tokenizer.json")?,
            encoder: require("encoder_model.onnx")?,
            decoder: require("decoder_model.onnx")?,
            encoder_fp16: found.get("encoder_model_fp16.onnx").map(|(_, p)| p.clone()),
            decoder_fp16: found.get("decoder_model_fp16.onnx").map(|(_, p)| p.clone()),
        })
    }

    /// Pick the graphs for a device
    fn graphs_for(&self, device: Device) -> (Precision, &Path, &Path) {
        if device == Device::Cuda {
            if let (Some(encoder), Some(decoder)) = (&self.encoder_fp16, &self.decoder_fp16) {
                return (Precision::Fp16, encoder, decoder);
            }
            info!("FP16 graphs not available, using FP32 on the accelerator");
        }
        (Precision::Fp32, &self.encoder, &self.decoder)
    }
}

/// Generation settings read from `config.json`
#[derive(Debug, Clone, Deserialize)]
struct GenerationConfig {
    #[serde(default = "default_special_id")]
    decoder_start_token_id: u32,
    #[serde(default = "default_special_id")]
    eos_token_id: u32,
}

fn default_special_id() -> u32 {
    2
}

/// Encoder output kept between decoder steps
enum HiddenStates {
    F32(Vec<f32>),
    F16(Vec<f16>),
}

/// M2M-100 encoder/decoder pair with its tokenizer
pub struct M2M100Engine {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    generation: GenerationConfig,
    source_lang_id: u32,
    target_lang_ids: HashMap<TargetLanguage, u32>,
    max_input_tokens: usize,
    num_beams: usize,
    device: Device,
    precision: Precision,
    name: String,
}

impl fmt::Debug for M2M100Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("M2M100Engine")
            .field("name", &self.name)
            .field("device", &self.device)
            .field("precision", &self.precision)
            .finish()
    }
}

impl M2M100Engine {
    /// Load the model stored in `dir`
    pub fn load(dir: &Path, options: &EngineOptions) -> Result<Self> {
        let files = ModelFiles::locate(dir)?;

        let generation: GenerationConfig = serde_json::from_str(
            &std::fs::read_to_string(&files.config)?,
        )
        .map_err(|e| TranslationError::ModelLoad {
            message: format!("{}: {}", files.config.display(), e),
        })?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| {
            TranslationError::ModelLoad {
                message: format!("{}: {}", files.tokenizer.display(), e),
            }
        })?;

        let lang_id = |code: &str| {
            let token = language_token(code);
            tokenizer
                .token_to_id(&token)
                .ok_or_else(|| TranslationError::ModelLoad {
                    message: format!("tokenizer has no language token {}", token),
                })
        };

        let source_lang_id = lang_id(SOURCE_LANG)?;
        let mut target_lang_ids = HashMap::new();
        for lang in TargetLanguage::ALL {
            target_lang_ids.insert(lang, lang_id(lang.code())?);
        }

        let device = select_device(options.use_gpu);
        let (precision, encoder_path, decoder_path) = files.graphs_for(device);

        info!("Loading M2M-100 ({}, {})", device, precision);
        info!("  Encoder: {}", encoder_path.display());
        info!("  Decoder: {}", decoder_path.display());

        let encoder = build_session(encoder_path, device, options.intra_threads)?;
        let decoder = build_session(decoder_path, device, options.intra_threads)?;

        let name = format!(
            "{} ({}, {})",
            dir.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "m2m100".to_string()),
            device,
            precision
        );

        info!("M2M-100 loaded successfully: {}", name);

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
            generation,
            source_lang_id,
            target_lang_ids,
            max_input_tokens: options.max_input_tokens,
            num_beams: options.num_beams,
            device,
            precision,
            name,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Run the encoder over the source ids
    fn encode(&self, input_ids: &[i64]) -> Result<(usize, HiddenStates)> {
        let len = input_ids.len();
        let session = self
            .encoder
            .lock()
            .map_err(|_| TranslationError::inference("encoder session poisoned"))?;

        let ids = Tensor::from_array(([1usize, len], input_ids.to_vec()))
            .map_err(TranslationError::inference)?;
        let mask = Tensor::from_array(([1usize, len], vec![1i64; len]))
            .map_err(TranslationError::inference)?;

        let outputs = session
            .run(ort::inputs!["input_ids" => ids, "attention_mask" => mask]
                .map_err(TranslationError::inference)?)
            .map_err(TranslationError::inference)?;

        let hidden = &outputs["last_hidden_state"];
        let (shape, states) = match self.precision {
            Precision::Fp32 => {
                let (shape, data) = hidden
                    .try_extract_raw_tensor::<f32>()
                    .map_err(TranslationError::inference)?;
                (shape, HiddenStates::F32(data.to_vec()))
            }
            Precision::Fp16 => {
                let (shape, data) = hidden
                    .try_extract_raw_tensor::<f16>()
                    .map_err(TranslationError::inference)?;
                (shape, HiddenStates::F16(data.to_vec()))
            }
        };

        let hidden_size = shape.last().copied().unwrap_or(0) as usize;
        if hidden_size == 0 {
            return Err(TranslationError::inference("encoder returned an empty hidden state"));
        }

        Ok((hidden_size, states))
    }

    /// Logits of the last decoder position
    fn next_token_logits(
        &self,
        decoder_ids: &[i64],
        source_len: usize,
        hidden_size: usize,
        states: &HiddenStates,
    ) -> Result<Vec<f32>> {
        let session = self
            .decoder
            .lock()
            .map_err(|_| TranslationError::inference("decoder session poisoned"))?;

        let len = decoder_ids.len();
        let ids = Tensor::from_array(([1usize, len], decoder_ids.to_vec()))
            .map_err(TranslationError::inference)?;
        let mask = Tensor::from_array(([1usize, source_len], vec![1i64; source_len]))
            .map_err(TranslationError::inference)?;
        let hidden_shape = [1usize, source_len, hidden_size];

        let outputs = match states {
            HiddenStates::F32(data) => {
                let hidden = Tensor::from_array((hidden_shape, data.clone()))
                    .map_err(TranslationError::inference)?;
                session.run(
                    ort::inputs![
                        "input_ids" => ids,
                        "encoder_attention_mask" => mask,
                        "encoder_hidden_states" => hidden,
                    ]
                    .map_err(TranslationError::inference)?,
                )
            }
            HiddenStates::F16(data) => {
                let hidden = Tensor::from_array((hidden_shape, data.clone()))
                    .map_err(TranslationError::inference)?;
                session.run(
                    ort::inputs![
                        "input_ids" => ids,
                        "encoder_attention_mask" => mask,
                        "encoder_hidden_states" => hidden,
                    ]
                    .map_err(TranslationError::inference)?,
                )
            }
        }
        .map_err(TranslationError::inference)?;

        let logits = &outputs["logits"];
        let row: Vec<f32> = match self.precision {
            Precision::Fp32 => {
                let (shape, data) = logits
                    .try_extract_raw_tensor::<f32>()
                    .map_err(TranslationError::inference)?;
                last_row(&shape, data)?.to_vec()
            }
            Precision::Fp16 => {
                let (shape, data) = logits
                    .try_extract_raw_tensor::<f16>()
                    .map_err(TranslationError::inference)?;
                last_row(&shape, data)?.iter().map(|v| v.to_f32()).collect()
            }
        };

        Ok(row)
    }
}

impl TranslationEngine for M2M100Engine {
    fn translate_one(
        &self,
        text: &str,
        target_lang: TargetLanguage,
        max_new_tokens: usize,
    ) -> Result<String> {
        let forced_bos = *self
            .target_lang_ids
            .get(&target_lang)
            .ok_or_else(|| TranslationError::inference(format!("no token for {}", target_lang)))?;

        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(TranslationError::inference)?;

        let input_ids = build_source_ids(
            self.source_lang_id,
            encoding.get_ids(),
            self.generation.eos_token_id,
            self.max_input_tokens,
        );
        if encoding.get_ids().len() + 2 > self.max_input_tokens {
            warn!(
                "Input truncated from {} to {} tokens",
                encoding.get_ids().len() + 2,
                input_ids.len()
            );
        }

        let (hidden_size, states) = self.encode(&input_ids)?;

        let prefix = [self.generation.decoder_start_token_id as i64, forced_bos as i64];
        let search = BeamSearch::new(self.num_beams, max_new_tokens, self.generation.eos_token_id);
        let best = search.search(|generated| {
            let mut decoder_ids = Vec::with_capacity(prefix.len() + generated.len());
            decoder_ids.extend_from_slice(&prefix);
            decoder_ids.extend(generated.iter().map(|&id| id as i64));
            self.next_token_logits(&decoder_ids, input_ids.len(), hidden_size, &states)
        })?;

        let generated = best.tokens;
        debug!(
            "Generated {} tokens for {} source tokens (beams: {}, finished: {})",
            generated.len(),
            input_ids.len(),
            self.num_beams,
            best.finished
        );

        self.tokenizer
            .decode(&generated, true)
            .map(|s| s.trim().to_string())
            .map_err(TranslationError::inference)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Pick CUDA when it was compiled in, requested and usable
fn select_device(use_gpu: bool) -> Device {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

        if use_gpu {
            match CUDAExecutionProvider::default().is_available() {
                Ok(true) => return Device::Cuda,
                Ok(false) => info!("CUDA execution provider not available, using CPU"),
                Err(e) => warn!("Could not probe CUDA execution provider: {}", e),
            }
        }
    }

    #[cfg(not(feature = "cuda"))]
    if use_gpu {
        debug!("Built without CUDA support, using CPU");
    }

    Device::Cpu
}

fn build_session(path: &Path, device: Device, intra_threads: usize) -> Result<Session> {
    let builder = Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.with_intra_threads(intra_threads))
        .map_err(TranslationError::model_load)?;

    #[cfg(feature = "cuda")]
    let builder = if device == Device::Cuda {
        use ort::execution_providers::CUDAExecutionProvider;
        builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(TranslationError::model_load)?
    } else {
        builder
    };

    #[cfg(not(feature = "cuda"))]
    let _ = device;

    builder
        .commit_from_file(path)
        .map_err(|e| TranslationError::ModelLoad {
            message: format!("{}: {}", path.display(), e),
        })
}

/// `[src_lang] + tokens + [eos]`, truncated to `max_len`
fn build_source_ids(source_lang_id: u32, tokens: &[u32], eos: u32, max_len: usize) -> Vec<i64> {
    let budget = max_len.saturating_sub(2);
    let mut ids = Vec::with_capacity(tokens.len().min(budget) + 2);
    ids.push(source_lang_id as i64);
    ids.extend(tokens.iter().take(budget).map(|&t| t as i64));
    ids.push(eos as i64);
    ids
}

/// Slice of the last sequence position in a `[1, seq, vocab]` tensor
fn last_row<'a, T>(shape: &[i64], data: &'a [T]) -> Result<&'a [T]> {
    let vocab = shape.last().copied().unwrap_or(0) as usize;
    if vocab == 0 || data.len() < vocab {
        return Err(TranslationError::inference(format!(
            "unexpected logits shape {:?}",
            shape
        )));
    }
    Ok(&data[data.len() - vocab..])
}
