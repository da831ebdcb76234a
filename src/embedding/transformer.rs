// src/embedding/transformer.rs

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{self, BertModel, DTYPE};
use candle_transformers::models::xlm_roberta::{self, XLMRobertaModel};
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokenizers::{PaddingStrategy, Tokenizer, TruncationParams};

use crate::embedding::{EncodedBatch, TokenEncoder};
use crate::error::EmbeddingError;

/// Files of a HuggingFace-style model directory.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelPaths {
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        }
    }
}

#[derive(Deserialize)]
struct ConfigHeader {
    hidden_size: usize,
    #[serde(default)]
    model_type: Option<String>,
}

/// Encoder families the loader understands, keyed by `model_type` in
/// `config.json`. A config without `model_type` is treated as BERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Bert,
    XlmRoberta,
}

impl Architecture {
    pub fn from_model_type(model_type: Option<&str>) -> Result<Self, String> {
        match model_type.map(|t| t.to_lowercase()) {
            None => Ok(Architecture::Bert),
            Some(t) if t == "bert" => Ok(Architecture::Bert),
            Some(t) if t == "xlm-roberta" || t == "xlm_roberta" => Ok(Architecture::XlmRoberta),
            Some(t) => Err(format!("unsupported model_type '{}'", t)),
        }
    }
}

enum EncoderModel {
    Bert(BertModel),
    XlmRoberta(XLMRobertaModel),
}

/// Transformer encoder (tokenizer + model) running on a candle device.
pub struct TransformerEncoder {
    architecture: Architecture,
    model: EncoderModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
}

impl TransformerEncoder {
    /// Loads config, tokenizer and safetensors weights. Inputs longer than
    /// `max_length` tokens are truncated; each batch is padded to its
    /// longest member.
    pub fn load(paths: &ModelPaths, max_length: usize, device: &Device) -> Result<Self, EmbeddingError> {
        let load_err = |path: &Path, reason: String| EmbeddingError::ModelLoad {
            path: path.display().to_string(),
            reason,
        };

        let config_text = std::fs::read_to_string(&paths.config)
            .map_err(|e| load_err(&paths.config, e.to_string()))?;
        let header: ConfigHeader = serde_json::from_str(&config_text)
            .map_err(|e| load_err(&paths.config, e.to_string()))?;
        let architecture = Architecture::from_model_type(header.model_type.as_deref())
            .map_err(|reason| load_err(&paths.config, reason))?;
        let hidden_size = header.hidden_size;

        let mut tokenizer = Tokenizer::from_file(&paths.tokenizer)
            .map_err(|e| load_err(&paths.tokenizer, e.to_string()))?;
        // BERT pads with [PAD]=0, XLM-R with <pad>=1; prefer the tokenizer's
        // own padding config and fall back to whichever token the vocab has.
        let mut padding = tokenizer.get_padding().cloned().unwrap_or_default();
        if tokenizer.get_padding().is_none() {
            if let Some((token, id)) = ["[PAD]", "<pad>"]
                .iter()
                .find_map(|t| tokenizer.token_to_id(t).map(|id| (t.to_string(), id)))
            {
                padding.pad_token = token;
                padding.pad_id = id;
            }
        }
        padding.strategy = PaddingStrategy::BatchLongest;
        tokenizer.with_padding(Some(padding));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        if !paths.weights.exists() {
            return Err(load_err(&paths.weights, "weights file not found".to_string()));
        }
        // Safety: the weights file is memory-mapped read-only for the lifetime
        // of the model and is not modified while the process runs.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&paths.weights], DTYPE, device) }
            .map_err(|e| load_err(&paths.weights, e.to_string()))?;
        let model = match architecture {
            Architecture::Bert => {
                let config: bert::Config = serde_json::from_str(&config_text)
                    .map_err(|e| load_err(&paths.config, e.to_string()))?;
                EncoderModel::Bert(
                    BertModel::load(vb, &config).map_err(|e| load_err(&paths.weights, e.to_string()))?,
                )
            }
            Architecture::XlmRoberta => {
                let config: xlm_roberta::Config = serde_json::from_str(&config_text)
                    .map_err(|e| load_err(&paths.config, e.to_string()))?;
                EncoderModel::XlmRoberta(
                    XLMRobertaModel::new(&config, vb)
                        .map_err(|e| load_err(&paths.weights, e.to_string()))?,
                )
            }
        };

        info!(
            "Loaded {:?} encoder (hidden size {}, max length {}) from {}",
            architecture,
            hidden_size,
            max_length,
            paths.weights.display()
        );

        Ok(Self {
            architecture,
            model,
            tokenizer,
            device: device.clone(),
            hidden_size,
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    fn stack_rows(&self, rows: Vec<&[u32]>) -> Result<Tensor, EmbeddingError> {
        let tensors = rows
            .into_iter()
            .map(|row| Tensor::new(row, &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Tensor::stack(&tensors, 0)?)
    }
}

impl TokenEncoder for TransformerEncoder {
    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn encode(&self, texts: &[String]) -> Result<EncodedBatch, EmbeddingError> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let input_ids = self.stack_rows(encodings.iter().map(|e| e.get_ids()).collect())?;
        let attention_mask =
            self.stack_rows(encodings.iter().map(|e| e.get_attention_mask()).collect())?;
        let token_type_ids = input_ids.zeros_like()?;
        debug!("Encoding batch with input shape {:?}", input_ids.shape());

        let hidden_states = match &self.model {
            EncoderModel::Bert(model) => {
                model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?
            }
            EncoderModel::XlmRoberta(model) => {
                model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?
            }
        };

        Ok(EncodedBatch {
            hidden_states,
            attention_mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths_layout() {
        let paths = ModelPaths::from_dir(Path::new("models/bert"));
        assert_eq!(paths.config, PathBuf::from("models/bert/config.json"));
        assert_eq!(paths.tokenizer, PathBuf::from("models/bert/tokenizer.json"));
        assert_eq!(paths.weights, PathBuf::from("models/bert/model.safetensors"));
    }

    #[test]
    fn test_architecture_from_model_type() {
        assert_eq!(Architecture::from_model_type(None), Ok(Architecture::Bert));
        assert_eq!(Architecture::from_model_type(Some("bert")), Ok(Architecture::Bert));
        assert_eq!(
            Architecture::from_model_type(Some("xlm-roberta")),
            Ok(Architecture::XlmRoberta)
        );
        assert!(Architecture::from_model_type(Some("gpt2")).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_architecture() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"hidden_size": 8, "model_type": "gpt2"}"#,
        )
        .unwrap();
        let paths = ModelPaths::from_dir(dir.path());
        match TransformerEncoder::load(&paths, 64, &Device::Cpu) {
            Err(EmbeddingError::ModelLoad { path, reason }) => {
                assert!(path.ends_with("config.json"));
                assert!(reason.contains("gpt2"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("an unknown architecture must not load"),
        }
    }

    #[test]
    fn test_load_reports_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ModelPaths::from_dir(dir.path());
        match TransformerEncoder::load(&paths, 64, &Device::Cpu) {
            Err(EmbeddingError::ModelLoad { path, .. }) => assert!(path.ends_with("config.json")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("loading an empty directory must fail"),
        }
    }
}
