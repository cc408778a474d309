//! Text tokenization for CodeT5-style checkpoints

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tokenizers::decoders::DecoderWrapper;
use tokenizers::models::bpe::BPE;
use tokenizers::models::ModelWrapper;
use tokenizers::normalizers::NormalizerWrapper;
use tokenizers::pre_tokenizers::byte_level::ByteLevel;
use tokenizers::pre_tokenizers::PreTokenizerWrapper;
use tokenizers::processors::roberta::RobertaProcessing;
use tokenizers::processors::PostProcessorWrapper;
use tokenizers::{AddedToken, Model, TokenizerBuilder, TokenizerImpl};
use tokenizers::Tokenizer as HfTokenizer;
use tracing::{debug, info};

use crate::error::{Error, Result};

const BOS: &str = "<s>";
const EOS: &str = "</s>";
const PAD: &str = "<pad>";
const UNK: &str = "<unk>";

type BuiltTokenizer = TokenizerImpl<
    ModelWrapper,
    NormalizerWrapper,
    PreTokenizerWrapper,
    PostProcessorWrapper,
    DecoderWrapper,
>;

pub struct Tokenizer {
    inner: HfTokenizer,
    /// Closing id kept through truncation.
    eos_id: Option<u32>,
}

impl Tokenizer {
    pub fn from_path(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        if tokenizer_path.exists() {
            return Self::from_tokenizer_json(&tokenizer_path);
        }

        let vocab_path = model_dir.join("vocab.json");
        let merges_path = model_dir.join("merges.txt");

        if vocab_path.exists() && merges_path.exists() {
            return Self::from_vocab_merges(model_dir, &vocab_path, &merges_path);
        }

        Err(Error::TokenizationError(format!(
            "No tokenizer found in {:?}",
            model_dir
        )))
    }

    fn from_tokenizer_json(path: &Path) -> Result<Self> {
        let inner =
            HfTokenizer::from_file(path).map_err(|e| Error::TokenizationError(e.to_string()))?;
        debug!("Loaded tokenizer from {:?}", path);
        Ok(Self::new_with_tokenizer(inner))
    }

    /// Rebuild the RoBERTa byte-level BPE tokenizer CodeT5 ships as
    /// `vocab.json` + `merges.txt`.
    fn from_vocab_merges(model_dir: &Path, vocab_path: &Path, merges_path: &Path) -> Result<Self> {
        info!("Loading BPE tokenizer from vocab.json + merges.txt");
        let vocab_str = vocab_path
            .to_str()
            .ok_or_else(|| Error::TokenizationError("Invalid vocab path".to_string()))?;
        let merges_str = merges_path
            .to_str()
            .ok_or_else(|| Error::TokenizationError("Invalid merges path".to_string()))?;

        let bpe = BPE::from_file(vocab_str, merges_str)
            .build()
            .map_err(|e| Error::TokenizationError(format!("BPE build failed: {}", e)))?;

        let config = load_tokenizer_config(model_dir)?;
        let add_prefix_space = config
            .as_ref()
            .and_then(|cfg| cfg.add_prefix_space)
            .unwrap_or(false);
        let byte_level = ByteLevel::new(add_prefix_space, true, true);

        let vocab = bpe.get_vocab();
        let bos_id = vocab.get(BOS).copied();
        let eos_id = vocab.get(EOS).copied();
        let post_processor = match (bos_id, eos_id) {
            (Some(bos), Some(eos)) => Some(PostProcessorWrapper::Roberta(RobertaProcessing::new(
                (EOS.to_string(), eos),
                (BOS.to_string(), bos),
            ))),
            _ => None,
        };

        let built: BuiltTokenizer = TokenizerBuilder::new()
            .with_model(ModelWrapper::BPE(bpe))
            .with_normalizer(None)
            .with_pre_tokenizer(Some(PreTokenizerWrapper::ByteLevel(byte_level.clone())))
            .with_post_processor(post_processor)
            .with_decoder(Some(DecoderWrapper::ByteLevel(byte_level)))
            .build()
            .map_err(|e| Error::TokenizationError(format!("Tokenizer build failed: {}", e)))?;
        let mut inner = HfTokenizer::from(built);

        let mut specials: Vec<AddedToken> = [BOS, EOS, PAD, UNK]
            .into_iter()
            .map(|token| AddedToken::from(token, true))
            .collect();
        if let Some(cfg) = config {
            let mut added: Vec<(u32, AddedTokenConfig)> = cfg
                .added_tokens_decoder
                .into_iter()
                .filter_map(|(id, entry)| id.parse::<u32>().ok().map(|id| (id, entry)))
                .collect();
            added.sort_by_key(|(id, _)| *id);
            specials.extend(
                added
                    .into_iter()
                    .filter(|(_, entry)| entry.special)
                    .map(|(_, entry)| entry.into_added_token()),
            );
        }
        inner.add_special_tokens(&specials);

        debug!("Loaded byte-level BPE tokenizer");
        Ok(Self::new_with_tokenizer(inner))
    }

    fn new_with_tokenizer(inner: HfTokenizer) -> Self {
        let eos_id = inner.token_to_id(EOS);
        Self { inner, eos_id }
    }

    /// Encode `text` with the checkpoint's special-token template, keeping at
    /// most `max_length` ids.
    ///
    /// Truncation drops whole tokens from the end of the content and keeps
    /// the closing end-of-sequence id. The result is never empty.
    pub fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| Error::TokenizationError(e.to_string()))?;
        let mut ids = encoding.get_ids().to_vec();

        if ids.len() > max_length {
            let closing = ids
                .last()
                .copied()
                .filter(|id| Some(*id) == self.eos_id);
            ids.truncate(max_length);
            if let (Some(eos), Some(last)) = (closing, ids.last_mut()) {
                *last = eos;
            }
        }

        if ids.is_empty() {
            let eos = self.eos_id.ok_or_else(|| {
                Error::TokenizationError("Empty input and no </s> token to encode it".to_string())
            })?;
            ids.push(eos);
        }

        Ok(ids)
    }

    /// Decode ids to text, dropping special tokens.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| Error::TokenizationError(e.to_string()))
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

#[derive(Debug, Deserialize)]
struct TokenizerConfigFile {
    #[serde(default)]
    add_prefix_space: Option<bool>,
    #[serde(default)]
    added_tokens_decoder: HashMap<String, AddedTokenConfig>,
}

#[derive(Debug, Deserialize)]
struct AddedTokenConfig {
    content: String,
    #[serde(default)]
    lstrip: bool,
    #[serde(default)]
    rstrip: bool,
    #[serde(default)]
    special: bool,
}

impl AddedTokenConfig {
    fn into_added_token(self) -> AddedToken {
        AddedToken::from(self.content, self.special)
            .lstrip(self.lstrip)
            .rstrip(self.rstrip)
    }
}

fn load_tokenizer_config(model_dir: &Path) -> Result<Option<TokenizerConfigFile>> {
    let config_path = model_dir.join("tokenizer_config.json");
    if !config_path.exists() {
        return Ok(None);
    }
    let config_str = fs::read_to_string(config_path)?;
    let config: TokenizerConfigFile = serde_json::from_str(&config_str)?;
    Ok(Some(config))
}
