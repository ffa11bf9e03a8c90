use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;

/// Text recognition capability consumed by the validation pipeline.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognized text lines, top to bottom. Empty when nothing is legible.
    async fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>, OcrError>;
}

type RecognizerFactory = Box<dyn Fn() -> Result<Arc<dyn TextRecognizer>, OcrError> + Send + Sync>;

/// Process-wide recognizer built on first use.
///
/// Concurrent first callers share a single construction; later callers get
/// the same instance. A failed construction is retried by the next caller.
pub struct SharedRecognizer {
    cell: OnceCell<Arc<dyn TextRecognizer>>,
    factory: RecognizerFactory,
}

impl SharedRecognizer {
    pub fn lazy<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TextRecognizer>, OcrError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// Wrap an already constructed recognizer.
    pub fn ready(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(recognizer)),
            factory: Box::new(|| Err(OcrError::Unavailable("recognizer already set".to_string()))),
        }
    }

    pub async fn get(&self) -> Result<Arc<dyn TextRecognizer>, OcrError> {
        self.cell
            .get_or_try_init(|| async {
                tracing::info!("Initializing text recognizer");
                (self.factory)()
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl TextRecognizer for SharedRecognizer {
    async fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>, OcrError> {
        self.get().await?.recognize(image).await
    }
}

/// Client for Cloudflare Workers AI LLaVA model, used as a line transcriber.
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
}

#[derive(Deserialize)]
struct LlavaResponse {
    result: LlavaResult,
}

#[derive(Deserialize)]
struct LlavaResult {
    description: String,
}

const TRANSCRIBE_PROMPT: &str = concat!(
    "Transcribe every line of printed text visible in this photo exactly as written, ",
    "one line per output line, top to bottom. Keep punctuation such as colons, hyphens ",
    "and degree signs. Do not add commentary. If no text is visible, answer with nothing."
);

impl WorkersAiClient {
    pub fn new(account_id: &str, api_token: &str) -> Result<Self, OcrError> {
        if account_id.is_empty() || api_token.is_empty() {
            return Err(OcrError::Unavailable(
                "Workers AI account id and token are required".to_string(),
            ));
        }
        Ok(Self {
            http: Client::new(),
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
        })
    }

    fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(OcrError::Encode)?;
        Ok(buf.into_inner())
    }
}

#[async_trait]
impl TextRecognizer for WorkersAiClient {
    async fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>, OcrError> {
        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/@cf/llava-hf/llava-1.5-7b-hf",
            self.account_id
        );

        let png = Self::encode_png(image)?;
        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(&png),
            "prompt": TRANSCRIBE_PROMPT,
            "max_tokens": 512
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await
            .map_err(OcrError::Http)?
            .error_for_status()
            .map_err(OcrError::Http)?;

        let llava_resp: LlavaResponse = response.json().await.map_err(OcrError::Http)?;

        Ok(split_transcript(&llava_resp.result.description))
    }
}

/// Non-empty trimmed lines of a model transcript.
pub fn split_transcript(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to encode image for recognition: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Text recognizer unavailable: {0}")]
    Unavailable(String),
}
