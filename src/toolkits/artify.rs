//! VincentVanCode: image generation from prompts or code

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::tools::{required_str, ToolDefinition, Toolkit};

const IMAGE_MODEL: &str = "dall-e-3";
const IMAGE_SIZE: &str = "1024x1024";

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("OPENAI_API_KEY environment variable is not set")]
    MissingApiKey,
    #[error("Invalid image name: {0}")]
    InvalidName(String),
    #[error("Image API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Image API returned no image data")]
    EmptyResponse,
    #[error("Image download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid base64 image payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

pub struct ArtifyToolkit {
    client: Client,
    api_key: Option<String>,
    host: String,
    output_dir: PathBuf,
}

impl ArtifyToolkit {
    pub fn new(api_key: Option<&str>, host: &str, output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.map(|s| s.to_string()),
            host: host.trim_end_matches('/').to_string(),
            output_dir: output_dir.into(),
        }
    }

    /// Images land in `./tmp` under the working directory
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.openai_api_key.as_deref(),
            &config.openai_host,
            PathBuf::from("tmp"),
            config.http_timeout,
        )
    }

    /// Generate an image and save it as `<output_dir>/<image_name>`
    pub async fn create_image(&self, prompt: &str, image_name: &str) -> Result<PathBuf, ImageError> {
        let api_key = self.api_key.as_deref().ok_or(ImageError::MissingApiKey)?;
        let file_name = Path::new(image_name)
            .file_name()
            .filter(|n| *n == std::ffi::OsStr::new(image_name))
            .ok_or_else(|| ImageError::InvalidName(image_name.to_string()))?;

        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.host))
            .bearer_auth(api_key)
            .json(&json!({
                "prompt": prompt,
                "model": IMAGE_MODEL,
                "n": 1,
                "size": IMAGE_SIZE,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Image generation failed: {}", body);
            return Err(ImageError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let image = response
            .json::<ImageResponse>()
            .await?
            .data
            .into_iter()
            .next()
            .ok_or(ImageError::EmptyResponse)?;

        let bytes = match (image.b64_json, image.url) {
            (Some(b64), _) => base64::engine::general_purpose::STANDARD.decode(b64)?,
            (None, Some(url)) => self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?
                .to_vec(),
            (None, None) => return Err(ImageError::EmptyResponse),
        };

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(file_name);
        info!("Writing data to: {}", path.display());
        tokio::fs::write(&path, &bytes).await?;
        info!("Image {} saved successfully. Size: {} bytes", path.display(), bytes.len());

        Ok(path)
    }
}

#[async_trait]
impl Toolkit for ArtifyToolkit {
    fn name(&self) -> &'static str {
        "artify"
    }

    fn system(&self) -> Option<String> {
        Some(
            "Create an image given the input. If it's code, find the code snippet in question \
             first and use a summary of what the code does as a prompt."
                .to_string(),
        )
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let schema = |field: &str, desc: &str| {
            json!({
                "type": "object",
                "properties": {
                    field: {"type": "string", "description": desc},
                    "image_name": {"type": "string", "description": "The name of the image file to save."}
                },
                "required": [field, "image_name"]
            })
        };
        vec![
            ToolDefinition::new(
                "vincent_van_code",
                "Create an image based on a code snippet. Returns the path of the saved image.",
                schema("code", "The code snippet to generate the image from."),
            ),
            ToolDefinition::new(
                "create_image",
                "Create an image based on a prompt. Returns the path of the saved image.",
                schema("prompt", "The prompt to generate the image from."),
            ),
        ]
    }

    async fn call(&self, tool: &str, args: &Value) -> Result<String> {
        let prompt = match tool {
            "vincent_van_code" => required_str(args, "code")?,
            "create_image" => required_str(args, "prompt")?,
            other => anyhow::bail!("Unknown tool: {}", other),
        };
        let path = self.create_image(prompt, required_str(args, "image_name")?).await?;
        Ok(path.display().to_string())
    }
}
