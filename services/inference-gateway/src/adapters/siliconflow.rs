//! SiliconFlow adapter: synchronous image generation and SSE prompt rewriting
//!
//! Image generation is a single JSON POST. Prompt optimization streams a
//! chat completion; failure on that path arrives as an `error` payload on
//! the stream rather than an HTTP status, which must surface as
//! `StreamFailed` so the classifier treats it as capacity exhaustion.
//!
//! Billing day rolls over at UTC+8 midnight, and quota complaints show up
//! as "quota"/"credit" phrases in error bodies, not always as a 429.

use futures_util::StreamExt;
use provider::{AdapterError, CredentialPolicy};
use rotation::ProviderProfile;
use serde_json::json;
use token_store::RotationWindow;

use super::{ImageOutput, ImageSpec, excerpt};

pub const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn";

const DEFAULT_IMAGE_MODEL: &str = "Kwai-Kolors/Kolors";
const DEFAULT_CHAT_MODEL: &str = "Qwen/Qwen2.5-7B-Instruct";

const OPTIMIZE_SYSTEM_PROMPT: &str = "You rewrite image-generation prompts. \
Expand the user's prompt into a single richly detailed English prompt \
covering subject, style, lighting, and composition. Reply with the rewritten \
prompt only, no commentary.";

pub struct SiliconFlow {
    client: reqwest::Client,
    base_url: String,
}

impl SiliconFlow {
    pub fn new(client: reqwest::Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Rotation profile: UTC+8 billing day, credential required,
    /// quota/credit keyword fallback.
    pub fn profile() -> ProviderProfile {
        ProviderProfile::new(
            "siliconflow",
            RotationWindow::utc_offset(8),
            CredentialPolicy::Required,
        )
        .with_quota_keywords(&["quota", "credit"])
    }

    pub async fn generate_image(
        &self,
        token: Option<&str>,
        spec: &ImageSpec,
    ) -> Result<ImageOutput, AdapterError> {
        let model = spec.model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL);
        let payload = json!({
            "model": model,
            "prompt": spec.prompt,
            "image_size": format!("{}x{}", spec.width, spec.height),
            "batch_size": 1,
        });

        let mut request = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .json(&payload);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Upstream {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(format!("decoding image response: {e}")))?;
        let url = value["images"][0]["url"]
            .as_str()
            .ok_or_else(|| AdapterError::InvalidResponse("missing images[0].url".into()))?;

        Ok(ImageOutput::Url {
            url: url.to_string(),
        })
    }

    /// Rewrite a raw prompt via a streamed chat completion, collecting the
    /// deltas into the final text.
    pub async fn optimize_prompt(
        &self,
        token: Option<&str>,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<String, AdapterError> {
        let payload = json!({
            "model": model.unwrap_or(DEFAULT_CHAT_MODEL),
            "stream": true,
            "messages": [
                { "role": "system", "content": OPTIMIZE_SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&payload);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Upstream {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut collected = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| AdapterError::Transport(format!("reading stream: {e}")))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim_end_matches('\r').to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    let optimized = collected.trim();
                    if optimized.is_empty() {
                        return Err(AdapterError::InvalidResponse(
                            "stream completed without content".into(),
                        ));
                    }
                    return Ok(optimized.to_string());
                }

                let event: serde_json::Value = match serde_json::from_str(data) {
                    Ok(value) => value,
                    Err(_) => continue,
                };

                // Mid-stream failures arrive as an error event, not a status
                if let Some(error) = event.get("error") {
                    let message = error["message"]
                        .as_str()
                        .unwrap_or("stream raised an unnamed error event");
                    return Err(AdapterError::StreamFailed(message.to_string()));
                }

                if let Some(delta) = event["choices"][0]["delta"]["content"].as_str() {
                    collected.push_str(delta);
                }
            }
        }

        // Stream closed without the completion marker
        Err(AdapterError::InvalidResponse(
            "stream ended before completion event".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_requires_credentials_and_carries_keywords() {
        let profile = SiliconFlow::profile();
        assert_eq!(profile.key(), "siliconflow");
        assert_eq!(profile.credential_policy, CredentialPolicy::Required);
        assert_eq!(profile.quota_keywords, vec!["quota", "credit"]);
    }
}
