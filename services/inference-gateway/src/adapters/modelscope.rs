//! ModelScope adapter: async task submission with bounded polling
//!
//! Image generation is a two-phase protocol: submit a task, then poll its
//! status until SUCCEED or FAILED. The poll budget (fixed interval × max
//! polls) bounds total wait; overrunning it is a hard failure that must
//! never rotate credentials. Task failures carry the upstream message
//! verbatim because quota complaints on this service read like
//! "Arrearage"/"Bill" prose rather than a 429.

use std::time::Duration;

use provider::{AdapterError, CredentialPolicy};
use rotation::ProviderProfile;
use serde_json::json;
use token_store::RotationWindow;
use tracing::debug;

use super::{ImageOutput, ImageSpec, excerpt};

pub const DEFAULT_BASE_URL: &str = "https://api-inference.modelscope.cn";

const DEFAULT_IMAGE_MODEL: &str = "MusePublic/489_ckpt_FLUX_1";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_POLLS: u32 = 60;

pub struct ModelScope {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl ModelScope {
    pub fn new(client: reqwest::Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Override the polling cadence (tests use millisecond intervals).
    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Rotation profile: UTC+8 billing day, credential required,
    /// arrearage/bill keyword fallback.
    pub fn profile() -> ProviderProfile {
        ProviderProfile::new(
            "modelscope",
            RotationWindow::utc_offset(8),
            CredentialPolicy::Required,
        )
        .with_quota_keywords(&["arrearage", "bill"])
    }

    pub async fn generate_image(
        &self,
        token: Option<&str>,
        spec: &ImageSpec,
    ) -> Result<ImageOutput, AdapterError> {
        let task_id = self.submit_task(token, spec).await?;
        debug!(task_id, "image task submitted, polling");
        self.poll_task(token, &task_id).await
    }

    async fn submit_task(
        &self,
        token: Option<&str>,
        spec: &ImageSpec,
    ) -> Result<String, AdapterError> {
        let model = spec.model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL);
        let payload = json!({
            "model": model,
            "prompt": spec.prompt,
            "size": format!("{}x{}", spec.width, spec.height),
        });

        let mut request = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .header("X-ModelScope-Async-Mode", "true")
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
            .map_err(|e| AdapterError::InvalidResponse(format!("decoding task response: {e}")))?;
        value["task_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AdapterError::InvalidResponse("missing task_id".into()))
    }

    async fn poll_task(
        &self,
        token: Option<&str>,
        task_id: &str,
    ) -> Result<ImageOutput, AdapterError> {
        for _poll in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let mut request = self
                .client
                .get(format!("{}/v1/tasks/{task_id}", self.base_url))
                .header("X-ModelScope-Task-Type", "image_generation");
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

            let value: serde_json::Value = response.json().await.map_err(|e| {
                AdapterError::InvalidResponse(format!("decoding task status: {e}"))
            })?;

            match value["task_status"].as_str() {
                Some("SUCCEED") => {
                    let url = value["output_images"][0].as_str().ok_or_else(|| {
                        AdapterError::InvalidResponse("missing output_images[0]".into())
                    })?;
                    return Ok(ImageOutput::Url {
                        url: url.to_string(),
                    });
                }
                Some("FAILED") => {
                    let message = value["errors"]["message"]
                        .as_str()
                        .unwrap_or("task failed without a message");
                    return Err(AdapterError::TaskFailed(message.to_string()));
                }
                // PENDING / RUNNING / unknown: keep polling
                _ => continue,
            }
        }

        Err(AdapterError::PollBudgetExceeded {
            task_id: task_id.to_string(),
            polls: self.max_polls,
        })
    }
}
