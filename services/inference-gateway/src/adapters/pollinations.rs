//! Pollinations image adapter
//!
//! Simplest upstream shape: one GET with the prompt in the path, image
//! bytes in the response. Works without a credential (public tier), so the
//! profile is credential-optional; a configured token just raises the
//! allowance.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use provider::{AdapterError, CredentialPolicy};
use rotation::ProviderProfile;
use token_store::RotationWindow;

use super::{ImageOutput, ImageSpec, excerpt};

pub const DEFAULT_BASE_URL: &str = "https://image.pollinations.ai";

pub struct Pollinations {
    client: reqwest::Client,
    base_url: String,
}

impl Pollinations {
    pub fn new(client: reqwest::Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Rotation profile: UTC window, anonymous access allowed, no extra
    /// quota keywords beyond the base 429 rules.
    pub fn profile() -> ProviderProfile {
        ProviderProfile::new(
            "pollinations",
            RotationWindow::UTC,
            CredentialPolicy::Optional,
        )
    }

    /// Fetch one image. Returns the bytes base64-encoded since this
    /// upstream serves the image directly instead of hosting it.
    pub async fn generate_image(
        &self,
        token: Option<&str>,
        spec: &ImageSpec,
    ) -> Result<ImageOutput, AdapterError> {
        let mut url = format!(
            "{}/prompt/{}?width={}&height={}&nologo=true",
            self.base_url,
            urlencoding::encode(&spec.prompt),
            spec.width,
            spec.height,
        );
        if let Some(model) = &spec.model {
            url.push_str(&format!("&model={}", urlencoding::encode(model)));
        }

        let mut request = self.client.get(&url);
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

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::Transport(format!("reading image bytes: {e}")))?;
        if bytes.is_empty() {
            return Err(AdapterError::InvalidResponse("empty image body".into()));
        }

        Ok(ImageOutput::Base64 {
            b64_json: BASE64.encode(&bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_allows_anonymous_access() {
        let profile = Pollinations::profile();
        assert_eq!(profile.key(), "pollinations");
        assert_eq!(profile.credential_policy, CredentialPolicy::Optional);
        assert!(profile.quota_keywords.is_empty());
    }
}
