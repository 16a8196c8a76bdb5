//! Provider adapters
//!
//! Each adapter performs exactly one logical unit of work against its
//! remote service using the credential it is handed (or anonymously), and
//! raises a classifiable `AdapterError` on failure. The rotation executor
//! never sees a provider's wire format; adapters never see the token pool.
//!
//! Three upstream shapes are covered:
//! - `pollinations`: single GET returning image bytes, anonymous-capable
//! - `siliconflow`: JSON POST for images, SSE stream for prompt rewriting
//! - `modelscope`: async task submission plus bounded status polling

pub mod modelscope;
pub mod pollinations;
pub mod siliconflow;

use serde::{Deserialize, Serialize};

pub use modelscope::ModelScope;
pub use pollinations::Pollinations;
pub use siliconflow::SiliconFlow;

/// Provider-agnostic image generation parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSpec {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
}

fn default_dimension() -> u32 {
    1024
}

/// A generated image: a hosted URL or inline base64, whichever the
/// provider hands back.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ImageOutput {
    Url { url: String },
    Base64 { b64_json: String },
}

/// Cap upstream error bodies carried inside error messages. Some providers
/// answer failures with whole HTML pages.
pub(crate) fn excerpt(body: &str) -> String {
    const MAX: usize = 2048;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_passes_short_bodies_through() {
        assert_eq!(excerpt("quota exceeded"), "quota exceeded");
    }

    #[test]
    fn excerpt_truncates_long_bodies_on_char_boundary() {
        let body = "é".repeat(4000);
        let truncated = excerpt(&body);
        assert!(truncated.len() < body.len());
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn image_spec_defaults_dimensions() {
        let spec: ImageSpec = serde_json::from_str(r#"{"prompt":"a lighthouse"}"#).unwrap();
        assert_eq!(spec.width, 1024);
        assert_eq!(spec.height, 1024);
        assert!(spec.model.is_none());
    }

    #[test]
    fn image_output_serializes_flat() {
        let url = ImageOutput::Url {
            url: "https://cdn.example/img.png".into(),
        };
        assert_eq!(
            serde_json::to_string(&url).unwrap(),
            r#"{"url":"https://cdn.example/img.png"}"#
        );
    }
}
