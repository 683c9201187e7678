//! Generation request parameters
//!
//! Mirrors the SD3 REST form fields. Optional parameters that the caller did
//! not set are omitted from the upstream form entirely — the API rejects
//! sentinel values like an empty style preset.

use serde::Deserialize;

/// One image-generation request as received from the caller.
///
/// No validation happens here beyond deserialization; the upstream reports
/// invalid parameters itself and that error is surfaced as fatal.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub style_preset: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,
}

fn default_output_format() -> String {
    "png".to_string()
}

fn default_cfg_scale() -> f64 {
    4.0
}

impl GenerationRequest {
    /// Render the request as upstream form fields.
    ///
    /// `default_model` applies when the caller did not pick one. A style
    /// preset of `"none"` counts as unset, matching the front-end's
    /// placeholder option.
    pub fn form_fields(&self, default_model: &str) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("prompt", self.prompt.clone()),
            ("seed", self.seed.to_string()),
            ("output_format", self.output_format.clone()),
            (
                "model",
                self.model
                    .clone()
                    .unwrap_or_else(|| default_model.to_string()),
            ),
            ("cfg_scale", self.cfg_scale.to_string()),
        ];
        if let Some(ref ratio) = self.aspect_ratio {
            fields.push(("aspect_ratio", ratio.clone()));
        }
        match self.style_preset.as_deref() {
            None | Some("none") | Some("") => {}
            Some(preset) => fields.push(("style_preset", preset.to_string())),
        }
        if let Some(ref negative) = self.negative_prompt {
            if !negative.is_empty() {
                fields.push(("negative_prompt", negative.clone()));
            }
        }
        fields
    }
}
