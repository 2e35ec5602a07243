use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoder::EncodedFrame;

/// A frame plus optional free text, submitted once per capture cycle.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub text: String,
    pub image: EncodedFrame,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>, image: EncodedFrame) -> Self {
        Self {
            text: text.into(),
            image,
        }
    }

    pub(crate) fn to_body(&self) -> AnalyzeBody<'_> {
        AnalyzeBody {
            text: &self.text,
            image_base64: self.image.to_base64(),
        }
    }
}

/// Wire shape of `POST /analyze`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalyzeBody<'a> {
    pub text: &'a str,
    pub image_base64: String,
}

/// Either a number or a label; the service is free to send both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Number(f64),
    Text(String),
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Text(String::new())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Number(value) if value.fract() == 0.0 => write!(f, "{}", *value as i64),
            Metric::Number(value) => write!(f, "{value}"),
            Metric::Text(text) => f.write_str(text),
        }
    }
}

/// Structured result from the analysis service. Treated as opaque; missing
/// fields come back empty rather than failing the cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub mood: String,
    pub stress: Metric,
    pub energy: Metric,
    pub observation: String,
    pub advice: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_accept_numbers_and_strings() {
        let result: AnalysisResult = serde_json::from_str(
            r#"{"mood":"calm","stress":3,"energy":"high","observation":"o","advice":"a"}"#,
        )
        .unwrap();

        assert_eq!(result.stress, Metric::Number(3.0));
        assert_eq!(result.energy, Metric::Text("high".into()));
        assert_eq!(result.stress.to_string(), "3");
        assert_eq!(Metric::Number(4.5).to_string(), "4.5");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let result: AnalysisResult = serde_json::from_str(r#"{"mood":"tired"}"#).unwrap();
        assert_eq!(result.mood, "tired");
        assert_eq!(result.advice, "");
        assert_eq!(result.energy.to_string(), "");
    }
}
