use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::analysis::client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::capture::DEFAULT_PERIOD;
use crate::display::FreshnessPolicy;
use crate::encoder::{EncodeOptions, DEFAULT_HEIGHT, DEFAULT_QUALITY, DEFAULT_WIDTH};

pub const SETTINGS_PATH_ENV: &str = "MINDMIRROR_SETTINGS";
pub const DEFAULT_SETTINGS_PATH: &str = "mindmirror.json";
const ANALYSIS_URL_ENV: &str = "MINDMIRROR_ANALYSIS_URL";
const CAMERA_ENV: &str = "MINDMIRROR_CAMERA";
const DEBUG_ENV: &str = "MINDMIRROR_DEBUG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisSettings {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Free text sent alongside every frame.
    pub text: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            text: String::new(),
        }
    }
}

impl AnalysisSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureSettings {
    pub interval_ms: u64,
    pub quality: f32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Unset means overlapping cycles are unbounded.
    pub max_in_flight: Option<usize>,
    pub freshness: FreshnessPolicy,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_PERIOD.as_millis() as u64,
            quality: DEFAULT_QUALITY,
            width: None,
            height: None,
            max_in_flight: None,
            freshness: FreshnessPolicy::LastCompleted,
        }
    }
}

impl CaptureSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            width: self.width,
            height: self.height,
            quality: self.quality,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CameraBackendKind {
    Synthetic,
    Webcam,
}

impl CameraBackendKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "synthetic" => Some(Self::Synthetic),
            "webcam" => Some(Self::Webcam),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraSettings {
    pub backend: CameraBackendKind,
    pub device_index: u32,
    pub ready_poll_ms: u64,
    pub synthetic_width: u32,
    pub synthetic_height: u32,
    pub synthetic_warmup_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            backend: CameraBackendKind::Synthetic,
            device_index: 0,
            ready_poll_ms: 20,
            synthetic_width: DEFAULT_WIDTH,
            synthetic_height: DEFAULT_HEIGHT,
            synthetic_warmup_ms: 300,
        }
    }
}

impl CameraSettings {
    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub analysis: AnalysisSettings,
    pub capture: CaptureSettings,
    pub camera: CameraSettings,
    /// Only set from the environment.
    #[serde(skip)]
    pub debug: bool,
}

impl Settings {
    /// Read settings from `path`. A missing file means defaults; a file that
    /// does not parse is reported and replaced by defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Ok(serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!("ignoring malformed settings at {}: {}", path.display(), err);
            Self::default()
        }))
    }

    /// Settings path from the environment, then the file, then env overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(SETTINGS_PATH_ENV).unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.into());
        let mut settings = Self::load(Path::new(&path))?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ANALYSIS_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.analysis.base_url = url;
        }

        if let Some(value) = lookup(CAMERA_ENV) {
            match CameraBackendKind::parse(&value) {
                Some(kind) => self.camera.backend = kind,
                None => warn!("unknown camera backend '{}' in {}", value, CAMERA_ENV),
            }
        }

        self.debug = lookup(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_wire_contract() {
        let settings = Settings::default();
        assert_eq!(settings.analysis.base_url, "http://localhost:3001");
        assert_eq!(settings.analysis.timeout(), Duration::from_millis(30_000));
        assert_eq!(settings.capture.interval(), Duration::from_millis(3_000));
        assert!((settings.capture.quality - 0.6).abs() < f32::EPSILON);
        assert_eq!(settings.capture.max_in_flight, None);
        assert_eq!(settings.capture.freshness, FreshnessPolicy::LastCompleted);
        assert_eq!(settings.camera.backend, CameraBackendKind::Synthetic);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mindmirror.json");
        fs::write(
            &path,
            r#"{"capture":{"intervalMs":5000,"freshness":"discardStale"},"analysis":{"text":"hi"}}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.capture.interval_ms, 5_000);
        assert_eq!(settings.capture.freshness, FreshnessPolicy::DiscardStale);
        assert_eq!(settings.analysis.text, "hi");
        assert_eq!(settings.analysis.timeout_ms, 30_000);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mindmirror.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("MINDMIRROR_ANALYSIS_URL", "http://10.0.0.5:3001"),
            ("MINDMIRROR_CAMERA", "Webcam"),
            ("MINDMIRROR_DEBUG", "true"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.analysis.base_url, "http://10.0.0.5:3001");
        assert_eq!(settings.camera.backend, CameraBackendKind::Webcam);
        assert!(settings.debug);
    }
}
