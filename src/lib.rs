pub mod analysis;
pub mod camera;
pub mod capture;
pub mod controller;
pub mod display;
pub mod encoder;
pub mod error;
pub mod metrics;
pub mod settings;
pub mod ui;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use analysis::AnalysisClient;
use camera::{CameraBackend, SyntheticCamera, SyntheticConfig};
use controller::AppController;
use settings::{CameraBackendKind, CameraSettings, Settings};

fn camera_backend(settings: &CameraSettings) -> Arc<dyn CameraBackend> {
    let synthetic = || -> Arc<dyn CameraBackend> {
        Arc::new(SyntheticCamera::new(SyntheticConfig {
            width: settings.synthetic_width,
            height: settings.synthetic_height,
            warmup: std::time::Duration::from_millis(settings.synthetic_warmup_ms),
            ..SyntheticConfig::default()
        }))
    };

    match settings.backend {
        CameraBackendKind::Synthetic => synthetic(),
        #[cfg(feature = "webcam")]
        CameraBackendKind::Webcam => Arc::new(camera::webcam::WebcamBackend::new()),
        #[cfg(not(feature = "webcam"))]
        CameraBackendKind::Webcam => {
            log::warn!("built without the `webcam` feature; using the synthetic camera");
            synthetic()
        }
    }
}

pub fn run() -> Result<()> {
    let settings = Settings::from_env().context("Failed to load settings")?;
    utils::logging::init(settings.debug);

    info!("MindMirror starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async move {
        let backend = camera_backend(&settings.camera);
        let client = AnalysisClient::new(&settings.analysis.base_url, settings.analysis.timeout())
            .context("Failed to build analysis client")?;
        info!(
            "analysis endpoint {} (camera: {})",
            client.endpoint(),
            backend.name()
        );

        let controller = AppController::new(backend, Arc::new(client), settings);
        ui::run_console(controller).await
    })?;

    info!("MindMirror shut down");
    Ok(())
}
