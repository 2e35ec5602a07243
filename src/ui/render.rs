use std::fmt::Write as _;
use std::time::Duration;

use crate::controller::CameraStatus;
use crate::display::DisplayState;
use crate::metrics::MetricsSnapshot;

pub const WAITING_PLACEHOLDER: &str = "Waiting for first analysis...";
pub const CAMERA_DENIED_NOTICE: &str = "Could not access camera. Check permissions.";

pub fn status_line(running: bool, interval: Duration) -> String {
    if running {
        format!("Running (auto-capture every {})", human_interval(interval))
    } else {
        "Stopped".to_string()
    }
}

fn human_interval(interval: Duration) -> String {
    let ms = interval.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

pub fn camera_line(camera: Option<&CameraStatus>) -> String {
    match camera {
        Some(status) => format!(
            "camera: {} ({}) {}",
            status.session_id,
            status.backend,
            match (status.ready, status.capturing) {
                (true, true) => "live",
                (true, false) => "ready",
                (false, _) => "warming up",
            }
        ),
        None => "camera: off".to_string(),
    }
}

/// Full panel for the terminal: title, camera, status, and the analysis.
pub fn render(state: &DisplayState, camera: Option<&CameraStatus>, interval: Duration) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "MindMirror (Live)");
    let _ = writeln!(out, "{}", camera_line(camera));
    let _ = writeln!(out, "{}", status_line(state.running, interval));
    let _ = writeln!(out);
    let _ = writeln!(out, "Live Analysis");

    match &state.analysis {
        Some(analysis) => {
            let _ = writeln!(out, "Mood: {}", analysis.mood);
            let _ = writeln!(out, "Stress: {}", analysis.stress);
            let _ = writeln!(out, "Energy: {}", analysis.energy);
            let _ = writeln!(out, "Observation: {}", analysis.observation);
            let _ = writeln!(out, "Advice: {}", analysis.advice);
            if let Some(updated_at) = state.updated_at {
                let _ = writeln!(out, "(updated {})", updated_at.format("%H:%M:%S"));
            }
        }
        None => {
            let _ = writeln!(out, "{WAITING_PLACEHOLDER}");
        }
    }

    out
}

pub fn render_metrics(metrics: &MetricsSnapshot) -> String {
    let c = &metrics.counters;
    let mut out = format!(
        "cycles: dispatched={} applied={} stale={} failed={} not_ready={} inactive={} busy={}",
        c.dispatched, c.applied, c.stale, c.failed, c.skipped_not_ready, c.skipped_inactive, c.skipped_busy
    );
    if let Some(last) = metrics.recent_captures.last() {
        let _ = write!(
            out,
            "\nlast: tick {} {:?} {:?} in {}ms",
            last.seq, last.kind, last.outcome, last.total_ms
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisResult, Metric};

    const EVERY_3S: Duration = Duration::from_millis(3_000);

    #[test]
    fn stopped_without_result_shows_placeholder() {
        let text = render(&DisplayState::default(), None, EVERY_3S);
        assert!(text.contains("Stopped"));
        assert!(text.contains("camera: off"));
        assert!(text.contains(WAITING_PLACEHOLDER));
    }

    #[test]
    fn running_with_result_shows_all_fields() {
        let state = DisplayState {
            analysis: Some(AnalysisResult {
                mood: "focused".into(),
                stress: Metric::Number(2.0),
                energy: Metric::Text("medium".into()),
                observation: "leaning in".into(),
                advice: "take a sip of water".into(),
            }),
            running: true,
            ..DisplayState::default()
        };
        let text = render(&state, None, EVERY_3S);

        assert!(text.contains("Running (auto-capture every 3s)"));
        assert!(text.contains("Mood: focused"));
        assert!(text.contains("Stress: 2"));
        assert!(text.contains("Energy: medium"));
        assert!(text.contains("Observation: leaning in"));
        assert!(text.contains("Advice: take a sip of water"));
        assert!(!text.contains(WAITING_PLACEHOLDER));
    }

    #[test]
    fn sub_second_intervals_render_in_ms() {
        assert_eq!(
            status_line(true, Duration::from_millis(1_500)),
            "Running (auto-capture every 1500ms)"
        );
    }
}
