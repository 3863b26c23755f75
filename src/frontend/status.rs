//! Status rendering for the console
//!
//! Both renderings work purely on a [`StateView`], so they can run on any
//! thread that holds a snapshot.

use crate::session::shared::{Health, StateView};
use crate::session::types::{ArchiveStatus, Phase};

/// Format milliseconds as `MM:SS.mmm`
pub fn format_elapsed(elapsed_ms: u64) -> String {
    format!(
        "{:02}:{:02}.{:03}",
        elapsed_ms / 60_000,
        (elapsed_ms / 1000) % 60,
        elapsed_ms % 1000
    )
}

/// Headline status, including whether a fault is outstanding
pub fn status_text(view: &StateView) -> String {
    match (view.phase, view.health()) {
        (_, Health::Failed) => format!("{} (recording failed)", view.phase),
        (Phase::Recording, Health::Degraded) => "Recording (sensor error)".to_string(),
        (Phase::Archiving, _) => "Archiving".to_string(),
        (Phase::Idle, _) if view.shut_down => "Shut down".to_string(),
        (Phase::Idle, _) => "Ready".to_string(),
        (phase, _) => phase.to_string(),
    }
}

/// Description of the last archive attempt, if any
pub fn archive_text(status: &ArchiveStatus) -> Option<String> {
    match status {
        ArchiveStatus::Idle => None,
        ArchiveStatus::InProgress => Some("Archiving...".to_string()),
        ArchiveStatus::Succeeded {
            remote_id,
            file_name,
        } => Some(format!("Archived {} with ID: {}", file_name, remote_id)),
        ArchiveStatus::Failed(reason) => Some(format!("Failed to archive: {}", reason)),
    }
}

/// Full multi-line status
pub fn render_status(view: &StateView) -> String {
    let mut lines = vec![format!("Status: {}", status_text(view))];

    if let Some(name) = &view.session.file_name {
        lines.push(format!("File: {}", name));
    }
    lines.push(format!("Data Count: {}", view.session.sample_count));
    lines.push(format!("Elapsed: {}", format_elapsed(view.session.elapsed_ms)));

    match &view.latest_sample {
        Some(sample) => {
            lines.push(format!("Timestamp: {}", sample.display_timestamp()));
            lines.push(format!("Gyroscope (deg/s): {}", sample.gyro));
            lines.push(format!("Accelerometer (g): {}", sample.accel));
            lines.push(format!("Magnetometer (microteslas): {}", sample.mag));
        }
        None => lines.push("Timestamp: --".to_string()),
    }

    let stats = &view.stats;
    if stats.successful_polls + stats.failed_polls > 0 {
        lines.push(format!(
            "Rate: {:.1} Hz, {} failed polls, avg poll {:.0} us, jitter {} us",
            stats.effective_rate_hz, stats.failed_polls, stats.avg_poll_time_us, stats.jitter_us
        ));
    }

    if let Some(fault) = &view.latest_error {
        lines.push(format!("Error: {}", fault.message));
    }
    if let Some(archive) = archive_text(&view.archive_status) {
        lines.push(archive);
    }

    lines.join("\n")
}

/// Compact one-line status for the live display
pub fn render_status_line(view: &StateView) -> String {
    let mut line = format!(
        "[{}] #{} {}",
        status_text(view),
        view.session.sample_count,
        format_elapsed(view.session.elapsed_ms)
    );
    if let Some(sample) = &view.latest_sample {
        line.push_str(&format!(
            " | gyro {} accel {} mag {}",
            sample.gyro, sample.accel, sample.mag
        ));
    }
    if let Some(fault) = &view.latest_error {
        line.push_str(&format!(" | error: {}", fault.message));
    }
    line
}

/// Pretty JSON of the whole snapshot
pub fn render_json(view: &StateView) -> serde_json::Result<String> {
    serde_json::to_string_pretty(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::source::AcquisitionStats;
    use crate::session::shared::SharedState;
    use crate::session::types::{SampleFault, SessionInfo};
    use crate::types::{RawReading, Sample};
    use chrono::Utc;
    use std::path::PathBuf;

    fn recording_view() -> StateView {
        let state = SharedState::new();
        let publisher = state.begin_session(SessionInfo::for_log(PathBuf::from("sensor_data/walk.csv")));
        let reading = RawReading::new((1.0, 2.0, 3.0), (0.0, 0.0, 1.0), (22.0, -4.5, 41.0));
        publisher.publish_sample(Sample::new(9, reading, Utc::now()), 1234, AcquisitionStats::default());
        state.snapshot()
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00.000");
        assert_eq!(format_elapsed(61_005), "01:01.005");
    }

    #[test]
    fn test_render_status() {
        let text = render_status(&recording_view());
        assert!(text.starts_with("Status: Recording"));
        assert!(text.contains("File: walk.csv"));
        assert!(text.contains("Data Count: 10"));
        assert!(text.contains("Elapsed: 00:01.234"));
        assert!(text.contains("Gyroscope (deg/s): (1.000, 2.000, 3.000)"));
        assert!(!text.contains("Error:"));
    }

    #[test]
    fn test_status_shows_faults() {
        let mut view = recording_view();
        view.latest_error = Some(SampleFault::transient("no ACK"));
        assert_eq!(status_text(&view), "Recording (sensor error)");
        assert!(render_status_line(&view).ends_with("| error: no ACK"));
    }

    #[test]
    fn test_archive_text() {
        assert_eq!(archive_text(&ArchiveStatus::Idle), None);
        let done = ArchiveStatus::Succeeded {
            remote_id: "1xYz".into(),
            file_name: "walk.csv".into(),
        };
        assert_eq!(
            archive_text(&done).as_deref(),
            Some("Archived walk.csv with ID: 1xYz")
        );
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&recording_view()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["phase"], "Recording");
        assert_eq!(value["session"]["sample_count"], 10);
        assert_eq!(value["latest_sample"]["packet_number"], 9);
    }
}
