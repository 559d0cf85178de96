use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;
use crate::db::types::PreviewState;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_transition(target: PreviewState) {
    metrics::counter!("exam_preview_transitions_total", "target" => target.as_str()).increment(1);
}

pub(crate) fn record_marking_update() {
    metrics::counter!("exam_marking_updates_total").increment(1);
}

/// Write attempts rejected because the exam was already finalized.
pub(crate) fn record_locked_write(operation: &'static str) {
    metrics::counter!("exam_locked_writes_total", "operation" => operation).increment(1);
}
