//! Prometheus metrics exposition
//!
//! Besides the gateway's own login counter, `/metrics` renders the
//! library's `oidc_jwks_refresh_total` and `oidc_introspections_total`.
//!
//! - `oidc_logins_total` (counter): label `outcome`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Record the outcome of a completed login callback.
pub fn record_login(outcome: &'static str) {
    metrics::counter!("oidc_logins_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_login_does_not_panic_without_recorder() {
        record_login("success");
    }

    #[test]
    fn record_login_renders_outcome_label() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_login("success");
        record_login("invalid_token");

        let output = handle.render();
        assert!(output.contains("oidc_logins_total"));
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains("outcome=\"invalid_token\""));
    }
}
