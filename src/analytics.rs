use crate::error::ApiError;
use crate::telemetry::{drivers, mean, Lap, Session, TelemetryError, TelemetryProvider};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const NO_QUICK_LAPS_PREFIX: &str = "No quick laps found";
pub const PROVIDER_ERROR_PREFIX: &str = "⚠️ FastF1 Error:";

/// Parameters of one analytics run. Every key is optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParams {
    pub year: i32,
    pub circuit: String,
    pub session: String,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            year: 2024,
            circuit: "Monaco".to_string(),
            session: "R".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub driver: String,
    pub driver_avg_lap_s: Option<f64>,
    pub avg_speed_i1: Option<f64>,
    pub avg_lap_s: Option<f64>,
}

fn fmt_opt(v: Option<f64>, precision: usize) -> String {
    match v {
        Some(v) => format!("{v:.precision$}"),
        None => "n/a".to_string(),
    }
}

impl SessionSummary {
    pub fn render(&self, params: &RunParams) -> String {
        format!(
            "📊 FastF1 Analytics\n\
             📅 Year: {}\n\
             🏁 Circuit: {}\n\
             🎬 Session: {}\n\n\
             🚗 Driver Analyzed: {}\n\
             ⏱️ Avg Driver Lap Time: {}s\n\
             ⚙️ Avg Track Speed (I1): {} km/h\n\
             📈 Overall Avg Lap Time: {}s",
            params.year,
            params.circuit,
            params.session,
            self.driver,
            fmt_opt(self.driver_avg_lap_s, 2),
            fmt_opt(self.avg_speed_i1, 1),
            fmt_opt(self.avg_lap_s, 2),
        )
    }
}

/// Summarizes the quick laps of a session around one randomly chosen driver.
/// `None` when the session has no quick laps.
pub fn summarize<R: Rng + ?Sized>(session: &Session, rng: &mut R) -> Option<SessionSummary> {
    let laps = session.quick_laps();
    let driver = drivers(&laps).choose(rng)?.clone();
    let driver_laps: Vec<&Lap> = laps.iter().copied().filter(|l| l.driver == driver).collect();

    Some(SessionSummary {
        driver_avg_lap_s: mean(driver_laps.iter().map(|l| l.lap_time_s)),
        avg_speed_i1: mean(laps.iter().map(|l| l.speed_i1)),
        avg_lap_s: mean(laps.iter().map(|l| l.lap_time_s)),
        driver,
    })
}

async fn analyze(
    provider: &dyn TelemetryProvider,
    params: &RunParams,
    timeout: Option<Duration>,
) -> Result<String, ApiError> {
    let load = provider.load_session(params.year, &params.circuit, &params.session);
    let loaded = match timeout {
        Some(limit) => tokio::time::timeout(limit, load)
            .await
            .unwrap_or_else(|_| Err(TelemetryError::Timeout(limit.as_secs()))),
        None => load.await,
    };
    let session = loaded.map_err(|e| ApiError::UpstreamData(e.to_string()))?;

    let summary = summarize(&session, &mut rand::thread_rng());
    Ok(match summary {
        Some(summary) => summary.render(params),
        None => {
            let msg = format!(
                "{NO_QUICK_LAPS_PREFIX} for {} {} ({})",
                params.circuit, params.session, params.year
            );
            tracing::warn!("{}", msg);
            msg
        }
    })
}

/// Runs one analytics query. Never fails: provider errors come back as an
/// error report string.
pub async fn run_analytics(
    provider: &dyn TelemetryProvider,
    params: &RunParams,
    timeout: Option<Duration>,
) -> String {
    tracing::info!(
        year = params.year,
        circuit = %params.circuit,
        session = %params.session,
        "analytics run started"
    );
    match analyze(provider, params, timeout).await {
        Ok(report) => {
            tracing::info!("analytics run finished");
            report
        }
        Err(e) => {
            tracing::error!(error = %e, "analytics run failed");
            format!("{PROVIDER_ERROR_PREFIX} {e}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::tests::lap;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct FixedProvider(Session);

    #[async_trait]
    impl TelemetryProvider for FixedProvider {
        async fn load_session(&self, _year: i32, _circuit: &str, _kind: &str) -> Result<Session, TelemetryError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl TelemetryProvider for FailingProvider {
        async fn load_session(&self, year: i32, circuit: &str, kind: &str) -> Result<Session, TelemetryError> {
            Err(TelemetryError::SessionNotFound {
                year,
                circuit: circuit.to_string(),
                kind: kind.to_string(),
            })
        }
    }

    #[test]
    fn params_default_per_key() {
        let p: RunParams = serde_json::from_str(r#"{"circuit":"Spa"}"#).unwrap();
        assert_eq!(p.year, 2024);
        assert_eq!(p.circuit, "Spa");
        assert_eq!(p.session, "R");
    }

    #[test]
    fn summary_for_single_driver_session() {
        let session = Session::new(
            vec![lap("VER", 80.0, 1.0), lap("VER", 82.0, 2.0)],
            Vec::new(),
        );
        let summary = summarize(&session, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(summary.driver, "VER");
        assert_eq!(summary.driver_avg_lap_s, Some(81.0));
        assert_eq!(summary.avg_lap_s, Some(81.0));
        assert_eq!(summary.avg_speed_i1, Some(210.0));
    }

    #[test]
    fn chosen_driver_average_uses_only_their_laps() {
        let session = Session::new(
            vec![lap("VER", 80.0, 1.0), lap("LEC", 84.0, 2.0)],
            Vec::new(),
        );
        let summary = summarize(&session, &mut StdRng::seed_from_u64(1)).unwrap();
        let expected = if summary.driver == "VER" { 80.0 } else { 84.0 };
        assert_eq!(summary.driver_avg_lap_s, Some(expected));
        assert_eq!(summary.avg_lap_s, Some(82.0));
    }

    #[tokio::test]
    async fn report_layout() {
        let provider = FixedProvider(Session::new(vec![lap("NOR", 90.0, 1.0)], Vec::new()));
        let report = run_analytics(&provider, &RunParams::default(), None).await;
        assert!(report.starts_with("📊 FastF1 Analytics\n📅 Year: 2024\n🏁 Circuit: Monaco\n🎬 Session: R\n\n"));
        assert!(report.contains("🚗 Driver Analyzed: NOR"));
        assert!(report.contains("⏱️ Avg Driver Lap Time: 90.00s"));
        assert!(report.contains("⚙️ Avg Track Speed (I1): 210.0 km/h"));
        assert!(report.ends_with("📈 Overall Avg Lap Time: 90.00s"));
    }

    #[tokio::test]
    async fn empty_session_reports_no_quick_laps() {
        let provider = FixedProvider(Session::default());
        let params = RunParams {
            year: 2023,
            circuit: "Imola".to_string(),
            session: "Q".to_string(),
        };
        let report = run_analytics(&provider, &params, None).await;
        assert_eq!(report, "No quick laps found for Imola Q (2023)");
    }

    #[tokio::test]
    async fn provider_failure_becomes_text() {
        let report = run_analytics(&FailingProvider, &RunParams::default(), None).await;
        assert!(report.starts_with(PROVIDER_ERROR_PREFIX));
        assert!(report.contains("Monaco"));
    }
}
