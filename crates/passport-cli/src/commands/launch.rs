//! `passport launch`: submit a document to a running orchestrator.

use std::time::Duration;

use passport_core::config::PassportConfig;
use passport_core::envelope::InvocationRequest;
use passport_core::orchestration::{
    AgentTransport, Endpoint, HttpAgentTransport, LaunchReport, LaunchRequest, ORCHESTRATE_SKILL,
};
use passport_core::PassportError;

/// Generous upper bound for a whole run; the orchestrator enforces the
/// per-stage timeouts.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub async fn run(
    document: &str,
    locale: &str,
    target: &str,
    title: Option<String>,
    url: Option<&str>,
) -> Result<(), String> {
    let config = PassportConfig::from_env();
    let endpoint = Endpoint::new(url.unwrap_or(&config.orchestrator_url));

    let mut request = LaunchRequest::new(document, locale).with_target(target);
    request.title = title;
    let payload = serde_json::to_value(&request).map_err(|e| e.to_string())?;

    println!("📄 Launching {} ({} → {}) via {}", document, locale, target, endpoint);

    let result = HttpAgentTransport::new()
        .invoke(
            &endpoint,
            InvocationRequest::new(ORCHESTRATE_SKILL, payload),
            LAUNCH_TIMEOUT,
        )
        .await
        .and_then(|value| {
            serde_json::from_value::<LaunchReport>(value)
                .map_err(|e| PassportError::upstream(format!("unexpected report: {}", e)))
        });

    match result {
        Ok(report) => {
            println!("\n✅ {}", report.final_message);
            println!("   Run:              {}", report.run_id);
            println!("   Referral (HTML):  {}", report.document_path);
            println!("   Referral (text):  {}", report.text_path);
            println!("   Patient language: {}", report.patient_lang);
            println!("   Source locale:    {}", report.source_locale);
            if !report.risks_clinic.is_empty() {
                println!("   Risks:            {}", report.risks_clinic.join("; "));
            }
            Ok(())
        }
        Err(err) => Err(describe_failure(&err)),
    }
}

fn describe_failure(err: &PassportError) -> String {
    match err.stage_name() {
        Some(stage) => format!("Run halted at stage '{}': {}", stage, err.root_cause()),
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_names_the_halting_stage() {
        let err = PassportError::halt(
            "translate",
            PassportError::stage("translate", PassportError::Timeout("240s".into())),
        );
        let message = describe_failure(&err);
        assert!(message.starts_with("Run halted at stage 'translate'"), "{}", message);
        assert!(message.contains("240s"));
    }
}
