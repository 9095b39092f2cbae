// src/pipeline/cycle.rs

//! One fetch cycle over the requested ports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;

use crate::error::{AppError, FailureKind, Result};
use crate::models::{
    Bulletin, Config, CredentialBundle, CycleReport, PortInfo, PortOutcome, PortResult,
};
use crate::services::{BulletinFetcher, BulletinParser, RiskClassifier, extract_port_name};
use crate::storage::{RecordStore, SaveOutcome, StoredBulletin};

/// Run one fetch cycle.
///
/// Ports are processed sequentially and each port's failure is recorded in
/// the report without stopping the others. `cancel` is checked before each
/// port.
pub async fn run_cycle(
    config: &Config,
    fetcher: &BulletinFetcher,
    store: &dyn RecordStore,
    ports: &[PortInfo],
    cancel: &AtomicBool,
) -> Result<CycleReport> {
    let started_at = Utc::now();
    let classifier = RiskClassifier::from_config(&config.risk)?;
    let parser = BulletinParser::new();
    let delay = Duration::from_millis(config.fetch.request_delay_ms);

    log::info!(
        "Starting fetch cycle: {} port(s), profile {}",
        ports.len(),
        classifier.profile().name
    );

    let mut results = Vec::with_capacity(ports.len());
    let mut cancelled = false;

    match fetcher.session().ensure_valid().await {
        Err(e) => {
            log::error!("No usable session, every port fails this cycle: {}", e);
            let message = e.to_string();
            results.extend(ports.iter().map(|port| PortResult {
                port_code: port.code.clone(),
                outcome: PortOutcome::Failed {
                    kind: FailureKind::Authentication,
                    message: message.clone(),
                },
            }));
        }
        Ok(initial) => {
            for (i, port) in ports.iter().enumerate() {
                if cancel.load(Ordering::SeqCst) {
                    log::warn!("Cycle cancelled, {} port(s) skipped", ports.len() - i);
                    cancelled = true;
                    break;
                }
                if i > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                // A refresh during an earlier port replaces the bundle for the rest.
                let bundle = fetcher
                    .session()
                    .current()
                    .await
                    .unwrap_or_else(|| initial.clone());

                let outcome =
                    match process_port(fetcher, store, &parser, &classifier, port, &bundle).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            log::warn!("{}: {}", port.code, e);
                            PortOutcome::Failed {
                                kind: e.failure_kind(),
                                message: e.to_string(),
                            }
                        }
                    };
                match &outcome {
                    PortOutcome::Unchanged { assessment, .. } => {
                        log::info!("{}: unchanged ({})", port.code, assessment.level)
                    }
                    other => log::info!("{}: {}", port.code, other.status()),
                }

                results.push(PortResult {
                    port_code: port.code.clone(),
                    outcome,
                });
            }
        }
    }

    let report = CycleReport {
        started_at,
        finished_at: Utc::now(),
        profile: classifier.profile().name.clone(),
        cancelled,
        results,
    };

    log::info!(
        "Cycle finished in {}s: {} at risk, {} safe, {} unchanged, {} failed",
        (report.finished_at - report.started_at).num_seconds(),
        report.assessed_count(),
        report.safe_count(),
        report.unchanged_count(),
        report.failure_count()
    );

    Ok(report)
}

async fn process_port(
    fetcher: &BulletinFetcher,
    store: &dyn RecordStore,
    parser: &BulletinParser,
    classifier: &RiskClassifier,
    port: &PortInfo,
    bundle: &CredentialBundle,
) -> Result<PortOutcome> {
    let fetched = fetcher.fetch(port, bundle).await?;

    let previous = match store.latest_issued_label(&port.code).await {
        Ok(previous) => previous,
        Err(e) => {
            log::warn!("{}: cannot read last issued label: {}", port.code, e);
            None
        }
    };
    if previous.as_deref() == Some(fetched.issued_label.as_str()) {
        log::info!("{}: bulletin {} already stored", port.code, fetched.issued_label);
        let outcome = analyze_content(
            parser,
            classifier,
            port,
            &fetched.issued_label,
            &fetched.content,
        )?;
        return Ok(outcome.into_unchanged());
    }

    let port_name = extract_port_name(&fetched.content).unwrap_or_else(|| port.name.clone());
    let row = StoredBulletin::new(port, &port_name, &fetched.issued_label, &fetched.content);
    let store_warning = match store.save(row).await {
        Ok(SaveOutcome::Inserted) => None,
        Ok(SaveOutcome::Duplicate) => {
            log::debug!("{}: bulletin {} was a duplicate", port.code, fetched.issued_label);
            None
        }
        Err(e) => {
            log::error!("{}: failed to store bulletin: {}", port.code, e);
            Some(persistence_warning(&e))
        }
    };

    let mut outcome = analyze_content(
        parser,
        classifier,
        port,
        &fetched.issued_label,
        &fetched.content,
    )?;
    if let Some(warning) = store_warning {
        outcome.push_warning(warning);
    }
    Ok(outcome)
}

fn persistence_warning(error: &AppError) -> String {
    match error {
        AppError::Persistence(message) => format!("persistence: {}", message),
        other => format!("persistence: {}", other),
    }
}

/// Parse and classify bulletin text for a port.
pub fn analyze_content(
    parser: &BulletinParser,
    classifier: &RiskClassifier,
    port: &PortInfo,
    issued_label: &str,
    content: &str,
) -> Result<PortOutcome> {
    let parsed = parser.parse(content)?;
    let station_id = parsed
        .station_id
        .clone()
        .unwrap_or_else(|| port.station_id.clone());
    let bulletin = parsed.into_bulletin(&port.code, station_id, issued_label, content);

    log_bulletin_warnings(&bulletin);

    let assessment = classifier.analyze_bulletin(&port.code, &bulletin.records);
    Ok(PortOutcome::from_assessment(bulletin, assessment))
}

fn log_bulletin_warnings(bulletin: &Bulletin) {
    for warning in &bulletin.warnings {
        log::warn!("{}: {}", bulletin.port_code, warning);
    }
    for (index, label) in bulletin.direction_anomalies() {
        log::warn!(
            "{}: record {} has unrecognised direction {:?}",
            bulletin.port_code,
            index,
            label
        );
    }
}

/// Re-analyse the most recently stored bulletin for a port.
pub async fn analyze_latest(
    store: &dyn RecordStore,
    parser: &BulletinParser,
    classifier: &RiskClassifier,
    port: &PortInfo,
) -> Result<PortOutcome> {
    let Some(latest) = store.latest_content(&port.code).await? else {
        return Ok(PortOutcome::Failed {
            kind: FailureKind::NoData,
            message: format!("no stored bulletin for {}", port.code),
        });
    };
    analyze_content(parser, classifier, port, &latest.issued_label, &latest.content)
}
