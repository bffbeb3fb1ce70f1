//! Best-effort publishing of run results to external systems.
//!
//! Each dispatcher is optional and isolated: disabled dispatchers are
//! skipped, and failures are logged and reported as an outcome, never
//! propagated.

pub mod jira;
pub mod teams;
pub mod testrail;
pub mod transport;

use async_trait::async_trait;
use colored::Colorize;
use futures::future::join_all;
use log::{error, info};
use std::sync::Arc;

use crate::report::types::NormalizedReport;
use crate::utils::Config;
pub use transport::{HttpTransport, OutboundRequest, ReqwestTransport, TransportError};

#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Derived purely from configuration
    fn is_enabled(&self) -> bool;

    /// Publish the report; returns the number of successful outbound calls
    async fn publish(&self, report: &NormalizedReport) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Skipped(String),
    Delivered { calls: usize },
    Failed(String),
}

impl DispatchOutcome {
    pub fn print(&self, name: &str) {
        match self {
            DispatchOutcome::Skipped(reason) => {
                println!("  {} {}: skipped ({})", "○".dimmed(), name, reason)
            }
            DispatchOutcome::Delivered { calls } => {
                println!("  {} {}: {} call(s) delivered", "✓".green(), name, calls)
            }
            DispatchOutcome::Failed(e) => println!("  {} {}: {}", "✗".red(), name, e),
        }
    }
}

/// Run one dispatcher, swallowing its errors
pub async fn dispatch(dispatcher: &dyn Dispatcher, report: &NormalizedReport) -> DispatchOutcome {
    let name = dispatcher.name();
    if !dispatcher.is_enabled() {
        info!("{} integration not configured, skipping", name);
        return DispatchOutcome::Skipped("not configured".to_string());
    }

    match dispatcher.publish(report).await {
        Ok(calls) => {
            info!("{} notification sent ({} calls)", name, calls);
            DispatchOutcome::Delivered { calls }
        }
        Err(e) => {
            error!("{} notification failed: {:#}", name, e);
            DispatchOutcome::Failed(format!("{:#}", e))
        }
    }
}

/// Run every dispatcher concurrently; one failing never affects the others
pub async fn dispatch_all(
    dispatchers: &[Box<dyn Dispatcher>],
    report: &NormalizedReport,
) -> Vec<(&'static str, DispatchOutcome)> {
    let futures = dispatchers
        .iter()
        .map(|d| async move { (d.name(), dispatch(d.as_ref(), report).await) });
    join_all(futures).await
}

/// Every dispatcher, built from configuration; disabled ones are kept so
/// their skip is reported
pub fn configured_dispatchers(
    config: &Config,
    transport: Arc<dyn HttpTransport>,
) -> Vec<Box<dyn Dispatcher>> {
    vec![
        Box::new(testrail::TestRailDispatcher::new(
            config.testrail.clone(),
            config.environment.clone(),
            transport.clone(),
        )),
        Box::new(jira::JiraDispatcher::new(
            config.jira.clone(),
            config.ci.clone(),
            transport.clone(),
        )),
        Box::new(teams::TeamsDispatcher::new(
            config.teams.clone(),
            config.ci.clone(),
            transport,
        )),
    ]
}
