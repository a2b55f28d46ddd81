//! Node check drivers
//!
//! Each `[[checks]]` entry is a command printing a JSON array of
//! `{instance, value, unit}`. Drivers run on a bounded rayon pool; results
//! come back over a bounded channel and exactly one message is collected per
//! driver, in completion order, then sorted by driver name.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;

use crate::config::CheckConfig;
use crate::runner;

/// One measurement reported by a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckValue {
    #[serde(default)]
    pub instance: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub unit: String,
}

/// Outcome of one driver
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub values: Vec<CheckValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Run every driver with at most `jobs` in flight
pub fn run_all(checks: &[CheckConfig], jobs: usize, env: &[(String, String)]) -> Result<Vec<CheckReport>> {
    if checks.is_empty() {
        return Ok(Vec::new());
    }
    let jobs = jobs.clamp(1, checks.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to create check thread pool")?;

    let (tx, rx) = mpsc::sync_channel::<CheckReport>(jobs);
    for check in checks {
        let tx = tx.clone();
        let check = check.clone();
        let env = env.to_vec();
        pool.spawn(move || {
            let report = run_one(&check, &env);
            // the receiver only goes away when collection gave up
            let _ = tx.send(report);
        });
    }
    drop(tx);

    let expected = checks.len();
    let mut reports = Vec::with_capacity(expected);
    while reports.len() < expected {
        match rx.recv() {
            Ok(report) => reports.push(report),
            Err(_) => break,
        }
    }
    if reports.len() < expected {
        // a worker died without reporting
        let seen: Vec<String> = reports.iter().map(|r| r.name.clone()).collect();
        for check in checks.iter().filter(|c| !seen.contains(&c.name)) {
            reports.push(CheckReport {
                name: check.name.clone(),
                values: Vec::new(),
                error: Some("driver exited without a result".to_string()),
            });
        }
    }
    reports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(reports)
}

fn run_one(check: &CheckConfig, env: &[(String, String)]) -> CheckReport {
    log::debug!("check {}: {}", check.name, check.command);
    let values = runner::run_capture(&check.command, None, env).and_then(|out| {
        serde_json::from_str::<Vec<CheckValue>>(&out)
            .with_context(|| format!("{}: invalid check output", check.name))
    });
    match values {
        Ok(values) => CheckReport {
            name: check.name.clone(),
            values,
            error: None,
        },
        Err(e) => {
            log::warn!("check {}: {e:#}", check.name);
            CheckReport {
                name: check.name.clone(),
                values: Vec::new(),
                error: Some(format!("{e:#}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, command: &str) -> CheckConfig {
        CheckConfig {
            name: name.to_string(),
            command: command.to_string(),
        }
    }

    #[test]
    fn test_run_all_collects_every_driver() {
        let checks = vec![
            check("fs_u", r#"echo '[{"instance":"/","value":42,"unit":"%"}]'"#),
            check("broken", "exit 3"),
            check("garbage", "echo not-json"),
            check("empty", "echo '[]'"),
        ];
        let reports = run_all(&checks, 2, &[]).unwrap();
        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["broken", "empty", "fs_u", "garbage"]);

        assert!(reports[1].is_ok());
        assert!(reports[1].values.is_empty());
        assert_eq!(
            reports[2].values,
            [CheckValue {
                instance: "/".into(),
                value: serde_json::json!(42),
                unit: "%".into(),
            }]
        );
        assert!(reports[0].error.as_deref().unwrap().starts_with("exit 3"));
        assert!(reports[3].error.as_deref().unwrap().contains("invalid check output"));
    }

    #[test]
    fn test_more_drivers_than_workers() {
        let checks: Vec<CheckConfig> = (0..6)
            .map(|i| check(&format!("c{i}"), &format!(r#"echo '[{{"value":{i}}}]'"#)))
            .collect();
        let reports = run_all(&checks, 1, &[]).unwrap();
        assert_eq!(reports.len(), 6);
        assert!(reports.iter().all(CheckReport::is_ok));
        assert_eq!(reports[5].values[0].value, serde_json::json!(5));
    }

    #[test]
    fn test_no_checks() {
        assert!(run_all(&[], 4, &[]).unwrap().is_empty());
    }
}
