//! Output formatting for CLI commands.

use aoform_reconcile::{Outcome, PlanAction, RunReport};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No processes declared.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string());
            println!("{json}");
        }
    }
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print a warning.
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

/// One row of the apply summary.
#[derive(Debug, Serialize, Tabled)]
pub struct ReportRow {
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "PROCESS ID")]
    #[serde(rename = "processId")]
    pub process_id: String,
    #[tabled(rename = "SPAWNED")]
    pub spawned: bool,
    #[tabled(rename = "RESULT")]
    pub result: String,
    #[tabled(rename = "DETAILS")]
    pub details: String,
}

/// One row of a dry-run plan.
#[derive(Debug, Serialize, Tabled)]
pub struct PlanRow {
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "ACTION")]
    pub action: String,
    #[tabled(rename = "PROCESS ID")]
    #[serde(rename = "processId")]
    pub process_id: String,
}

pub fn report_rows(report: &RunReport) -> Vec<ReportRow> {
    report
        .processes
        .iter()
        .map(|p| ReportRow {
            name: p.name.clone(),
            process_id: p.process_id.clone(),
            spawned: p.spawned,
            result: p.outcome.as_str().to_string(),
            details: match &p.outcome {
                Outcome::Failed { reason } => reason.clone(),
                _ => String::new(),
            },
        })
        .collect()
}

pub fn plan_rows(plan: &[(String, PlanAction)]) -> Vec<PlanRow> {
    plan.iter()
        .map(|(name, action)| {
            let (action, process_id) = match action {
                PlanAction::SpawnAndPush => ("spawn", "-".to_string()),
                PlanAction::Push { process_id } => ("push", process_id.clone()),
                PlanAction::Skip { process_id } => ("skip", process_id.clone()),
            };
            PlanRow {
                name: name.clone(),
                action: action.to_string(),
                process_id,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use aoform_reconcile::ProcessReport;

    use super::*;

    #[test]
    fn test_report_rows_carry_failure_reason() {
        let report = RunReport {
            processes: vec![
                ProcessReport {
                    name: "p1".to_string(),
                    process_id: "pid-1".to_string(),
                    spawned: true,
                    outcome: Outcome::Deployed,
                },
                ProcessReport {
                    name: "p2".to_string(),
                    process_id: "pid-2".to_string(),
                    spawned: false,
                    outcome: Outcome::Failed {
                        reason: "gave up".to_string(),
                    },
                },
            ],
        };

        let rows = report_rows(&report);
        assert_eq!(rows[0].result, "deployed");
        assert_eq!(rows[0].details, "");
        assert_eq!(rows[1].result, "failed");
        assert_eq!(rows[1].details, "gave up");
    }

    #[test]
    fn test_plan_rows() {
        let plan = vec![
            ("a".to_string(), PlanAction::SpawnAndPush),
            (
                "b".to_string(),
                PlanAction::Skip {
                    process_id: "pid-b".to_string(),
                },
            ),
        ];

        let rows = plan_rows(&plan);
        assert_eq!(rows[0].action, "spawn");
        assert_eq!(rows[0].process_id, "-");
        assert_eq!(rows[1].action, "skip");
        assert_eq!(rows[1].process_id, "pid-b");
    }

    #[test]
    fn test_rows_serialize_with_camel_case_ids() {
        let row = PlanRow {
            name: "a".to_string(),
            action: "push".to_string(),
            process_id: "pid".to_string(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["processId"], "pid");
    }
}
