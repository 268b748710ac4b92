//! Cycle report commands

use advisor_lib::{engine::SourceSummary, Anomaly, CycleReport, Recommendation};
use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_savings, color_severity, color_tier, format_currency, format_gb, format_percent,
    print_heading, print_info, print_json, print_table, print_warning, OutputFormat,
};

/// Row for the per-source summary table
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Samples")]
    samples: usize,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Daily Avg")]
    daily_avg: String,
    #[tabled(rename = "Records")]
    records: u64,
    #[tabled(rename = "Volume Dev")]
    volume_deviation: String,
    #[tabled(rename = "Latency Dev")]
    latency_deviation: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Monthly Cost")]
    monthly_cost: String,
    #[tabled(rename = "Peak Hours")]
    peak_hours: String,
}

impl From<&SourceSummary> for SummaryRow {
    fn from(s: &SourceSummary) -> Self {
        let tier = match &s.tier {
            Some(t) if t.needs_change() => format!(
                "{} -> {}",
                color_tier(t.current_tier),
                color_tier(t.recommended_tier)
            ),
            Some(t) => color_tier(t.current_tier),
            None => "-".to_string(),
        };
        Self {
            source: s.source.clone(),
            samples: s.sample_count,
            total: format_gb(s.total_volume_gb),
            daily_avg: format_gb(s.daily_avg_gb),
            records: s.total_records,
            volume_deviation: format_percent(s.volume_deviation_percent),
            latency_deviation: format_percent(s.latency_deviation_percent),
            tier,
            monthly_cost: s
                .cost_estimate
                .as_ref()
                .map_or_else(|| "-".to_string(), |e| format_currency(e.total_cost)),
            peak_hours: s
                .peak_hours
                .iter()
                .map(|h| format!("{:02}h", h))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Type")]
    anomaly_type: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "At")]
    timestamp: String,
    #[tabled(rename = "Details")]
    details: String,
}

impl From<&Anomaly> for AnomalyRow {
    fn from(a: &Anomaly) -> Self {
        let details = a
            .details
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            source: a.source.clone(),
            anomaly_type: a.anomaly_type.to_string(),
            severity: color_severity(a.severity),
            timestamp: a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            details,
        }
    }
}

#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Type")]
    recommendation_type: String,
    #[tabled(rename = "Impact")]
    impact: String,
    #[tabled(rename = "Savings")]
    savings: String,
    #[tabled(rename = "Suggestion")]
    suggestion: String,
}

impl From<&Recommendation> for RecommendationRow {
    fn from(r: &Recommendation) -> Self {
        Self {
            target: r.target.clone(),
            recommendation_type: r.recommendation_type.to_string(),
            impact: r.impact.to_string(),
            savings: color_savings(r.estimated_savings),
            suggestion: r.suggestion.clone(),
        }
    }
}

/// Fetch and show the daemon's latest report
pub async fn show_report(
    client: &ApiClient,
    source: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    match client.latest_report().await? {
        Some(report) => render_report(&filter_report(report, source.as_deref()), format),
        None => {
            print_warning("The advisor has not completed a cycle yet");
            Ok(())
        }
    }
}

/// Keep only entries for one source
pub fn filter_report(mut report: CycleReport, source: Option<&str>) -> CycleReport {
    if let Some(source) = source {
        report.summaries.retain(|s| s.source == source);
        report.anomalies.retain(|a| a.source == source);
        report.recommendations.retain(|r| r.target == source);
        report.skipped.retain(|s| s.source == source);
    }
    report
}

/// Print a cycle report as tables or JSON
pub fn render_report(report: &CycleReport, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Json = format {
        return print_json(report);
    }

    print_heading(&format!("Cycle {}", report.cycle_id));
    println!(
        "Completed:              {}",
        report.cycle_timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Duration:               {} ms", report.duration_ms);
    if report.degraded {
        println!("Status:                 {}", "degraded".yellow());
    } else {
        println!("Status:                 {}", "ok".green());
    }
    println!();

    println!("{}", "Sources".bold());
    print_table(
        report.summaries.iter().map(SummaryRow::from).collect(),
        "No sources analyzed",
    );
    println!();

    println!("{}", "Anomalies".bold());
    print_table(
        report.anomalies.iter().map(AnomalyRow::from).collect(),
        "No anomalies detected",
    );
    println!();

    println!("{}", "Recommendations".bold());
    print_table(
        report
            .recommendations
            .iter()
            .map(RecommendationRow::from)
            .collect(),
        "No recommendations",
    );
    println!();

    for skipped in &report.skipped {
        print_warning(&format!("Skipped {}: {}", skipped.source, skipped.reason));
    }
    for diagnostic in &report.diagnostics {
        print_info(&format!("{:?}: {}", diagnostic.kind, diagnostic.message));
    }

    let cost = &report.cost_summary;
    println!("{}", "Costs".bold());
    println!("{}", "-".repeat(50));
    println!("Ingestion:              {}", format_currency(cost.ingestion));
    println!("Storage:                {}", format_currency(cost.storage));
    println!("Query:                  {}", format_currency(cost.query));
    println!("Total:                  {}", format_currency(cost.total).bold());
    println!(
        "{}      {}",
        "Estimated Savings:".bold(),
        color_savings(report.total_estimated_savings).bold()
    );
    println!();

    let impact = &report.cost_impact;
    println!("{}", "Monthly Storage".bold());
    println!("{}", "-".repeat(50));
    println!(
        "Current:                {}",
        format_currency(impact.current_monthly_cost)
    );
    println!(
        "After tier moves:       {}",
        format_currency(impact.projected_monthly_cost)
    );
    println!(
        "Projected Savings:      {}",
        color_savings(impact.projected_savings)
    );

    Ok(())
}
