//! Console reports for assessments

use arx_core::{
    Coverage, PackageAssessment, PatternFinding, RiskBand, SessionAssessment, Severity,
};
use colored::Colorize;

fn divider() -> String {
    "=".repeat(60)
}

fn severity_badge(severity: Severity) -> String {
    match severity {
        Severity::High => "[HIGH]".red().bold().to_string(),
        Severity::Medium => "[MEDIUM]".yellow().to_string(),
        Severity::Low => "[LOW]".cyan().to_string(),
    }
}

fn band_label(band: RiskBand) -> String {
    match band {
        RiskBand::High => band.to_string().red().bold().to_string(),
        RiskBand::Medium => band.to_string().yellow().bold().to_string(),
        RiskBand::Low => band.to_string().green().bold().to_string(),
    }
}

fn format_finding(finding: &PatternFinding) -> String {
    let mut output = format!(
        "  {} {} {} (line {})\n      {}\n",
        severity_badge(finding.severity),
        finding.pattern_id.bold(),
        finding.title,
        finding.line,
        finding.snippet.dimmed()
    );
    if !finding.recommendation.is_empty() {
        output.push_str(&format!("      -> {}\n", finding.recommendation.green()));
    }
    output
}

/// Full per-package report
pub fn format_assessment(assessment: &PackageAssessment) -> String {
    let mut output = String::new();
    let verdict = &assessment.semantic_verdict;

    output.push_str(&format!("\n{}\n", divider()));
    output.push_str(&format!(
        "{} {}\n",
        "SECURITY ANALYSIS:".cyan().bold(),
        assessment.package_name.bold()
    ));
    output.push_str(&format!("{}\n", divider()));
    output.push_str(&format!(
        "Security Score: {:.0}/100  {}\n",
        assessment.risk_score,
        band_label(assessment.risk_band())
    ));
    output.push_str(&format!(
        "Malicious Intent: {} (confidence {:.0}%{})\n",
        if verdict.malicious {
            "YES".red().bold().to_string()
        } else {
            "NO".green().to_string()
        },
        verdict.confidence * 100.0,
        if verdict.is_fallback() { ", fallback" } else { "" }
    ));

    if let Coverage::Incomplete(reason) = &assessment.coverage {
        output.push_str(&format!(
            "{} {}\n",
            "Incomplete analysis:".yellow().bold(),
            reason
        ));
    }

    if !assessment.pattern_findings.is_empty() {
        output.push_str(&format!("\n{}\n", "Pattern Findings:".bold()));
        for finding in &assessment.pattern_findings {
            output.push_str(&format_finding(finding));
        }
    }

    if !verdict.suspicious_patterns.is_empty() {
        output.push_str(&format!("\n{}\n", "Suspicious Patterns:".bold()));
        for pattern in &verdict.suspicious_patterns {
            output.push_str(&format!("  - {}\n", pattern));
        }
    }

    if !verdict.recommendations.is_empty() {
        output.push_str(&format!("\n{}\n", "Recommendations:".bold()));
        for rec in &verdict.recommendations {
            output.push_str(&format!("  - {}\n", rec.green()));
        }
    }

    if !verdict.explanation.is_empty() {
        output.push_str(&format!("\n{}\n  {}\n", "Analysis:".bold(), verdict.explanation));
    }

    output.push_str(&format!("\n{}\n", "Package Name Analysis:".bold()));
    match &assessment.name_verdict.reason {
        Some(reason) if assessment.name_verdict.is_suspicious => {
            output.push_str(&format!("  {}\n", reason.yellow()))
        }
        _ => output.push_str("  Package name appears normal\n"),
    }

    output.push_str(&format!("{}\n", divider()));
    output
}

/// One-line per-package report
pub fn format_compact(assessment: &PackageAssessment) -> String {
    let high = assessment.count_severity(Severity::High);
    let medium = assessment.count_severity(Severity::Medium);
    let low = assessment.count_severity(Severity::Low);

    let mut line = format!(
        "{} {:.0}/100 {}",
        assessment.package_name.bold(),
        assessment.risk_score,
        band_label(assessment.risk_band())
    );
    if high + medium + low > 0 {
        line.push_str(&format!(" ({} high, {} medium, {} low)", high, medium, low));
    }
    if assessment.semantic_verdict.malicious {
        line.push_str(&format!(" {}", "malicious intent".red().bold()));
    }
    if assessment.name_verdict.is_suspicious {
        line.push_str(&format!(" {}", "suspicious name".yellow()));
    }
    if !assessment.is_complete() {
        line.push_str(&format!(" {}", "incomplete".yellow()));
    }
    line
}

pub fn print_assessment(assessment: &PackageAssessment, verbose: bool) {
    if verbose {
        print!("{}", format_assessment(assessment));
    } else {
        println!("{}", format_compact(assessment));
    }
}

/// Overall verdict for the session
pub fn format_session(session: &SessionAssessment, requested: usize) -> String {
    let mut output = String::new();
    output.push_str(&format!("\n{}\n", divider()));
    output.push_str(&format!("{}\n", "OVERALL SECURITY ASSESSMENT".cyan().bold()));
    output.push_str(&format!("{}\n", divider()));

    let analyzed = session.assessments.len();
    if analyzed < requested {
        output.push_str(&format!(
            "Only {} out of {} packages were found and analyzed.\n",
            analyzed, requested
        ));
    }
    output.push_str(&format!(
        "Lowest Security Score: {:.0}/100  {}\n",
        session.minimum_score(),
        band_label(session.overall_risk)
    ));
    output.push_str(&format!(
        "Overall Confidence: {:.0}%\n",
        session.overall_confidence * 100.0
    ));

    if session.any_malicious() {
        output.push_str(&format!(
            "{}\n",
            "MALICIOUS INTENT DETECTED IN ONE OR MORE PACKAGES!".red().bold()
        ));
    }

    let incomplete: Vec<&str> = session.incomplete().map(|a| a.package_name.as_str()).collect();
    if !incomplete.is_empty() {
        output.push_str(&format!(
            "{} {}\n",
            "Not fully analyzed, review manually:".yellow(),
            incomplete.join(", ")
        ));
    }

    output.push_str(&format!("{}\n", divider()));
    output
}

pub fn print_session(session: &SessionAssessment, requested: usize) {
    print!("{}", format_session(session, requested));
}

pub fn print_not_found(packages: &[String]) {
    println!("\n{}", divider());
    println!("{}", "PACKAGES NOT FOUND".red().bold());
    println!("{}", divider());
    for package in packages {
        println!("  {} {}", "x".red(), package);
    }
    println!("{}", divider());
}
