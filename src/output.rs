//! CLI output formatting for `generate`, `check`, and `export`.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. Every entity (image,
//! category, lesson) leads with its positional index and name; filesystem
//! paths are secondary context on indented lines, shown relative to the
//! repository root.
//!
//! # Output Format
//!
//! ## Generate
//!
//! ```text
//! Images (2)
//!     001 jp_hello
//!         Source: media/hello.png
//!         jp_hello.jpg: up to date
//!         jp_hello_tiny.jpg: rendered
//!     002 jp_bye
//!         Source: media/bye.png
//!         Error: Failed to decode ...
//!
//! Course jp: 1 category, 2 lessons, 2 items, 2 images
//! Course Tree → courses/jp (1 written, 4 unchanged)
//! Images: 1 up to date, 1 rendered, 1 failed (3 total)
//! Pruned 2 paths
//!     courses/jp/greetings/old/_lesson.yaml
//!     courses/jp/greetings/old
//! ```
//!
//! ## Export
//!
//! ```text
//! Bundle → export/jp (4 files)
//! 001 Greetings
//!     001 Hello (2 challenges, introduction)
//!     002 Goodbye (1 challenge)
//! Exported 2 lessons, 3 challenges
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::export::ExportReport;
use crate::pipeline::{CourseSummary, PipelineError, RunReport};
use crate::variants::{VariantEvent, VariantStatus};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `n noun` with a naive plural.
fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else if let Some(stem) = noun.strip_suffix('y') {
        format!("{n} {stem}ies")
    } else {
        format!("{n} {noun}s")
    }
}

/// Display `path` relative to `base` when it lies inside it.
fn display_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

// ============================================================================
// Generate
// ============================================================================

/// Format a single image progress event as display lines.
pub fn format_variant_event(event: &VariantEvent, repo: &Path) -> Vec<String> {
    match event {
        VariantEvent::Started { image_count } => vec![format!("Images ({image_count})")],
        VariantEvent::ImageProcessed {
            index,
            name,
            source,
            variants,
        } => {
            let mut lines = vec![
                format!("{}{} {}", indent(1), format_index(index + 1), name),
                format!("{}Source: {}", indent(2), display_path(source, repo)),
            ];
            for variant in variants {
                let status = match variant.status {
                    VariantStatus::UpToDate => "up to date",
                    VariantStatus::Rendered => "rendered",
                };
                lines.push(format!("{}{}: {}", indent(2), variant.file, status));
            }
            lines
        }
        VariantEvent::ImageFailed { index, failure } => vec![
            format!("{}{} {}", indent(1), format_index(index + 1), failure.image),
            format!("{}Source: {}", indent(2), display_path(&failure.source, repo)),
            format!("{}Error: {}", indent(2), failure.message),
        ],
    }
}

pub fn format_summary(summary: &CourseSummary) -> String {
    format!(
        "Course {}: {}, {}, {}, {}",
        summary.course,
        count(summary.categories, "category"),
        count(summary.lessons, "lesson"),
        count(summary.items, "item"),
        count(summary.images, "image"),
    )
}

/// Format the end-of-run report of `generate`.
pub fn format_run_report(report: &RunReport, repo: &Path) -> Vec<String> {
    let mut lines = vec![
        format_summary(&report.summary),
        format!(
            "Course Tree → {} ({} written, {} unchanged)",
            display_path(&report.course_dir, repo),
            report.files_changed,
            report.files_unchanged
        ),
        format!("Images: {}", report.variants),
    ];

    match &report.prune {
        None => lines.push("Pruning disabled".to_string()),
        Some(prune) if prune.deleted.is_empty() => lines.push("Nothing to prune".to_string()),
        Some(prune) => {
            let verb = if prune.dry_run { "Would prune" } else { "Pruned" };
            lines.push(format!("{verb} {}", count(prune.deleted.len(), "path")));
            for path in &prune.deleted {
                lines.push(format!("{}{}", indent(1), display_path(path, repo)));
            }
        }
    }

    if !report.failures.is_empty() {
        lines.push(format!("Failed {}", count(report.failures.len(), "image")));
        for failure in &report.failures {
            lines.push(format!("{}{}", indent(1), failure));
        }
    }
    lines
}

pub fn print_run_report(report: &RunReport, repo: &Path) {
    for line in format_run_report(report, repo) {
        println!("{}", line);
    }
}

// ============================================================================
// Export
// ============================================================================

/// Format the export report: the bundle's categories and lessons.
pub fn format_export_report(report: &ExportReport, repo: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "Bundle → {} ({})",
        display_path(&report.bundle_dir, repo),
        count(report.files, "file")
    )];
    for (ci, category) in report.manifest.categories.iter().enumerate() {
        lines.push(format!("{} {}", format_index(ci + 1), category.title));
        for (li, lesson) in category.lessons.iter().enumerate() {
            let mut detail = count(lesson.challenge_count, "challenge");
            if lesson.has_introduction {
                detail.push_str(", introduction");
            }
            lines.push(format!(
                "{}{} {} ({})",
                indent(1),
                format_index(li + 1),
                lesson.title,
                detail
            ));
        }
    }
    lines.push(format!(
        "Exported {}, {}",
        count(report.lesson_count(), "lesson"),
        count(report.challenge_count(), "challenge")
    ));
    lines
}

pub fn print_export_report(report: &ExportReport, repo: &Path) {
    for line in format_export_report(report, repo) {
        println!("{}", line);
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Every line of an error, prefixed for stderr.
pub fn format_error(err: &PipelineError) -> Vec<String> {
    let text = err.to_string();
    let mut lines = text.lines();
    let mut out = vec![format!("error: {}", lines.next().unwrap_or_default())];
    out.extend(lines.map(str::to_string));
    out
}

pub fn print_error(err: &PipelineError) {
    for line in format_error(err) {
        eprintln!("{}", line);
    }
}
