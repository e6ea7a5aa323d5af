//! Offline consistency checks over a slide show's data files.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use palette::Srgb;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::manifest::MANIFEST_PATH;
use crate::model::{Manifest, Slide, Transition};
use crate::source::DataSource;
use crate::store::SlideStore;
use crate::tasks::scheduler::state::next_slide_index;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub findings: Vec<Finding>,
    pub slides_checked: usize,
    pub transitions_checked: usize,
}

impl IntegrityReport {
    fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.findings.push(Finding {
            severity,
            message: message.into(),
        });
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    /// Reports data files under the root that the manifest never mentions.
    pub fn add_unreferenced(&mut self, files: &[PathBuf]) {
        for file in files {
            self.push(
                Severity::Info,
                format!("{} is not referenced by the manifest", file.display()),
            );
        }
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sorted: Vec<&Finding> = self.findings.iter().collect();
        sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
        for finding in sorted {
            writeln!(f, "[{}] {}", finding.severity, finding.message)?;
        }
        write!(
            f,
            "checked {} slides and {} transitions: {} errors, {} warnings",
            self.slides_checked,
            self.transitions_checked,
            self.count(Severity::Error),
            self.count(Severity::Warning)
        )
    }
}

/// Loads every slide and transition through `store` and checks them.
pub async fn check_store<S: DataSource>(store: &SlideStore<S>) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    let manifest = store.manifest();
    let total = manifest.total_slides;

    for entry in &manifest.slides {
        if let Err(err) = store.ensure_slide_loaded(entry.index).await {
            report.push(Severity::Error, err.to_string());
        }
        check_palette(&mut report, entry.index, &entry.dominant_colors);
    }

    for entry in &manifest.slides {
        let Some(slide) = store.get_slide(entry.index) else {
            continue;
        };
        report.slides_checked += 1;
        check_slide(&mut report, entry.index, &slide);

        let next = next_slide_index(entry.index, total);
        if total > 1 && entry.transition_to(next).is_none() {
            report.push(
                Severity::Warning,
                format!(
                    "slide {} has no transition to slide {next}; playback will cut",
                    entry.index
                ),
            );
        }

        for reference in &entry.transitions {
            let (from, to) = (entry.index, reference.to);
            let Some(transition) = store.get_transition(from, to) else {
                report.push(
                    Severity::Error,
                    format!("transition {from} -> {to} ({}) could not be loaded", reference.filename),
                );
                continue;
            };
            let Some(target) = store.get_slide(to) else {
                continue;
            };
            report.transitions_checked += 1;
            check_transition(&mut report, &transition, &slide, &target);
            check_reverse(&mut report, store, manifest, &transition);
        }
    }

    debug!(findings = report.findings.len(), "integrity check finished");
    report
}

fn check_palette(report: &mut IntegrityReport, index: usize, colors: &[String]) {
    if colors.is_empty() {
        report.push(Severity::Info, format!("slide {index} has no dominant colors"));
    }
    for color in colors {
        if Srgb::<u8>::from_str(color.trim()).is_err() {
            report.push(
                Severity::Warning,
                format!("slide {index} dominant color {color:?} is not a hex color"),
            );
        }
    }
}

fn check_slide(report: &mut IntegrityReport, index: usize, slide: &Slide) {
    if slide.name.trim().is_empty() {
        report.push(Severity::Warning, format!("slide {index} has no name"));
    }
    if slide.triangles.is_empty() {
        report.push(Severity::Warning, format!("slide {index} has no triangles"));
    }
    let bad_opacity = slide
        .triangles
        .iter()
        .filter(|t| t.opacity.is_some_and(|o| !(0.0..=1.0).contains(&o)))
        .count();
    if bad_opacity > 0 {
        report.push(
            Severity::Warning,
            format!("slide {index} has {bad_opacity} triangles with opacity outside 0..1"),
        );
    }
    let non_finite = slide
        .triangles
        .iter()
        .filter(|t| t.coordinates.iter().flatten().any(|c| !c.is_finite()))
        .count();
    if non_finite > 0 {
        report.push(
            Severity::Error,
            format!("slide {index} has {non_finite} triangles with non-finite coordinates"),
        );
    }
}

fn check_transition(report: &mut IntegrityReport, transition: &Transition, from: &Slide, to: &Slide) {
    let label = format!("transition {} -> {}", transition.from, transition.to);
    let (from_len, to_len) = (from.triangles.len(), to.triangles.len());

    let out_of_range = transition
        .pairings
        .iter()
        .filter(|p| p.from_index >= from_len || p.to_index >= to_len)
        .count();
    if out_of_range > 0 {
        report.push(
            Severity::Error,
            format!("{label} has {out_of_range} pairings with out-of-range triangle indices"),
        );
    }

    let mut sources = HashSet::new();
    let mut targets = HashSet::new();
    let mut duplicate_sources = 0;
    for pairing in &transition.pairings {
        if !sources.insert(pairing.from_index) {
            duplicate_sources += 1;
        }
        targets.insert(pairing.to_index);
    }
    if duplicate_sources > 0 {
        report.push(
            Severity::Warning,
            format!("{label} pairs {duplicate_sources} source triangles more than once"),
        );
    }

    let unpaired_sources = (0..from_len).filter(|i| !sources.contains(i)).count();
    let unpaired_targets = (0..to_len).filter(|i| !targets.contains(i)).count();
    if unpaired_sources > 0 || unpaired_targets > 0 {
        report.push(
            Severity::Info,
            format!(
                "{label} leaves {unpaired_sources} source and {unpaired_targets} target triangles unpaired"
            ),
        );
    }
    if from_len != to_len {
        report.push(
            Severity::Info,
            format!("{label} morphs {from_len} triangles into {to_len}"),
        );
    }
}

fn check_reverse<S: DataSource>(
    report: &mut IntegrityReport,
    store: &SlideStore<S>,
    manifest: &Manifest,
    forward: &Transition,
) {
    let (from, to) = (forward.from, forward.to);
    if from == to {
        return;
    }
    let listed = manifest
        .entry(to)
        .is_some_and(|entry| entry.transition_to(from).is_some());
    if !listed {
        report.push(
            Severity::Info,
            format!("transition {from} -> {to} has no reverse transition"),
        );
        return;
    }
    // Each pair is checked from its lower index only.
    if from > to {
        return;
    }
    let Some(reverse) = store.get_transition(to, from) else {
        return;
    };
    let forward_pairs: BTreeSet<(usize, usize)> = forward
        .pairings
        .iter()
        .map(|p| (p.from_index, p.to_index))
        .collect();
    let mismatched = reverse
        .pairings
        .iter()
        .filter(|p| !forward_pairs.contains(&(p.to_index, p.from_index)))
        .count();
    if mismatched > 0 {
        report.push(
            Severity::Warning,
            format!(
                "transition {to} -> {from} has {mismatched} pairings that do not mirror {from} -> {to}"
            ),
        );
    }
}

/// JSON files below `root` that the manifest does not reference.
pub fn unreferenced_files(root: &Path, manifest: &Manifest) -> Result<Vec<PathBuf>> {
    let mut referenced: HashSet<PathBuf> = HashSet::new();
    referenced.insert(PathBuf::from(MANIFEST_PATH));
    for entry in &manifest.slides {
        referenced.insert(PathBuf::from(entry.filename.trim_start_matches('/')));
        for transition in &entry.transitions {
            referenced.insert(PathBuf::from(transition.filename.trim_start_matches('/')));
        }
    }

    let mut orphans = Vec::new();
    for item in WalkDir::new(root).follow_links(true) {
        let item = item.with_context(|| format!("walking {}", root.display()))?;
        if !item.file_type().is_file() {
            continue;
        }
        let path = item.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !referenced.contains(relative) {
            orphans.push(relative.to_path_buf());
        }
    }
    orphans.sort();
    info!(count = orphans.len(), "scanned data root for unreferenced files");
    Ok(orphans)
}
