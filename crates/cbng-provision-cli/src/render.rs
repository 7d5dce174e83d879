use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use cbng_provision_core::ProvisionError;
use cbng_provision_installer::{
    ArchiveVerification, DatabaseOutcome, ExtractStatus, FetchStatus, InstallReport,
    PipelineStage, ProvisionOutcome,
};
use indicatif::{HumanBytes, HumanCount, ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

impl OutputStyle {
    pub(crate) fn detect(force_plain: bool) -> Self {
        if force_plain || std::env::var_os("NO_COLOR").is_some() {
            return Self::Plain;
        }
        resolve_output_style(std::io::stdout().is_terminal())
    }
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct StageProgress {
    style: OutputStyle,
    label: String,
    total: u64,
    current: u64,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Rich {
            println!("{}", colorize(section_style(), &format!("== {title} ==")));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn print_error(self, err: &anyhow::Error) {
        let message = match ProvisionError::find_in(err) {
            Some(classified) => format!("{err:#} (kind={})", classified.kind()),
            None => format!("{err:#}"),
        };
        let line = match self.style {
            OutputStyle::Plain => format!("error: {message}"),
            OutputStyle::Rich => format!(
                "{} {message}",
                colorize(badge_style("error"), &status_badge("error"))
            ),
        };
        eprintln!("{line}");
    }

    pub(crate) fn start_stages(self, label: &str, total: u64) -> StageProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(total.max(1));
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {prefix:<10} {msg:<9} [{bar:20.cyan/blue}] {pos}/{len} {elapsed_precise}",
            ) {
                progress_bar.set_style(style.tick_chars(".oO@* ").progress_chars("=>-"));
            }
            progress_bar.set_prefix(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        StageProgress {
            style: self.style,
            label: label.to_string(),
            total,
            current: 0,
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl StageProgress {
    /// Called as `stage` starts; every earlier stage counts as done.
    pub(crate) fn begin(&mut self, stage: PipelineStage) {
        let index = PipelineStage::ALL
            .iter()
            .position(|candidate| *candidate == stage)
            .unwrap_or_default() as u64;
        self.current = index.min(self.total);

        match &self.progress_bar {
            Some(progress_bar) => {
                progress_bar.set_position(self.current);
                progress_bar.set_message(stage.as_str());
            }
            None => println!("stage: {}", stage.as_str()),
        }
    }

    pub(crate) fn finish_success(mut self) {
        self.current = self.total;
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };

        progress_bar.finish_and_clear();
        if let Some(line) = render_progress_line(
            self.style,
            &self.label,
            self.current,
            self.total,
            Some(self.started_at.elapsed()),
        ) {
            println!("{line}");
        }
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> String {
    format!("[{}]", status.to_ascii_uppercase())
}

pub(crate) fn format_outcome_lines(outcome: &ProvisionOutcome, style: OutputStyle) -> Vec<String> {
    match outcome {
        ProvisionOutcome::AlreadyProvisioned { receipt } => vec![render_status_line(
            style,
            "ok",
            &format!(
                "{} {}-{} already provisioned (receipt written at unix {}); nothing to do",
                receipt.package, receipt.release, receipt.patch, receipt.provisioned_at_unix
            ),
        )],
        ProvisionOutcome::Provisioned(summary) => {
            let mut lines = vec![
                render_status_line(style, "info", &format_fetch_line(summary.fetch)),
                render_status_line(style, "info", &format_verify_line(&summary.verification)),
                render_status_line(style, "info", &format_install_line(&summary.install)),
            ];
            lines.extend(
                summary
                    .databases
                    .iter()
                    .map(|outcome| render_status_line(style, "info", &format_database_line(outcome))),
            );
            lines.push(render_status_line(
                style,
                "ok",
                &format!(
                    "workspace provisioned; marker {}",
                    summary.marker_path.display()
                ),
            ));
            lines
        }
    }
}

fn format_fetch_line(fetch: FetchStatus) -> String {
    match fetch {
        FetchStatus::CacheHit => "fetch: reused archive already on disk".to_string(),
        FetchStatus::Downloaded { bytes } => format!("fetch: downloaded {}", HumanBytes(bytes)),
    }
}

fn format_verify_line(verification: &ArchiveVerification) -> String {
    let mut line = if verification.checksum_verified {
        format!("verify: sha256 {} matches pin", verification.sha256)
    } else {
        format!("verify: sha256 {} (not pinned)", verification.sha256)
    };
    if verification.signature_verified {
        line.push_str(", signature ok");
    }
    line
}

fn format_install_line(install: &InstallReport) -> String {
    let extract = match install.extract {
        ExtractStatus::Extracted => "extracted archive",
        ExtractStatus::AlreadyExtracted => "reused extracted tree",
    };
    format!(
        "install: {extract}; copied {} entries, kept {} existing; {} executables",
        HumanCount(install.copy.copied.len() as u64),
        HumanCount(install.copy.skipped.len() as u64),
        install.executables.len()
    )
}

fn format_database_line(outcome: &DatabaseOutcome) -> String {
    format!(
        "build: {} {} from {}",
        outcome.target,
        outcome.status.as_str(),
        outcome.source
    )
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn badge_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "error" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightCyan,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn progress_bar_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn render_progress_line(
    style: OutputStyle,
    label: &str,
    current: u64,
    total: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let width = 18_usize;
    let safe_total = total.max(1);
    let bounded_current = current.min(safe_total);
    let filled = ((bounded_current as usize) * width) / (safe_total as usize);
    let bar = format!(
        "{}{}",
        "=".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = (bounded_current * 100) / safe_total;
    let suffix = elapsed
        .map(|value| format!(" complete in {}", format_elapsed(value)))
        .unwrap_or_default();

    Some(format!(
        "{} [{}] {:>3}% {}/{} stages{}",
        colorize(progress_label_style(), label),
        colorize(progress_bar_style(), &bar),
        percent,
        bounded_current,
        total,
        suffix
    ))
}
