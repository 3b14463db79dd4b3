use std::sync::atomic::{AtomicBool, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Self::Info => "HPCENV_INFO",
            Self::Warn => "HPCENV_WARN",
            Self::Error => "HPCENV_ERROR",
        }
    }
}

/// Quiet mode drops info lines; warnings and errors always print.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

fn render(level: Level, run: &str, stage: &str, action: &str, target: &str, detail: &str) -> String {
    format!(
        "{} run={} stage={} action={} target={} detail={}",
        level.tag(),
        sanitize_value(run),
        sanitize_value(stage),
        sanitize_value(action),
        sanitize_value(target),
        sanitize_value(detail),
    )
}

pub fn emit(level: Level, run: &str, stage: &str, action: &str, target: &str, detail: &str) {
    if level == Level::Info && QUIET.load(Ordering::Relaxed) {
        return;
    }
    eprintln!("{}", render(level, run, stage, action, target, detail));
}

pub fn info(run: &str, stage: &str, action: &str, target: &str, detail: &str) {
    emit(Level::Info, run, stage, action, target, detail);
}

pub fn warn(run: &str, stage: &str, action: &str, target: &str, detail: &str) {
    emit(Level::Warn, run, stage, action, target, detail);
}

pub fn error(run: &str, stage: &str, action: &str, target: &str, detail: &str) {
    emit(Level::Error, run, stage, action, target, detail);
}
