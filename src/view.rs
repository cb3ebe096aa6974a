use crate::machine::{AlertLevel, Effect};
use crate::types::ProgressSnapshot;

/// Receives the UI effects of every state transition.
///
/// The controller never renders anything itself; a terminal, a GUI or a test
/// recorder can subscribe by implementing this trait.
pub trait View {
    fn apply(&mut self, effect: &Effect);
}

/// Snapshot of what a progress panel would show, kept up to date from effects.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PanelState {
    pub visible: bool,
    pub target: String,
    pub status: String,
    pub progress: ProgressSnapshot,
    pub stop_visible: bool,
    pub view_results_visible: bool,
    pub alerts: Vec<(AlertLevel, String)>,
    pub navigated_to: Option<String>,
}

impl View for PanelState {
    fn apply(&mut self, effect: &Effect) {
        match effect {
            Effect::ShowProgress { target } => {
                self.visible = true;
                self.target = target.clone();
                self.status.clear();
                self.progress = ProgressSnapshot::default();
                self.stop_visible = true;
                self.view_results_visible = false;
            }
            Effect::HideProgress => self.visible = false,
            Effect::UpdateProgress(p) => self.progress = p.clone(),
            Effect::SetStatus(s) => self.status = s.clone(),
            Effect::ShowViewResults => {
                self.stop_visible = false;
                self.view_results_visible = true;
            }
            Effect::Alert { level, message } => self.alerts.push((*level, message.clone())),
            Effect::Navigate(path) => self.navigated_to = Some(path.clone()),
            _ => {}
        }
    }
}

/// Prints progress lines and alerts to the terminal.
#[derive(Debug, Clone, Default)]
pub struct TerminalView {
    base_url: String,
    target: String,
    last_line: Option<String>,
}

impl TerminalView {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl View for TerminalView {
    fn apply(&mut self, effect: &Effect) {
        match effect {
            Effect::ShowProgress { target } => {
                self.target = target.clone();
                self.last_line = None;
                println!("Target: {target}");
            }
            Effect::UpdateProgress(p) => {
                let line = progress_line(p);
                // identical snapshots would only repeat the same line
                if self.last_line.as_deref() != Some(line.as_str()) {
                    println!("  {line}");
                    self.last_line = Some(line);
                }
            }
            Effect::SetStatus(s) => println!("  [{}] {s}", self.target),
            Effect::ShowViewResults => println!("  Results are ready."),
            Effect::Alert { level, message } => {
                let line = format!("{} {message}", alert_icon(*level));
                match level {
                    AlertLevel::Danger | AlertLevel::Warning => eprintln!("{line}"),
                    AlertLevel::Info | AlertLevel::Success => println!("{line}"),
                }
            }
            Effect::Navigate(path) => println!("Results: {}{path}", self.base_url),
            _ => {}
        }
    }
}

/// `scanned/total | open N | P%` for one snapshot.
pub fn progress_line(p: &ProgressSnapshot) -> String {
    format!(
        "{}/{} scanned | {} open | {}%",
        p.scanned,
        p.total,
        p.open_count,
        p.rounded_percentage()
    )
}

pub fn alert_icon(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Success => "[ok]",
        AlertLevel::Info => "[i]",
        AlertLevel::Warning => "[!]",
        AlertLevel::Danger => "[x]",
    }
}
