/// How a prompt should be styled by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Caution,
    Danger,
}

/// Which button the user picked. Closing the dialog is reported as `Dismissed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Primary,
    Secondary,
    Dismissed,
}

impl Choice {
    pub fn is_primary(self) -> bool {
        self == Choice::Primary
    }
}

/// User-facing messages and confirmations. Core logic never talks to a UI toolkit directly.
pub trait Notifier: Send + Sync {
    fn inform(&self, message: &str, title: &str);

    fn ask(&self, message: &str, title: &str, primary: &str, secondary: &str, tone: Tone) -> Choice;
}

/// Logs every message and accepts every prompt. Used for unattended runs.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn inform(&self, message: &str, title: &str) {
        tracing::info!("{title}: {message}");
    }

    fn ask(&self, message: &str, title: &str, primary: &str, _secondary: &str, _tone: Tone) -> Choice {
        tracing::info!("{title}: {message} -> {primary}");
        Choice::Primary
    }
}
