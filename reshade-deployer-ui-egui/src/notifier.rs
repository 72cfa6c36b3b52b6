use reshade_deployer_core::{Choice, Notifier, Tone};
use rfd::{MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};

/// Native message boxes. Blocks the calling thread until the user answers.
pub struct RfdNotifier;

fn level(tone: Tone) -> MessageLevel {
	match tone {
		Tone::Info => MessageLevel::Info,
		Tone::Caution => MessageLevel::Warning,
		Tone::Danger => MessageLevel::Error,
	}
}

impl Notifier for RfdNotifier {
	fn inform(&self, message: &str, title: &str) {
		tracing::info!("{title}: {message}");
		let _ = MessageDialog::new()
			.set_title(title)
			.set_description(message)
			.set_level(MessageLevel::Info)
			.set_buttons(MessageButtons::Ok)
			.show();
	}

	fn ask(&self, message: &str, title: &str, primary: &str, secondary: &str, tone: Tone) -> Choice {
		let result = MessageDialog::new()
			.set_title(title)
			.set_description(message)
			.set_level(level(tone))
			.set_buttons(MessageButtons::OkCancelCustom(primary.to_string(), secondary.to_string()))
			.show();
		let choice = match result {
			MessageDialogResult::Ok | MessageDialogResult::Yes => Choice::Primary,
			MessageDialogResult::Custom(label) if label == primary => Choice::Primary,
			MessageDialogResult::Custom(label) if label == secondary => Choice::Secondary,
			MessageDialogResult::Cancel | MessageDialogResult::No => Choice::Secondary,
			_ => Choice::Dismissed,
		};
		tracing::info!("{title}: {message} -> {choice:?}");
		choice
	}
}
