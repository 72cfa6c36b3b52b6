use eframe::egui;

pub fn render_about_tab(app: &mut crate::app::DeployerApp, ui: &mut egui::Ui) {
	ui.heading("About");
	ui.separator();
	ui.label("Deploys ReShade into game folders with symbolic links, so every game shares one up-to-date copy.");
	ui.separator();
	let git = option_env!("GIT_COMMIT_HASH").unwrap_or("unknown");
	ui.label(format!("Deployer version: {} ({git})", crate::app::APP_VERSION));
	ui.label(format!("ReShade version: {}", app.local_version.as_deref().unwrap_or("(not downloaded)")));
	if let Some(date) = app.settings.latest_reshade_check_date() {
		ui.label(format!("Last checked for ReShade updates: {}", date.format("%d/%m/%Y")));
	}

	let Some(target) = &app.target else { return };
	ui.separator();
	let report = target.to_string();
	ui.horizontal(|ui| {
		ui.label("Executable info");
		if ui.small_button("Copy").clicked() { ui.output_mut(|o| o.copied_text = report.clone()); }
	});
	egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| { ui.monospace(&report); });
}
