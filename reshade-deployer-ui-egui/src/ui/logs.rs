use eframe::egui;

pub fn render_logs_tab(app: &mut crate::app::DeployerApp, ui: &mut egui::Ui) {
	ui.heading("Logs");
	ui.separator();

	ui.horizontal(|ui| {
		if ui.small_button("Copy").clicked() { ui.output_mut(|o| o.copied_text = app.log.clone()); }
		if ui.small_button("Clear").clicked() { app.log.clear(); }
		ui.weak(format!("Full log: {}", app.paths.logs.display()));
	});
	ui.separator();

	let available_height = ui.available_height();
	egui::ScrollArea::vertical()
		.stick_to_bottom(true)
		.auto_shrink([false, false])
		.max_height(available_height)
		.show(ui, |ui| {
			if app.log.is_empty() { ui.weak("Nothing yet."); } else { ui.monospace(&app.log); }
		});
}
