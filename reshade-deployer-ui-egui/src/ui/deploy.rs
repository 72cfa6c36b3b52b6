use eframe::egui;
use reshade_deployer_core::GraphicsApi;

pub fn render_deploy_tab(app: &mut crate::app::DeployerApp, ui: &mut egui::Ui, ctx: &egui::Context) {
	ui.heading("Deploy ReShade");
	ui.separator();

	ui.horizontal(|ui| {
		if ui.add_enabled(!app.is_running, egui::Button::new("Select game...")).clicked() {
			if let Some(exe) = rfd::FileDialog::new().add_filter("Executable", &["exe"]).pick_file() {
				app.set_target(exe);
			}
		}
		match &app.target {
			Some(target) => { ui.label(format!("{} ({})", target.file_name, if target.is_x64 { "x64" } else { "x86" })); }
			None => { ui.weak("No game selected"); }
		}
	});
	if let Some(target) = &app.target {
		ui.small(target.directory.display().to_string());
	}
	ui.add_space(6.0);

	ui.label("Graphics API:");
	ui.horizontal(|ui| {
		for api in GraphicsApi::ALL {
			let detected = app.target.as_ref().map(|t| t.supports(api)).unwrap_or(false);
			let label = if detected { format!("{} \u{2713}", api.label()) } else { api.label().to_string() };
			ui.radio_value(&mut app.api, api, label);
		}
	});
	ui.checkbox(&mut app.addon_support, "Add-on support")
		.on_hover_text("Uses the ReShade build with full add-on support. Avoid it in online games with anti-cheat.");
	if app.api == GraphicsApi::Vulkan {
		ui.colored_label(egui::Color32::YELLOW, "Vulkan is installed system-wide for every Vulkan game.");
	}
	ui.add_space(8.0);

	ui.horizontal(|ui| {
		let can_deploy = app.target.is_some() && app.libraries_ready() && !app.is_running;
		if ui.add_enabled(can_deploy, egui::Button::new("Deploy")).clicked() {
			app.deploy(ctx);
		}
		let update_label = match app.pending_reshade_update() {
			Some(v) => format!("Update ReShade to {v}"),
			None => "Check for ReShade update".to_string(),
		};
		if ui.add_enabled(!app.is_running, egui::Button::new(update_label)).clicked() {
			app.start_reshade_download();
		}
	});

	if !app.libraries_ready() && !app.is_running {
		ui.add_space(6.0);
		ui.colored_label(egui::Color32::YELLOW, "ReShade has not been downloaded yet.");
	}
}
