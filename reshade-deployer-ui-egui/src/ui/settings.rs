use eframe::egui;
use reshade_deployer_core::{is_elevated, register_context_menu, relaunch_elevated, uninstall, unregister_context_menu, Tone};

use crate::app::ErrorReport;

pub fn render_settings_tab(app: &mut crate::app::DeployerApp, ui: &mut egui::Ui) {
	ui.heading("Settings");
	ui.separator();

	let mut always_exit = app.settings.always_exit_on_deploy();
	if ui.checkbox(&mut always_exit, "Exit after deploying").changed() { app.settings.set_always_exit_on_deploy(always_exit); }

	let mut registered = app.context_menu_registered;
	if ui.checkbox(&mut registered, "Add \"Deploy ReShade\" to the .exe right-click menu").changed() {
		let result = if registered { register_context_menu(app.registry.as_ref(), &app.current_exe) } else { unregister_context_menu(app.registry.as_ref()) };
		match result {
			Ok(()) => app.context_menu_registered = registered,
			Err(e) => app.show_error_modal = Some(ErrorReport { message: "Could not change the right-click menu. Try running the deployer as administrator.".into(), details: e.to_string() }),
		}
	}

	ui.add_space(8.0);
	ui.separator();
	ui.horizontal(|ui| {
		if ui.add_enabled(!app.is_running, egui::Button::new("Update ReShade Deployer")).clicked() {
			app.start_self_update();
		}
		if ui.add_enabled(!app.is_running, egui::Button::new("Uninstall")).clicked() {
			let choice = app.notifier.ask(
				"This removes the right-click menu entry and the system-wide Vulkan install. Files deployed into game folders are left alone.",
				"Uninstall",
				"Uninstall",
				"Cancel",
				Tone::Danger,
			);
			if choice.is_primary() {
				match uninstall(app.registry.as_ref(), app.orchestrator.dll_deployer().vulkan()) {
					Ok(()) => { app.context_menu_registered = false; app.add_toast("Uninstalled", egui::Color32::LIGHT_GREEN); }
					Err(e) => app.show_error_modal = Some(ErrorReport { message: "Uninstalling failed. Try running the deployer as administrator.".into(), details: e.to_string() }),
				}
			}
		}
	});

	if !is_elevated() {
		ui.add_space(8.0);
		ui.colored_label(egui::Color32::YELLOW, "Not elevated: creating links and registry entries may fail.");
		if ui.button("Relaunch as Administrator").clicked() {
			let args = reshade_deployer_core::elevation::forwarded_arguments(app.target_arg.as_deref());
			match relaunch_elevated(&app.current_exe, &args) {
				Ok(()) => ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close),
				Err(e) => app.append_log(&format!("Relaunch failed: {e}")),
			}
		}
	}
}
