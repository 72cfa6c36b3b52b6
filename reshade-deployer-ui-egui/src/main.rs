#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

mod app;
mod notifier;
mod ui;

use reshade_deployer_core::{clean_up_old_version, init_logging, AppPaths};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let paths = AppPaths::from_current_exe()?;
	init_logging(&paths.logs);
	// Set by the right-click menu action: the game to pre-select.
	let target = std::env::args_os().nth(1).map(PathBuf::from);
	let current_exe = std::env::current_exe()?;
	clean_up_old_version(&paths, &current_exe).await;
	tracing::info!("ReShade Deployer {} starting in {}", app::APP_VERSION, paths.root.display());

	let runtime = tokio::runtime::Handle::current();
	let native_options = eframe::NativeOptions {
		viewport: egui::ViewportBuilder::default().with_inner_size([480.0, 340.0]),
		..Default::default()
	};
	eframe::run_native(
		"ReShade Deployer",
		native_options,
		Box::new(move |_cc| Ok(Box::new(app::DeployerApp::new(paths, current_exe, target, runtime)))),
	)
	.map_err(|e| anyhow::anyhow!("failed to start the window: {e}"))?;
	Ok(())
}
