use eframe::{egui, App};
use reshade_deployer_core::{
	create_directories, fetch_and_install, is_context_menu_registered, local_version, update_self,
	version_check::{check_deployer_update, latest_reshade_version, record_reshade_install},
	AppPaths, Choice, DeployOutcome, DeployerError, DeploymentOrchestrator, DllDeployer, DownloadService,
	ExecutableContext, FetchOutcome, GraphicsApi, JobEvent, JobHandle, JobProgress, JobRunner, Notifier,
	OsSymlinks, RegistryService, SettingsStore, SystemRegistry, Tone, VulkanDeployer,
};
use std::path::PathBuf;
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;

use crate::notifier::RfdNotifier;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Tab { Deploy, Settings, Logs, About }

pub struct Toast { pub msg: String, pub color: egui::Color32, pub until: std::time::Instant }

pub struct ErrorReport { pub message: String, pub details: String }

impl From<&DeployerError> for ErrorReport {
	fn from(e: &DeployerError) -> Self { Self { message: e.user_message(), details: e.details() } }
}

/// What a background job hands back to the UI thread.
pub enum JobResult {
	ReShade(Result<FetchOutcome, DeployerError>),
	SelfUpdate(Result<(), DeployerError>),
	LatestReShade(Option<String>),
	DeployerUpdate(Option<String>),
}

pub struct DeployerApp {
	pub paths: AppPaths,
	pub current_exe: PathBuf,
	pub settings: SettingsStore,
	pub registry: Arc<dyn RegistryService>,
	pub notifier: Arc<dyn Notifier>,
	pub orchestrator: DeploymentOrchestrator,
	pub runner: JobRunner,
	pub service: DownloadService,
	pub target_arg: Option<PathBuf>,
	pub target: Option<ExecutableContext>,
	pub api: GraphicsApi,
	pub addon_support: bool,
	pub selected: Tab,
	pub log: String,
	pub jobs: Vec<JobHandle<JobResult>>,
	pub is_running: bool,
	pub progress: u8,
	pub status: String,
	pub local_version: Option<String>,
	pub latest_version: Option<String>,
	pub context_menu_registered: bool,
	pub startup_done: bool,
	pub show_error_modal: Option<ErrorReport>,
	pub toasts: Vec<Toast>,
}

impl DeployerApp {
	pub fn new(paths: AppPaths, current_exe: PathBuf, target_arg: Option<PathBuf>, runtime: tokio::runtime::Handle) -> Self {
		let settings = SettingsStore::load(&paths.config_ini);
		let registry: Arc<dyn RegistryService> = Arc::new(SystemRegistry::default());
		let notifier: Arc<dyn Notifier> = Arc::new(RfdNotifier);
		let symlinks = Arc::new(OsSymlinks);
		let vulkan = VulkanDeployer::new(&paths.common_local, &paths.local_app_data, symlinks.clone(), registry.clone());
		let dll = DllDeployer::new(paths.clone(), symlinks, vulkan);
		let orchestrator = DeploymentOrchestrator::new(paths.clone(), dll, settings.clone(), notifier.clone());
		let mut app = Self {
			local_version: local_version(&paths),
			context_menu_registered: is_context_menu_registered(registry.as_ref()),
			paths,
			current_exe,
			settings,
			registry,
			notifier,
			orchestrator,
			runner: JobRunner::new(runtime),
			service: DownloadService::new(),
			target_arg: None,
			target: None,
			api: GraphicsApi::DXGI,
			addon_support: false,
			selected: Tab::Deploy,
			log: String::new(),
			jobs: Vec::new(),
			is_running: false,
			progress: 0,
			status: String::new(),
			latest_version: None,
			startup_done: false,
			show_error_modal: None,
			toasts: Vec::new(),
		};
		if let Some(exe) = target_arg { app.set_target(exe); }
		app
	}

	pub fn append_log(&mut self, msg: &str) { if !self.log.is_empty() { self.log.push('\n'); } self.log.push_str(msg); }
	pub fn add_toast(&mut self, msg: &str, color: egui::Color32) { self.toasts.push(Toast { msg: msg.to_string(), color, until: std::time::Instant::now() + std::time::Duration::from_secs(4) }); }
	fn draw_toasts(&mut self, ctx: &egui::Context) {
		let now = std::time::Instant::now();
		self.toasts.retain(|t| t.until > now);
		let mut y = 12.0;
		for (i, t) in self.toasts.iter().enumerate() {
			egui::Area::new(egui::Id::new(format!("toast-{i}"))).fixed_pos(egui::pos2(180.0, y)).show(ctx, |ui| { ui.colored_label(t.color, &t.msg); });
			y += 22.0;
		}
	}

	pub fn report_error(&mut self, e: &DeployerError) {
		tracing::error!("{}", e.details());
		self.append_log(&e.details());
		self.show_error_modal = Some(e.into());
	}

	pub fn set_target(&mut self, exe: PathBuf) {
		let ctx = self.orchestrator.resolve(&exe);
		self.append_log(&format!("Selected {}", exe.display()));
		if let Some(api) = ctx.preferred_api() { self.api = api; }
		self.target_arg = Some(exe);
		self.target = Some(ctx);
	}

	pub fn libraries_ready(&self) -> bool { self.local_version.is_some() }

	/// Ask on first launch, then either download ReShade or quit.
	fn run_startup(&mut self, ctx: &egui::Context) {
		self.startup_done = true;
		if !self.libraries_ready() {
			let choice = self.notifier.ask(
				"ReShade Deployer will now download the latest version of ReShade from reshade.me into its lib folder.",
				"First time setup",
				"Continue",
				"Exit",
				Tone::Info,
			);
			if choice != Choice::Primary { ctx.send_viewport_cmd(egui::ViewportCommand::Close); return; }
			if let Err(e) = create_directories(&self.paths) {
				tracing::error!("failed to create folders in {}: {e}", self.paths.root.display());
				self.show_error_modal = Some(ErrorReport { message: format!("Could not create the deployer's folders in \"{}\".", self.paths.root.display()), details: e.to_string() });
				return;
			}
			self.start_reshade_download();
			return;
		}
		let settings = self.settings.clone();
		let service = self.service.clone();
		self.jobs.push(self.runner.spawn(move |_| async move { JobResult::LatestReShade(latest_reshade_version(&settings, &service).await) }));
		let settings = self.settings.clone();
		let service = self.service.clone();
		self.jobs.push(self.runner.spawn(move |_| async move { JobResult::DeployerUpdate(check_deployer_update(&settings, &service, APP_VERSION).await) }));
	}

	pub fn start_reshade_download(&mut self) {
		if self.is_running { return; }
		self.is_running = true;
		self.progress = 0;
		let paths = self.paths.clone();
		let service = self.service.clone();
		self.jobs.push(self.runner.spawn(move |progress| async move {
			JobResult::ReShade(fetch_and_install(&paths, &service, progress.callback()).await)
		}));
	}

	pub fn start_self_update(&mut self) {
		if self.is_running { return; }
		self.is_running = true;
		self.progress = 0;
		let paths = self.paths.clone();
		let service = self.service.clone();
		let exe = self.current_exe.clone();
		let target = self.target_arg.clone();
		self.jobs.push(self.runner.spawn(move |progress| async move {
			JobResult::SelfUpdate(update_self(&paths, &service, &exe, target.as_deref(), progress.callback()).await)
		}));
	}

	pub fn deploy(&mut self, ctx: &egui::Context) {
		let Some(target) = self.target.clone() else { return };
		match self.orchestrator.deploy(&target, self.api, self.addon_support) {
			Ok(DeployOutcome::Cancelled) => self.append_log("Deployment cancelled"),
			Ok(DeployOutcome::Deployed { exit_after, .. }) => {
				self.append_log(&format!("Deployed {} to {}", self.api, target.directory.display()));
				if exit_after { ctx.send_viewport_cmd(egui::ViewportCommand::Close); return; }
				let choice = self.notifier.ask(
					&format!("ReShade was deployed to {}.", target.file_name),
					"Deployment complete",
					"Continue",
					"Exit",
					Tone::Info,
				);
				if choice == Choice::Secondary { ctx.send_viewport_cmd(egui::ViewportCommand::Close); }
			}
			Err(e) => self.report_error(&e),
		}
	}

	fn poll_jobs(&mut self, ctx: &egui::Context) {
		let mut events = Vec::new();
		self.jobs.retain(|job| loop {
			match job.rx.try_recv() {
				Ok(ev) => events.push(ev),
				Err(TryRecvError::Empty) => break true,
				Err(TryRecvError::Disconnected) => break false,
			}
		});
		for ev in events {
			match ev {
				JobEvent::Progress(JobProgress { message, percent }) => { self.progress = percent; self.status = message; }
				JobEvent::Finished(result) => self.on_job_finished(result, ctx),
				JobEvent::Failed(reason) => {
					self.is_running = false;
					self.progress = 0;
					self.status = String::new();
					self.show_error_modal = Some(ErrorReport { message: "A background task stopped unexpectedly.".into(), details: reason });
				}
			}
		}
		if !self.jobs.is_empty() { ctx.request_repaint_after(std::time::Duration::from_millis(100)); }
	}

	fn on_job_finished(&mut self, result: JobResult, ctx: &egui::Context) {
		match result {
			JobResult::ReShade(outcome) => {
				self.is_running = false;
				self.local_version = local_version(&self.paths);
				match outcome {
					Ok(FetchOutcome::AlreadyUpToDate { version }) => self.add_toast(&format!("ReShade {version} is already up to date"), egui::Color32::LIGHT_GREEN),
					Ok(FetchOutcome::Installed { version }) => {
						if let Some(v) = version.or_else(|| self.local_version.clone()) { record_reshade_install(&self.settings, &v); self.latest_version = Some(v); }
						self.add_toast("ReShade downloaded", egui::Color32::LIGHT_GREEN);
					}
					Err(e) => self.report_error(&e),
				}
				self.status.clear();
			}
			JobResult::SelfUpdate(outcome) => {
				self.is_running = false;
				match outcome {
					Ok(()) => { let _ = self.settings.flush(); ctx.send_viewport_cmd(egui::ViewportCommand::Close); }
					Err(e) => self.report_error(&e),
				}
			}
			JobResult::LatestReShade(version) => self.latest_version = version,
			JobResult::DeployerUpdate(Some(version)) => {
				let choice = self.notifier.ask(
					&format!("ReShade Deployer {version} is available (you have {APP_VERSION}). Update now?"),
					"Update available",
					"Update",
					"Later",
					Tone::Info,
				);
				if choice.is_primary() { self.start_self_update(); }
			}
			JobResult::DeployerUpdate(None) => {}
		}
	}

	/// Latest online version, when it differs from the cached one.
	pub fn pending_reshade_update(&self) -> Option<&str> {
		match (&self.latest_version, &self.local_version) {
			(Some(latest), Some(local)) if latest != local => Some(latest),
			_ => None,
		}
	}

	fn render_error_modal(&mut self, ctx: &egui::Context) {
		let Some(report) = &self.show_error_modal else { return };
		let (message, details) = (report.message.clone(), report.details.clone());
		egui::Window::new("Error").collapsible(false).resizable(true).show(ctx, |ui| {
			ui.colored_label(egui::Color32::RED, &message);
			egui::CollapsingHeader::new("Details").show(ui, |ui| { ui.monospace(&details); });
			ui.horizontal(|ui| {
				if ui.button("Copy details").clicked() { ui.output_mut(|o| o.copied_text = details.clone()); self.add_toast("Copied error", egui::Color32::LIGHT_GREEN); }
				if ui.button("Close").clicked() { self.show_error_modal = None; }
			});
		});
	}
}

impl App for DeployerApp {
	fn update(&mut self, ctx: &egui::Context, _: &mut eframe::Frame) {
		if !self.startup_done { self.run_startup(ctx); }
		self.poll_jobs(ctx);

		egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
			ui.horizontal(|ui| {
				ui.selectable_value(&mut self.selected, Tab::Deploy, "Deploy");
				ui.selectable_value(&mut self.selected, Tab::Settings, "Settings");
				ui.selectable_value(&mut self.selected, Tab::Logs, "Logs");
				ui.selectable_value(&mut self.selected, Tab::About, "About");
			});
		});

		if self.is_running {
			egui::TopBottomPanel::bottom("progress").show(ctx, |ui| {
				let bar = egui::ProgressBar::new(self.progress as f32 / 100.0).text(if self.status.is_empty() { format!("{}%", self.progress) } else { self.status.clone() });
				ui.add(bar);
			});
		}

		egui::CentralPanel::default().show(ctx, |ui| {
			match self.selected {
				Tab::Deploy => { crate::ui::deploy::render_deploy_tab(self, ui, ctx); }
				Tab::Settings => { crate::ui::settings::render_settings_tab(self, ui); }
				Tab::Logs => { crate::ui::logs::render_logs_tab(self, ui); }
				Tab::About => { crate::ui::about::render_about_tab(self, ui); }
			}
		});
		self.render_error_modal(ctx);
		self.draw_toasts(ctx);
	}
}
