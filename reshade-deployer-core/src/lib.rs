pub mod archive;
pub mod compatibility;
pub mod context;
pub mod dll_deployer;
pub mod download;
pub mod elevation;
pub mod error;
pub mod fs_linker;
pub mod github;
pub mod ini;
pub mod ini_deployer;
pub mod jobs;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod paths;
pub mod pe;
pub mod preset_deployer;
pub mod registry;
pub mod reshade_downloader;
pub mod self_update;
pub mod settings;
pub mod shell_integration;
pub mod version;
pub mod version_check;
pub mod version_info;
pub mod vulkan;

#[cfg(test)]
mod test_support;

pub use archive::{extract_entries, find_embedded_zip, locate_payload};
pub use compatibility::{CompatibilityDatabase, CompatibilityEntry};
pub use context::{ExecutableContext, GraphicsApi};
pub use dll_deployer::DllDeployer;
pub use download::DownloadService;
pub use elevation::{is_elevated, relaunch_elevated};
pub use error::{ArchiveError, DeployerError, TransferError};
pub use fs_linker::{OsSymlinks, SymlinkService};
pub use github::{fetch_latest_release, GitHubAsset, GitHubRelease};
pub use jobs::{JobEvent, JobHandle, JobProgress, JobRunner, ProgressSender};
pub use logging::init_logging;
pub use notify::{Choice, LogNotifier, Notifier, Tone};
pub use orchestrator::{DeployOutcome, DeploymentOrchestrator};
pub use paths::AppPaths;
pub use pe::{inspect, BinaryInfo};
pub use preset_deployer::PresetOutcome;
pub use registry::{InMemoryRegistry, RegistryHive, RegistryService, SystemRegistry};
pub use reshade_downloader::{create_directories, fetch_and_install, local_version, FetchOutcome};
pub use self_update::{clean_up_old_version, update_self};
pub use settings::SettingsStore;
pub use shell_integration::{is_context_menu_registered, register_context_menu, uninstall, unregister_context_menu};
pub use vulkan::VulkanDeployer;
