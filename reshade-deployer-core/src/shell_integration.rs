use std::io;
use std::path::Path;
use tracing::info;

use crate::registry::{RegistryHive, RegistryService};
use crate::vulkan::VulkanDeployer;

pub const CONTEXT_MENU_ACTION: &str = "Deploy ReShade";
/// The `Z` keeps the entry at the bottom of the verb list.
pub const CONTEXT_MENU_KEY: &str = r"exefile\shell\ZDeployReShade";

fn command_key() -> String {
    format!(r"{CONTEXT_MENU_KEY}\command")
}

/// Add "Deploy ReShade" to the right-click menu of `.exe` files, launching `app_exe`
/// with the clicked file.
pub fn register_context_menu(registry: &dyn RegistryService, app_exe: &Path) -> io::Result<()> {
    let exe = app_exe.display();
    registry.set_string(RegistryHive::ClassesRoot, CONTEXT_MENU_KEY, "", CONTEXT_MENU_ACTION)?;
    registry.set_string(RegistryHive::ClassesRoot, CONTEXT_MENU_KEY, "Icon", &format!("{exe},0"))?;
    registry.set_string(RegistryHive::ClassesRoot, &command_key(), "", &format!("\"{exe}\" \"%1\""))?;
    info!("Registered context menu action for {exe}");
    Ok(())
}

pub fn unregister_context_menu(registry: &dyn RegistryService) -> io::Result<()> {
    registry.delete_key_tree(RegistryHive::ClassesRoot, CONTEXT_MENU_KEY)?;
    info!("Removed context menu action");
    Ok(())
}

pub fn is_context_menu_registered(registry: &dyn RegistryService) -> bool {
    registry.key_exists(RegistryHive::ClassesRoot, CONTEXT_MENU_KEY)
}

/// Undo everything the deployer changed outside its own folder.
pub fn uninstall(registry: &dyn RegistryService, vulkan: &VulkanDeployer) -> io::Result<()> {
    unregister_context_menu(registry)?;
    vulkan.remove_globally()
}
