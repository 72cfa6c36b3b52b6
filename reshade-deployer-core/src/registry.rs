use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegistryHive {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    Dword(u32),
    String(String),
}

/// The handful of registry operations the deployer needs. An empty value name addresses
/// the key's default value. Deleting something that does not exist succeeds.
pub trait RegistryService: Send + Sync {
    fn set_dword(&self, hive: RegistryHive, key: &str, name: &str, value: u32) -> io::Result<()>;
    fn set_string(&self, hive: RegistryHive, key: &str, name: &str, value: &str) -> io::Result<()>;
    fn delete_value(&self, hive: RegistryHive, key: &str, name: &str) -> io::Result<()>;
    fn delete_key_tree(&self, hive: RegistryHive, key: &str) -> io::Result<()>;
    fn key_exists(&self, hive: RegistryHive, key: &str) -> bool;
}

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use winreg::enums::{HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_SET_VALUE};
    use winreg::RegKey;

    /// Registry access through `winreg`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WindowsRegistry;

    fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn root(hive: RegistryHive) -> RegKey {
        RegKey::predef(match hive {
            RegistryHive::ClassesRoot => HKEY_CLASSES_ROOT,
            RegistryHive::CurrentUser => HKEY_CURRENT_USER,
            RegistryHive::LocalMachine => HKEY_LOCAL_MACHINE,
        })
    }

    impl RegistryService for WindowsRegistry {
        fn set_dword(&self, hive: RegistryHive, key: &str, name: &str, value: u32) -> io::Result<()> {
            let (k, _) = root(hive).create_subkey(key)?;
            k.set_value(name, &value)
        }

        fn set_string(&self, hive: RegistryHive, key: &str, name: &str, value: &str) -> io::Result<()> {
            let (k, _) = root(hive).create_subkey(key)?;
            k.set_value(name, &value.to_string())
        }

        fn delete_value(&self, hive: RegistryHive, key: &str, name: &str) -> io::Result<()> {
            let k = match root(hive).open_subkey_with_flags(key, KEY_SET_VALUE) {
                Ok(k) => k,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e),
            };
            ignore_missing(k.delete_value(name))
        }

        fn delete_key_tree(&self, hive: RegistryHive, key: &str) -> io::Result<()> {
            ignore_missing(root(hive).delete_subkey_all(key))
        }

        fn key_exists(&self, hive: RegistryHive, key: &str) -> bool {
            root(hive).open_subkey_with_flags(key, KEY_READ).is_ok()
        }
    }
}

#[cfg(windows)]
pub use windows_impl::WindowsRegistry;

/// Stand-in for hosts without a registry: writes fail, deletes and lookups find nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedRegistry;

impl RegistryService for UnsupportedRegistry {
    fn set_dword(&self, _hive: RegistryHive, key: &str, _name: &str, _value: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, format!("no registry available to write {key}")))
    }

    fn set_string(&self, _hive: RegistryHive, key: &str, _name: &str, _value: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, format!("no registry available to write {key}")))
    }

    fn delete_value(&self, _hive: RegistryHive, _key: &str, _name: &str) -> io::Result<()> {
        Ok(())
    }

    fn delete_key_tree(&self, _hive: RegistryHive, _key: &str) -> io::Result<()> {
        Ok(())
    }

    fn key_exists(&self, _hive: RegistryHive, _key: &str) -> bool {
        false
    }
}

#[cfg(windows)]
pub type SystemRegistry = WindowsRegistry;
#[cfg(not(windows))]
pub type SystemRegistry = UnsupportedRegistry;

type KeyId = (RegistryHive, String);

/// Registry kept in memory. Key paths are matched case-insensitively like the real one.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    keys: Mutex<BTreeMap<KeyId, BTreeMap<String, RegistryValue>>>,
}

fn normalize(key: &str) -> String {
    key.trim_matches('\\').to_ascii_lowercase()
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, hive: RegistryHive, key: &str, name: &str) -> Option<RegistryValue> {
        let keys = self.keys.lock().ok()?;
        keys.get(&(hive, normalize(key)))?.get(name).cloned()
    }

    /// Copy of every key and value, for comparing states.
    pub fn snapshot(&self) -> BTreeMap<KeyId, BTreeMap<String, RegistryValue>> {
        self.keys.lock().map(|k| k.clone()).unwrap_or_default()
    }

    /// Number of values across all keys.
    pub fn value_count(&self) -> usize {
        self.keys.lock().map(|k| k.values().map(BTreeMap::len).sum()).unwrap_or(0)
    }

    fn set(&self, hive: RegistryHive, key: &str, name: &str, value: RegistryValue) -> io::Result<()> {
        let mut keys = self.keys.lock().map_err(|_| io::Error::other("registry lock poisoned"))?;
        keys.entry((hive, normalize(key))).or_default().insert(name.to_string(), value);
        Ok(())
    }
}

impl RegistryService for InMemoryRegistry {
    fn set_dword(&self, hive: RegistryHive, key: &str, name: &str, value: u32) -> io::Result<()> {
        self.set(hive, key, name, RegistryValue::Dword(value))
    }

    fn set_string(&self, hive: RegistryHive, key: &str, name: &str, value: &str) -> io::Result<()> {
        self.set(hive, key, name, RegistryValue::String(value.to_string()))
    }

    fn delete_value(&self, hive: RegistryHive, key: &str, name: &str) -> io::Result<()> {
        let mut keys = self.keys.lock().map_err(|_| io::Error::other("registry lock poisoned"))?;
        if let Some(values) = keys.get_mut(&(hive, normalize(key))) {
            values.remove(name);
        }
        Ok(())
    }

    fn delete_key_tree(&self, hive: RegistryHive, key: &str) -> io::Result<()> {
        let mut keys = self.keys.lock().map_err(|_| io::Error::other("registry lock poisoned"))?;
        let key = normalize(key);
        let prefix = format!("{key}\\");
        keys.retain(|(h, k), _| !(*h == hive && (*k == key || k.starts_with(&prefix))));
        Ok(())
    }

    fn key_exists(&self, hive: RegistryHive, key: &str) -> bool {
        let key = normalize(key);
        let prefix = format!("{key}\\");
        self.keys
            .lock()
            .map(|keys| keys.keys().any(|(h, k)| *h == hive && (*k == key || k.starts_with(&prefix))))
            .unwrap_or(false)
    }
}
