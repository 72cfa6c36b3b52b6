use std::io;
use std::path::Path;

#[cfg(windows)]
mod imp {
    use super::*;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows::core::PCWSTR;
    use windows::Win32::{
        Foundation::{HANDLE, HWND},
        Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY},
        System::Threading::{GetCurrentProcess, OpenProcessToken},
        UI::Shell::ShellExecuteW,
        UI::WindowsAndMessaging::SW_SHOWNORMAL,
    };

    pub fn is_elevated() -> bool {
        unsafe {
            let mut token = HANDLE::default();
            if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
                return false;
            }
            let mut elevation = TOKEN_ELEVATION::default();
            let mut ret_len = 0u32;
            let ret_len_ptr: *mut u32 = &mut ret_len as *mut u32;
            if GetTokenInformation(
                token,
                TokenElevation,
                Some(&mut elevation as *mut _ as _),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                ret_len_ptr,
            )
            .is_err()
            {
                return false;
            }
            elevation.TokenIsElevated != 0
        }
    }

    fn wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    pub fn relaunch_elevated(exe: &Path, args: &str) -> io::Result<()> {
        let verb = wide(OsStr::new("runas"));
        let file = wide(exe.as_os_str());
        let params = wide(OsStr::new(args));
        // ShellExecute reports success with any value above 32.
        let result = unsafe {
            ShellExecuteW(
                HWND(std::ptr::null_mut()),
                PCWSTR(verb.as_ptr()),
                PCWSTR(file.as_ptr()),
                if args.is_empty() { PCWSTR(std::ptr::null()) } else { PCWSTR(params.as_ptr()) },
                PCWSTR(std::ptr::null()),
                SW_SHOWNORMAL,
            )
        };
        if result.0 as isize > 32 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::*;

    pub fn is_elevated() -> bool {
        nix::unistd::Uid::effective().is_root()
    }

    /// No UAC here; start the new binary with the caller's rights.
    pub fn relaunch_elevated(exe: &Path, args: &str) -> io::Result<()> {
        let mut cmd = std::process::Command::new(exe);
        let arg = args.trim().trim_matches('"');
        if !arg.is_empty() {
            cmd.arg(arg);
        }
        cmd.spawn().map(|_| ())
    }
}

pub use imp::{is_elevated, relaunch_elevated};

/// Command line that forwards the targeted game executable, if any, to a new instance.
pub fn forwarded_arguments(target: Option<&Path>) -> String {
    target.map(|p| format!("\"{}\"", p.display())).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_path_is_quoted_for_the_new_instance() {
        assert_eq!(forwarded_arguments(None), "");
        assert_eq!(
            forwarded_arguments(Some(Path::new("C:/Games/My Game/game.exe"))),
            "\"C:/Games/My Game/game.exe\""
        );
    }
}
