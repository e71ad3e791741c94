use windows::Win32::Foundation::{HMODULE, MAX_PATH};
use windows::Win32::System::ProcessStatus::{
    K32EnumProcessModules, K32EnumProcesses, K32GetModuleBaseNameA,
};
use windows::Win32::System::Threading::{PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};

use crate::error::{Error, OsError, Result};
use crate::handle::ProcessHandle;

/// Resolves an executable name to a process id.
///
/// Name comparison is exact but case-insensitive; when several processes
/// share the name, the first one in enumeration order wins. Processes we
/// cannot open or name are skipped silently.
pub fn find_process_id(name: &str) -> Result<u32> {
    let pids = enumerate_pids().map_err(|source| Error::ProcessEnumeration { source })?;
    for pid in pids {
        // System idle and System cannot be opened anyway.
        if pid == 0 || pid == 4 {
            continue;
        }

        let Ok(handle) = ProcessHandle::open(pid, PROCESS_QUERY_INFORMATION | PROCESS_VM_READ)
        else {
            continue;
        };

        if let Some(base_name) = module_base_name(&handle) {
            if base_name.eq_ignore_ascii_case(name) {
                return Ok(pid);
            }
        }
    }

    Err(Error::ProcessNotFound(name.to_owned()))
}

/// Base name of the process's first module (its executable).
fn module_base_name(handle: &ProcessHandle) -> Option<String> {
    unsafe {
        let mut module = HMODULE::default();
        let mut bytes_needed = 0;
        // API wants an array, but the first module is the executable and the
        // only one we need.
        if !K32EnumProcessModules(
            handle.raw(),
            &mut module,
            size_of::<HMODULE>() as u32,
            &mut bytes_needed,
        )
        .as_bool()
        {
            return None;
        }

        let mut buffer = vec![0u8; MAX_PATH as usize];
        let chars_written = K32GetModuleBaseNameA(handle.raw(), module, &mut buffer);
        if chars_written == 0 {
            return None;
        }

        buffer.truncate(chars_written as usize);
        String::from_utf8(buffer).ok()
    }
}

fn enumerate_pids() -> std::result::Result<Vec<u32>, OsError> {
    let mut pids = Vec::with_capacity(1024);
    let mut bytes_returned = 0;
    loop {
        let current_size = if pids.is_empty() {
            1024
        } else {
            pids.len() * 2
        };
        pids.resize(current_size, 0);

        unsafe {
            if !K32EnumProcesses(
                pids.as_mut_ptr(),
                (pids.len() * size_of::<u32>()) as u32,
                &mut bytes_returned,
            )
            .as_bool()
            {
                return Err(OsError::last());
            }
        }

        // got all processes
        if bytes_returned < (pids.len() * size_of::<u32>()) as u32 {
            let count = bytes_returned as usize / size_of::<u32>();
            pids.truncate(count);
            break;
        }

        // else buffer was full - need larger buffer for next iteration
    }

    Ok(pids)
}
