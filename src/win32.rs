#![allow(non_snake_case, non_camel_case_types)]

use std::ffi::OsStr;
use std::fs::File;
use std::io::{Error, Result};
use std::iter;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, RawHandle};
use std::ptr;
use std::time::Duration;

use winapi::shared::minwindef::{BOOL, DWORD, FALSE, LPVOID, TRUE};
use winapi::shared::winerror::{ERROR_ENVVAR_NOT_FOUND, WAIT_TIMEOUT};
use winapi::um::errhandlingapi::SetLastError;
use winapi::um::handleapi::{CloseHandle, DuplicateHandle};
use winapi::um::minwinbase::SECURITY_ATTRIBUTES;
use winapi::um::namedpipeapi;
use winapi::um::processenv;
use winapi::um::processthreadsapi::{
    self, GetCurrentProcess, PROCESS_INFORMATION, STARTUPINFOW,
};
use winapi::um::synchapi;
use winapi::um::winbase::{INFINITE, WAIT_FAILED, WAIT_OBJECT_0};
use winapi::um::winnt::{DUPLICATE_SAME_ACCESS, HANDLE};

pub use winapi::shared::winerror::{ERROR_BAD_PATHNAME, ERROR_BROKEN_PIPE};
pub use winapi::um::winbase::{CREATE_NO_WINDOW, CREATE_UNICODE_ENVIRONMENT, STARTF_USESTDHANDLES};

/// An owned kernel object handle, closed on drop.
#[derive(Debug)]
pub struct Handle(RawHandle);

// Kernel handles may be used from any thread.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0 as HANDLE);
        }
    }
}

impl AsRawHandle for Handle {
    fn as_raw_handle(&self) -> RawHandle {
        self.0
    }
}

impl FromRawHandle for Handle {
    unsafe fn from_raw_handle(handle: RawHandle) -> Handle {
        Handle(handle)
    }
}

fn check(status: BOOL) -> Result<()> {
    if status != 0 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

// OsStr to zero-terminated owned vector
pub fn to_nullterm(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(iter::once(0u16)).collect()
}

/// Create an anonymous pipe whose ends are not inheritable.
pub fn CreatePipe() -> Result<(File, File)> {
    let mut attributes = SECURITY_ATTRIBUTES {
        nLength: mem::size_of::<SECURITY_ATTRIBUTES>() as DWORD,
        lpSecurityDescriptor: ptr::null_mut(),
        bInheritHandle: FALSE,
    };
    let (mut r, mut w): (HANDLE, HANDLE) = (ptr::null_mut(), ptr::null_mut());
    check(unsafe { namedpipeapi::CreatePipe(&mut r, &mut w, &mut attributes, 0) })?;
    Ok(unsafe {
        (
            File::from_raw_handle(r as RawHandle),
            File::from_raw_handle(w as RawHandle),
        )
    })
}

/// Duplicate `file` into a new, inheritable handle.
pub fn DuplicateInheritable(file: &File) -> Result<File> {
    let mut new_raw: HANDLE = ptr::null_mut();
    unsafe {
        let cur_proc = GetCurrentProcess();
        check(DuplicateHandle(
            cur_proc,
            file.as_raw_handle() as HANDLE,
            cur_proc,
            &mut new_raw,
            0,
            TRUE,
            DUPLICATE_SAME_ACCESS,
        ))?;
        Ok(File::from_raw_handle(new_raw as RawHandle))
    }
}

#[allow(clippy::too_many_arguments)]
pub fn CreateProcess(
    appname: &OsStr,
    cmdline: &OsStr,
    env_block: Option<&[u16]>,
    cwd: &OsStr,
    creation_flags: u32,
    stdin: RawHandle,
    stdout: RawHandle,
    stderr: RawHandle,
) -> Result<(Handle, u32)> {
    let mut sinfo: STARTUPINFOW = unsafe { mem::zeroed() };
    sinfo.cb = mem::size_of::<STARTUPINFOW>() as DWORD;
    sinfo.hStdInput = stdin as HANDLE;
    sinfo.hStdOutput = stdout as HANDLE;
    sinfo.hStdError = stderr as HANDLE;
    sinfo.dwFlags = STARTF_USESTDHANDLES;
    let mut pinfo: PROCESS_INFORMATION = unsafe { mem::zeroed() };
    let wc_appname = to_nullterm(appname);
    let mut cmdline = to_nullterm(cmdline);
    let wc_cwd = to_nullterm(cwd);
    let env_ptr = env_block
        .map(|b| b.as_ptr() as LPVOID)
        .unwrap_or(ptr::null_mut());
    check(unsafe {
        processthreadsapi::CreateProcessW(
            wc_appname.as_ptr(),
            cmdline.as_mut_ptr(),
            ptr::null_mut(), // lpProcessAttributes
            ptr::null_mut(), // lpThreadAttributes
            TRUE,            // bInheritHandles
            creation_flags,
            env_ptr,
            wc_cwd.as_ptr(),
            &mut sinfo,
            &mut pinfo,
        )
    })?;
    unsafe {
        drop(Handle::from_raw_handle(pinfo.hThread as RawHandle));
        Ok((
            Handle::from_raw_handle(pinfo.hProcess as RawHandle),
            pinfo.dwProcessId,
        ))
    }
}

pub enum WaitEvent {
    OBJECT_0,
    TIMEOUT,
}

pub fn WaitForSingleObject(handle: &Handle, timeout: Option<Duration>) -> Result<WaitEvent> {
    let timeout = timeout
        .map(|t| t.as_millis().min(INFINITE as u128 - 1) as DWORD)
        .unwrap_or(INFINITE);
    let result = unsafe { synchapi::WaitForSingleObject(handle.as_raw_handle() as HANDLE, timeout) };
    match result {
        WAIT_OBJECT_0 => Ok(WaitEvent::OBJECT_0),
        WAIT_TIMEOUT => Ok(WaitEvent::TIMEOUT),
        WAIT_FAILED => Err(Error::last_os_error()),
        other => Err(Error::other(format!(
            "WaitForSingleObject returned {other:#x}"
        ))),
    }
}

pub fn GetExitCodeProcess(handle: &Handle) -> Result<u32> {
    let mut exit_code: DWORD = 0;
    check(unsafe {
        processthreadsapi::GetExitCodeProcess(handle.as_raw_handle() as HANDLE, &mut exit_code)
    })?;
    Ok(exit_code)
}

/// Number of bytes that can be read from the pipe without blocking.
pub fn PeekNamedPipe(pipe: &File) -> Result<u32> {
    let mut available: DWORD = 0;
    check(unsafe {
        namedpipeapi::PeekNamedPipe(
            pipe.as_raw_handle() as HANDLE,
            ptr::null_mut(),
            0,
            ptr::null_mut(),
            &mut available,
            ptr::null_mut(),
        )
    })?;
    Ok(available)
}

/// Copy of the current process's environment block, including the final
/// terminating null.
pub fn GetEnvironmentStrings() -> Result<Vec<u16>> {
    unsafe {
        let block = processenv::GetEnvironmentStringsW();
        if block.is_null() {
            return Err(Error::last_os_error());
        }
        let mut len = 0;
        // The block ends with an empty entry, i.e. two consecutive nulls.
        while !(*block.add(len) == 0 && *block.add(len + 1) == 0) {
            len += 1;
        }
        let copy = std::slice::from_raw_parts(block, len + 2).to_vec();
        processenv::FreeEnvironmentStringsW(block);
        Ok(copy)
    }
}

/// Value of one variable of this process's environment, or `None` if it is
/// not set. Unlike `std::env::var_os`, accepts the `=X:` drive names.
pub fn GetEnvironmentVariable(name: &OsStr) -> Result<Option<Vec<u16>>> {
    let name = to_nullterm(name);
    let mut buf: Vec<u16> = vec![0; 256];
    loop {
        // an empty value also returns 0, without setting the last error
        unsafe { SetLastError(0) };
        let len = unsafe {
            processenv::GetEnvironmentVariableW(name.as_ptr(), buf.as_mut_ptr(), buf.len() as DWORD)
        } as usize;
        if len == 0 {
            let err = Error::last_os_error();
            return match err.raw_os_error() {
                Some(0) => Ok(Some(vec![])),
                Some(code) if code == ERROR_ENVVAR_NOT_FOUND as i32 => Ok(None),
                _ => Err(err),
            };
        }
        if len < buf.len() {
            buf.truncate(len);
            return Ok(Some(buf));
        }
        // too small; `len` includes the terminating null
        buf.resize(len, 0);
    }
}
