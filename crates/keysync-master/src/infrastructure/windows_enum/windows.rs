//! Win32 window enumeration.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::collections::HashMap;

use keysync_core::domain::window::ForegroundInfo;
use keysync_core::{WindowHandle, WindowInfo};
use windows::core::{BOOL, PWSTR};
use windows::Win32::Foundation::{CloseHandle, HWND, LPARAM};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetForegroundWindow, GetWindowThreadProcessId, InternalGetWindowText,
    IsHungAppWindow, IsWindowVisible,
};

use super::{EnumError, WindowEnumerator};

const TEXT_CAPACITY: usize = 256;
const PATH_CAPACITY: usize = 1024;

/// [`WindowEnumerator`] over the live desktop.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32WindowEnumerator;

impl Win32WindowEnumerator {
    pub fn new() -> Self {
        Self
    }
}

impl WindowEnumerator for Win32WindowEnumerator {
    fn enumerate(&self) -> Result<Vec<WindowInfo>, EnumError> {
        let mut handles: Vec<HWND> = Vec::new();
        // SAFETY: the callback only pushes into the Vec behind `lparam`, which
        // outlives the synchronous EnumWindows call.
        unsafe { EnumWindows(Some(collect_window), LPARAM(&mut handles as *mut Vec<HWND> as isize)) }
            .map_err(|e| EnumError::Os(e.to_string()))?;

        let mut names: HashMap<u32, String> = HashMap::new();
        let mut windows = Vec::with_capacity(handles.len());
        for hwnd in handles {
            // SAFETY: IsHungAppWindow tolerates stale handles.
            if unsafe { IsHungAppWindow(hwnd) }.as_bool() {
                continue;
            }

            let pid = window_pid(hwnd);
            let process_name = names.entry(pid).or_insert_with(|| process_name(pid)).clone();
            windows.push(WindowInfo {
                handle: WindowHandle(hwnd.0 as isize),
                pid,
                process_name,
                title: window_title(hwnd),
                class_name: window_class(hwnd),
                // SAFETY: IsWindowVisible tolerates stale handles.
                visible: unsafe { IsWindowVisible(hwnd) }.as_bool(),
            });
        }
        Ok(windows)
    }

    fn foreground(&self) -> Option<ForegroundInfo> {
        // SAFETY: GetForegroundWindow has no preconditions.
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0.is_null() {
            return None;
        }
        let pid = window_pid(hwnd);
        if pid == 0 {
            return None;
        }
        Some(ForegroundInfo {
            handle: WindowHandle(hwnd.0 as isize),
            pid,
            process_name: process_name(pid),
        })
    }
}

/// `EnumWindows` callback collecting every handle.
unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: `lparam` is the `&mut Vec<HWND>` passed by `enumerate`.
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    handles.push(hwnd);
    BOOL(1)
}

fn window_pid(hwnd: HWND) -> u32 {
    let mut pid = 0u32;
    // SAFETY: `pid` is a valid out pointer for the duration of the call.
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
    pid
}

/// Window text read without sending `WM_GETTEXT`, so a hung owner cannot
/// block the scan.
fn window_title(hwnd: HWND) -> String {
    let mut buf = [0u16; TEXT_CAPACITY];
    // SAFETY: the buffer is valid for its full length.
    let len = unsafe { InternalGetWindowText(hwnd, &mut buf) };
    utf16_prefix(&buf, len)
}

fn window_class(hwnd: HWND) -> String {
    let mut buf = [0u16; TEXT_CAPACITY];
    // SAFETY: the buffer is valid for its full length.
    let len = unsafe { GetClassNameW(hwnd, &mut buf) };
    utf16_prefix(&buf, len)
}

/// Executable file name of `pid`, e.g. `dnf.exe`. Empty when the process
/// cannot be opened.
fn process_name(pid: u32) -> String {
    if pid == 0 {
        return String::new();
    }

    // SAFETY: OpenProcess returns an owned handle that is closed below.
    let Ok(handle) = (unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }) else {
        return String::new();
    };

    let mut buf = [0u16; PATH_CAPACITY];
    let mut len = buf.len() as u32;
    // SAFETY: `buf` and `len` describe a writable buffer of `len` wide chars.
    let queried = unsafe { QueryFullProcessImageNameW(handle, PROCESS_NAME_WIN32, PWSTR(buf.as_mut_ptr()), &mut len) };
    // SAFETY: `handle` came from OpenProcess and is closed exactly once.
    let _ = unsafe { CloseHandle(handle) };

    if queried.is_err() {
        return String::new();
    }
    let path = String::from_utf16_lossy(&buf[..len as usize]);
    path.rsplit(['\\', '/']).next().unwrap_or_default().to_string()
}

fn utf16_prefix(buf: &[u16], len: i32) -> String {
    let len = usize::try_from(len).unwrap_or(0).min(buf.len());
    String::from_utf16_lossy(&buf[..len])
}
