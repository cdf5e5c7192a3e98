//! Windows low-level keyboard hook.
//!
//! Installs `WH_KEYBOARD_LL` on a dedicated Win32 message-loop thread. The
//! event sender lives in a thread-local of that thread, so the callback needs
//! no global state and a second hook instance cannot steal the first one's
//! channel.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::cell::RefCell;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, SetWindowsHookExW,
    UnhookWindowsHookEx, HC_ACTION, KBDLLHOOKSTRUCT, LLKHF_INJECTED, MSG, PM_NOREMOVE, WH_KEYBOARD_LL, WM_KEYDOWN,
    WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_USER,
};

use super::{CaptureError, KeyEvent, KeyEventSource};

thread_local! {
    /// Sender used by the hook callback. Only set on the hook thread.
    static HOOK_SENDER: RefCell<Option<UnboundedSender<KeyEvent>>> = const { RefCell::new(None) };
}

/// The running hook thread.
struct HookThread {
    thread_id: u32,
    handle: JoinHandle<()>,
}

/// Global keyboard hook backed by a dedicated message-loop thread.
#[derive(Default)]
pub struct WindowsKeyHook {
    running: Option<HookThread>,
}

impl WindowsKeyHook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyEventSource for WindowsKeyHook {
    fn start(&mut self) -> Result<UnboundedReceiver<KeyEvent>, CaptureError> {
        if self.running.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<u32, String>>(1);

        let handle = thread::Builder::new()
            .name("keysync-hook-loop".to_string())
            .spawn(move || run_hook_message_loop(tx, ready_tx))
            .map_err(|e| CaptureError::HookInstallFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                info!(thread_id, "keyboard hook installed");
                self.running = Some(HookThread { thread_id, handle });
                Ok(rx)
            }
            Ok(Err(reason)) => {
                let _ = handle.join();
                Err(CaptureError::HookInstallFailed(reason))
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::HookInstallFailed("hook thread exited during install".to_string()))
            }
        }
    }

    fn stop(&mut self) {
        let Some(hook) = self.running.take() else {
            return;
        };

        // SAFETY: posting a message to a thread id has no memory-safety
        // preconditions; the thread created its queue before reporting ready.
        if let Err(e) = unsafe { PostThreadMessageW(hook.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) } {
            warn!(error = %e, "failed to post WM_QUIT to hook thread");
            return;
        }
        if hook.handle.join().is_err() {
            warn!("hook thread panicked during shutdown");
        }
        info!("keyboard hook removed");
    }
}

impl Drop for WindowsKeyHook {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Entry point of the hook thread.
fn run_hook_message_loop(tx: UnboundedSender<KeyEvent>, ready: std_mpsc::SyncSender<Result<u32, String>>) {
    HOOK_SENDER.with(|slot| *slot.borrow_mut() = Some(tx));

    let mut msg = MSG::default();
    // SAFETY: forces creation of this thread's message queue so that
    // PostThreadMessageW from `stop` cannot race the first GetMessageW.
    unsafe {
        let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
    }

    // SAFETY: GetModuleHandleW(None) returns the current executable's handle.
    let module = unsafe { GetModuleHandleW(None) }.ok().map(HINSTANCE::from);
    // SAFETY: the hook procedure has the HOOKPROC signature and this thread
    // runs a message loop below, which low-level hooks require.
    let hook = match unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), module, 0) } {
        Ok(hook) => hook,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };

    // SAFETY: GetCurrentThreadId has no preconditions.
    let thread_id = unsafe { GetCurrentThreadId() };
    let _ = ready.send(Ok(thread_id));

    // SAFETY: standard Win32 GetMessage/DispatchMessage loop; exits on WM_QUIT
    // or on error (-1), after which the hook is removed on this thread.
    unsafe {
        while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
            DispatchMessageW(&msg);
        }
        if let Err(e) = UnhookWindowsHookEx(hook) {
            warn!(error = %e, "UnhookWindowsHookEx failed");
        }
    }

    HOOK_SENDER.with(|slot| slot.borrow_mut().take());
    debug!("hook message loop exited");
}

/// Low-level keyboard hook callback.
///
/// # Safety
///
/// Called by Windows on the hook thread. Must return quickly and always
/// forward the event.
unsafe extern "system" fn keyboard_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        // SAFETY: l_param points to a KBDLLHOOKSTRUCT when n_code == HC_ACTION.
        let kbs = &*(l_param.0 as *const KBDLLHOOKSTRUCT);

        let is_down = match w_param.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(true),
            WM_KEYUP | WM_SYSKEYUP => Some(false),
            _ => None,
        };

        if let (Some(is_down), Ok(vk_code)) = (is_down, u8::try_from(kbs.vkCode)) {
            let event = KeyEvent {
                vk_code,
                is_down,
                injected: (kbs.flags & LLKHF_INJECTED).0 != 0,
                time_ms: kbs.time,
            };
            HOOK_SENDER.with(|slot| {
                if let Some(tx) = slot.borrow().as_ref() {
                    // The receiver is gone only during shutdown.
                    let _ = tx.send(event);
                }
            });
        }
    }

    // SAFETY: forward the event to the next hook in the chain.
    CallNextHookEx(None, n_code, w_param, l_param)
}
