//! Named file mapping backed by the system paging file.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::ffi::c_void;
use std::mem::size_of;

use keysync_core::protocol::{SegmentMemory, SEGMENT_SIZE};
use tracing::warn;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_FILE_NOT_FOUND, HANDLE, INVALID_HANDLE_VALUE};
use windows::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery, FILE_MAP_ALL_ACCESS,
    MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
};

use super::{SegmentError, SegmentProvider};

/// A mapped view of a named segment. Unmapped and closed on drop.
pub struct NamedSegment {
    mapping: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
    len: usize,
}

// SAFETY: the mapping handle and view are process-wide resources usable from
// any thread, and the view is only accessed through atomics.
unsafe impl Send for NamedSegment {}
// SAFETY: as above; shared references only perform atomic accesses.
unsafe impl Sync for NamedSegment {}

impl NamedSegment {
    /// Creates the segment, or opens it if another process already did.
    ///
    /// # Errors
    ///
    /// [`SegmentError::Os`] if the mapping cannot be created or mapped.
    pub fn create(name: &str) -> Result<Self, SegmentError> {
        let wide = to_wide(name);
        // SAFETY: `wide` is NUL-terminated and outlives the call; the paging
        // file backs the mapping, so no file handle is involved.
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                0,
                SEGMENT_SIZE as u32,
                PCWSTR(wide.as_ptr()),
            )
        }
        .map_err(|e| os_error(name, e))?;

        Self::map(name, mapping)
    }

    /// Attaches to an existing segment without creating it.
    ///
    /// # Errors
    ///
    /// [`SegmentError::NotFound`] when no such segment exists,
    /// [`SegmentError::SizeMismatch`] when it is smaller than the protocol
    /// needs, [`SegmentError::Os`] otherwise.
    pub fn open_existing(name: &str) -> Result<Self, SegmentError> {
        let wide = to_wide(name);
        // SAFETY: `wide` is NUL-terminated and outlives the call.
        let mapping = match unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, false, PCWSTR(wide.as_ptr())) } {
            Ok(mapping) => mapping,
            Err(e) => {
                // SAFETY: GetLastError has no preconditions.
                if unsafe { GetLastError() } == ERROR_FILE_NOT_FOUND {
                    return Err(SegmentError::NotFound { name: name.to_string() });
                }
                return Err(os_error(name, e));
            }
        };

        Self::map(name, mapping)
    }

    fn map(name: &str, mapping: HANDLE) -> Result<Self, SegmentError> {
        // SAFETY: `mapping` is a valid file mapping handle owned by this call.
        let view = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
        if view.Value.is_null() {
            // SAFETY: GetLastError has no preconditions.
            let reason = format!("MapViewOfFile failed: {:?}", unsafe { GetLastError() });
            // SAFETY: `mapping` is owned here and closed exactly once.
            let _ = unsafe { CloseHandle(mapping) };
            return Err(SegmentError::Os {
                name: name.to_string(),
                reason,
            });
        }

        let segment = Self {
            mapping,
            view,
            len: view_size(view.Value),
        };
        if segment.len < SEGMENT_SIZE {
            // Dropping `segment` unmaps and closes.
            return Err(SegmentError::SizeMismatch {
                expected: SEGMENT_SIZE,
                actual: segment.len,
            });
        }
        Ok(segment)
    }
}

// SAFETY: MapViewOfFile returns page-aligned memory valid for `len` bytes
// until UnmapViewOfFile in `drop`, and the protocol code only touches it
// through atomics.
unsafe impl SegmentMemory for NamedSegment {
    fn as_ptr(&self) -> *mut u8 {
        self.view.Value as *mut u8
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for NamedSegment {
    fn drop(&mut self) {
        // SAFETY: `view` and `mapping` were obtained in `map` and are released
        // exactly once here.
        unsafe {
            if let Err(e) = UnmapViewOfFile(self.view) {
                warn!(error = %e, "UnmapViewOfFile failed");
            }
            let _ = CloseHandle(self.mapping);
        }
    }
}

/// Provider creating the named segment.
#[derive(Debug, Clone)]
pub struct NamedSegmentProvider {
    name: String,
}

impl NamedSegmentProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl SegmentProvider for NamedSegmentProvider {
    type Memory = NamedSegment;

    fn create(&mut self) -> Result<Self::Memory, SegmentError> {
        NamedSegment::create(&self.name)
    }
}

/// Size of the committed region starting at `base`.
fn view_size(base: *mut c_void) -> usize {
    let mut info = MEMORY_BASIC_INFORMATION::default();
    // SAFETY: `info` is a valid out buffer of the size passed.
    let written = unsafe { VirtualQuery(Some(base as *const c_void), &mut info, size_of::<MEMORY_BASIC_INFORMATION>()) };
    if written == 0 {
        0
    } else {
        info.RegionSize
    }
}

fn to_wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn os_error(name: &str, error: windows::core::Error) -> SegmentError {
    SegmentError::Os {
        name: name.to_string(),
        reason: error.to_string(),
    }
}
