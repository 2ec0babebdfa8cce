//! Win32 transport: named file mapping + `WM_COPYDATA`.
//!
//! ## Safety contracts
//!
//! All `unsafe` blocks in this module rely on these guarantees:
//! 1. A `Win32Segment` owns exactly one mapping handle and one view of it;
//!    both are released once, in `Drop`, view first
//! 2. The view is `len` bytes long (the size the mapping was created with)
//!    and stays valid until the segment is dropped
//! 3. Pointers handed to `SendMessageW` (the `COPYDATASTRUCT` and the name
//!    bytes it points at) live on our stack/heap for the whole blocking call
//!
//! The view is also writable by the agent. We only ever read it through
//! bounds-checked slices and never trust lengths found inside it.

use std::ffi::c_void;
use std::io;
use std::ptr::NonNull;
use std::time::Duration;

use windows::Win32::Foundation::{CloseHandle, ERROR_TIMEOUT, HANDLE, HWND, INVALID_HANDLE_VALUE, LPARAM, WPARAM};
use windows::Win32::System::DataExchange::COPYDATASTRUCT;
use windows::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_WRITE, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, PAGE_READWRITE,
    UnmapViewOfFile,
};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowW, SMTO_ABORTIFHUNG, SMTO_BLOCK, SendMessageTimeoutW, SendMessageW, WM_COPYDATA,
};
use windows::core::PCWSTR;

use super::{Delivery, Platform, SegmentName, SharedSegment};
use crate::config::BridgeConfig;
use crate::locator::{AgentHandle, AgentLocator};

/// `dwData` tag Pageant checks on incoming `WM_COPYDATA`.
const AGENT_COPYDATA_ID: usize = 0x804e50ba;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[derive(Debug, Clone)]
pub struct Win32 {
    window_name: Vec<u16>,
    send_timeout: Option<Duration>,
}

impl Win32 {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            window_name: wide(&config.window_name),
            send_timeout: config.send_timeout,
        }
    }
}

impl AgentLocator for Win32 {
    fn locate(&self) -> Option<AgentHandle> {
        let name = PCWSTR(self.window_name.as_ptr());
        // Safety: `name` points at a NUL-terminated buffer owned by self.
        let hwnd = unsafe { FindWindowW(name, name) };
        AgentHandle::from_raw(hwnd.0 as usize)
    }
}

/// Mapping handle; closed on drop.
struct Mapping(HANDLE);

impl Drop for Mapping {
    fn drop(&mut self) {
        // Safety: the handle came from CreateFileMappingW and is closed only here.
        if let Err(e) = unsafe { CloseHandle(self.0) } {
            tracing::warn!(error = %e, "Failed to close shared segment handle");
        }
    }
}

/// Mapped view; unmapped on drop.
struct View {
    base: NonNull<u8>,
    len: usize,
}

impl Drop for View {
    fn drop(&mut self) {
        let address = MEMORY_MAPPED_VIEW_ADDRESS {
            Value: self.base.as_ptr().cast::<c_void>(),
        };
        // Safety: `base` came from MapViewOfFile and is unmapped only here.
        if let Err(e) = unsafe { UnmapViewOfFile(address) } {
            tracing::warn!(error = %e, "Failed to unmap shared segment");
        }
    }
}

/// One request's file mapping. Field order matters: the view is dropped
/// (unmapped) before the mapping handle is closed.
pub struct Win32Segment {
    view: View,
    _mapping: Mapping,
}

impl SharedSegment for Win32Segment {
    fn bytes(&self) -> &[u8] {
        // Safety: contract 2.
        unsafe { std::slice::from_raw_parts(self.view.base.as_ptr(), self.view.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // Safety: contract 2, and `&mut self` gives us the only Rust reference.
        unsafe { std::slice::from_raw_parts_mut(self.view.base.as_ptr(), self.view.len) }
    }
}

impl Platform for Win32 {
    type Segment = Win32Segment;

    fn context_id(&self) -> u32 {
        // Safety: no preconditions.
        unsafe { GetCurrentThreadId() }
    }

    fn create_segment(&self, name: &SegmentName, capacity: usize) -> io::Result<Win32Segment> {
        let size = u32::try_from(capacity)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "segment too large"))?;
        let wide_name = wide(name.as_str());

        // Safety: INVALID_HANDLE_VALUE asks for a pagefile-backed mapping;
        // the name buffer outlives the call.
        let handle = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                0,
                size,
                PCWSTR(wide_name.as_ptr()),
            )
        }
        .map_err(io::Error::other)?;
        let mapping = Mapping(handle);

        // Safety: `mapping` holds a valid handle; 0 bytes maps the whole object.
        let address = unsafe { MapViewOfFile(mapping.0, FILE_MAP_WRITE, 0, 0, 0) };
        let base = NonNull::new(address.Value.cast::<u8>()).ok_or_else(io::Error::last_os_error)?;

        tracing::trace!(segment = %name, capacity, "Mapped shared segment");

        Ok(Win32Segment {
            view: View {
                base,
                len: capacity,
            },
            _mapping: mapping,
        })
    }

    fn notify(&self, agent: AgentHandle, name: &SegmentName, _segment: &mut Win32Segment) -> Delivery {
        let mut name_bytes = name.to_bytes_with_nul();
        let copy_data = COPYDATASTRUCT {
            dwData: AGENT_COPYDATA_ID,
            cbData: name_bytes.len() as u32,
            lpData: name_bytes.as_mut_ptr().cast::<c_void>(),
        };
        let hwnd = HWND(agent.as_raw() as isize);
        let lparam = LPARAM(&copy_data as *const COPYDATASTRUCT as isize);

        let reply = match self.send_timeout {
            None => {
                // Safety: contract 3.
                unsafe { SendMessageW(hwnd, WM_COPYDATA, WPARAM(0), lparam) }.0
            }
            Some(timeout) => {
                let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
                let mut result: usize = 0;
                // Safety: contract 3; `result` outlives the call.
                let sent = unsafe {
                    SendMessageTimeoutW(
                        hwnd,
                        WM_COPYDATA,
                        WPARAM(0),
                        lparam,
                        SMTO_BLOCK | SMTO_ABORTIFHUNG,
                        millis,
                        Some(&mut result as *mut usize),
                    )
                };
                if sent.0 == 0 {
                    let err = windows::core::Error::from_win32();
                    if err.code() == ERROR_TIMEOUT.to_hresult() {
                        return Delivery::TimedOut(timeout);
                    }
                    tracing::debug!(error = %err, "SendMessageTimeoutW failed");
                    return Delivery::Rejected;
                }
                result as isize
            }
        };

        if reply == 0 {
            Delivery::Rejected
        } else {
            Delivery::Handled
        }
    }
}
