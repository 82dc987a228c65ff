// Transport seam
//
// The physical link to the remote debugger is a native shared library that
// proxies a TCP/serial connection. This crate only depends on the interface
// that library presents: every entry point the core uses appears here as one
// trait method. Fallible calls surface the raw 32-bit status code; the core
// converts codes to typed errors immediately after each call.
//
// Production backends wrap the vendor library; `crate::stub::StubDebugger`
// implements the same trait over an in-memory target for tests and demos.

use std::env;
use std::path::{Path, PathBuf};

use crate::handle::HandleKind;

/// Opaque remote-side object reference.
pub type RawHandle = u64;

/// Raw status of a remote call: `Err` carries the nonzero status code.
pub type Status = std::result::Result<(), i32>;

/// Environment variable naming the installation root used to locate the
/// native transport library.
pub const SYS_ROOT_ENV: &str = "RCL_SYS";

/// Result buffer capacity for command and function evaluation.
pub const RESULT_CAPACITY: usize = 4096;

// Sub-function selectors for the tagged-record round trip.
pub(crate) mod subfunction {
    pub const MACRO: u16 = 2;
    pub const REGISTER: u16 = 3;
}

/// Device kind passed to `attach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Device {
    Os = 0,
    Icd = 1,
}

/// Opaque per-session channel state, obtained from `channel_defaults` and
/// replayed into `set_channel` before every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelToken(Vec<u8>);

impl ChannelToken {
    pub fn new(raw: Vec<u8>) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &[u8] {
        &self.0
    }
}

/// Resolve the system root used by native backends to find the shared
/// library. An explicit path wins over the environment variable.
pub fn system_root(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(SYS_ROOT_ENV).map(PathBuf::from))
}

/// One multiplexed session endpoint of the remote debugger API.
///
/// The transport is a single global resource: it is not re-entrant across
/// channels, so callers must replay their channel state (`set_channel`)
/// immediately before every call. `crate::channel::Channel` enforces that
/// discipline.
pub trait Transport: Send {
    // -- lifecycle ---------------------------------------------------------

    fn config(&mut self, key: &str, value: &str) -> Status;
    fn init(&mut self) -> Status;
    fn attach(&mut self, device: Device) -> Status;
    fn exit(&mut self) -> Status;
    fn ping(&mut self) -> Status;
    fn stop(&mut self) -> Status;

    fn channel_defaults(&mut self) -> ChannelToken;
    fn set_channel(&mut self, token: &ChannelToken);

    // -- command / function evaluation -------------------------------------

    /// Execute a command string. On failure the returned text carries the
    /// remote diagnostic message.
    fn execute_command(
        &mut self,
        command: &str,
        capacity: usize,
    ) -> std::result::Result<String, (i32, String)>;

    /// Evaluate a function string, returning the result type discriminator
    /// and the textual payload.
    fn execute_function(
        &mut self,
        expr: &str,
        capacity: usize,
    ) -> std::result::Result<(u32, String), (i32, String)>;

    fn eval_get(&mut self) -> std::result::Result<u32, i32>;
    fn eval_get_string(&mut self) -> std::result::Result<String, i32>;

    fn get_state(&mut self) -> std::result::Result<i32, i32>;
    fn get_message(&mut self) -> std::result::Result<(String, u16), i32>;

    /// State of the remote script interpreter: 0 idle, 1 running, 2 dialog
    /// window open.
    fn script_state(&mut self) -> std::result::Result<i32, i32>;

    // -- remote object handles ---------------------------------------------

    fn request_obj(&mut self, kind: HandleKind) -> std::result::Result<RawHandle, i32>;
    fn release_obj(&mut self, kind: HandleKind, handle: RawHandle) -> Status;

    fn set_address_value(&mut self, handle: RawHandle, value: u64) -> Status;
    fn get_address_value(&mut self, handle: RawHandle) -> std::result::Result<u64, i32>;
    fn set_address_access(&mut self, handle: RawHandle, access: &str) -> Status;
    fn get_address_access(&mut self, handle: RawHandle) -> std::result::Result<String, i32>;

    fn set_breakpoint_address(&mut self, handle: RawHandle, address: RawHandle) -> Status;
    fn get_breakpoint_address(&mut self, handle: RawHandle, address: RawHandle) -> Status;
    fn set_breakpoint_kind(&mut self, handle: RawHandle, kind: u32) -> Status;
    fn get_breakpoint_kind(&mut self, handle: RawHandle) -> std::result::Result<u32, i32>;
    fn set_breakpoint_impl(&mut self, handle: RawHandle, implementation: u32) -> Status;
    fn get_breakpoint_impl(&mut self, handle: RawHandle) -> std::result::Result<u32, i32>;
    fn set_breakpoint_action(&mut self, handle: RawHandle, action: u32) -> Status;
    fn get_breakpoint_action(&mut self, handle: RawHandle) -> std::result::Result<u32, i32>;
    fn set_breakpoint_enable(&mut self, handle: RawHandle, enable: u8) -> Status;
    fn get_breakpoint_enable(&mut self, handle: RawHandle) -> std::result::Result<u8, i32>;
    /// Commit the breakpoint object remote-side: mode 1 sets, mode 0 deletes.
    fn write_breakpoint_obj(&mut self, handle: RawHandle, mode: i32) -> Status;
    fn query_breakpoint_obj_count(&mut self) -> std::result::Result<u32, i32>;
    fn read_breakpoint_obj_by_index(&mut self, handle: RawHandle, index: u32) -> Status;

    fn set_symbol_name(&mut self, handle: RawHandle, name: &str) -> Status;
    fn get_symbol_name(&mut self, handle: RawHandle) -> std::result::Result<String, i32>;
    fn get_symbol_path(&mut self, handle: RawHandle) -> std::result::Result<String, i32>;
    fn set_symbol_address(&mut self, handle: RawHandle, address: RawHandle) -> Status;
    fn get_symbol_address(&mut self, handle: RawHandle, address: RawHandle) -> Status;
    fn get_symbol_size(&mut self, handle: RawHandle) -> std::result::Result<u64, i32>;
    fn query_symbol_obj(&mut self, handle: RawHandle) -> Status;

    fn set_register_name(&mut self, handle: RawHandle, name: &str) -> Status;
    fn set_register_core(&mut self, handle: RawHandle, core: u16) -> Status;
    fn get_register_value64(&mut self, handle: RawHandle) -> std::result::Result<u64, i32>;
    fn set_register_value64(&mut self, handle: RawHandle, value: u64) -> Status;

    fn copy_data_to_buffer(&mut self, handle: RawHandle, data: &[u8]) -> Status;
    fn copy_data_from_buffer(
        &mut self,
        handle: RawHandle,
        length: usize,
    ) -> std::result::Result<Vec<u8>, i32>;
    fn read_memory_obj(&mut self, buffer: RawHandle, address: RawHandle, length: usize) -> Status;
    fn write_memory_obj(&mut self, buffer: RawHandle, address: RawHandle, length: usize) -> Status;

    fn bundle_add_read(&mut self, handle: RawHandle, address: RawHandle, length: u32) -> Status;
    fn bundle_add_write(&mut self, handle: RawHandle, address: RawHandle, data: &[u8]) -> Status;
    fn transfer_bundle_obj(&mut self, handle: RawHandle) -> Status;
    fn bundle_sync_ok(&mut self, handle: RawHandle, index: usize)
        -> std::result::Result<bool, i32>;
    fn bundle_data_by_index(
        &mut self,
        handle: RawHandle,
        index: usize,
        length: usize,
    ) -> std::result::Result<Vec<u8>, i32>;

    // -- tagged-record round trip and notifications ------------------------

    /// Issue one tagged-record round trip for a sub-function, returning the
    /// opaque reply payload.
    fn exp(&mut self, cmd: u16, data: &[u8]) -> std::result::Result<Vec<u8>, i32>;

    fn check_state_notify(&mut self, param: u32) -> Status;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_root_explicit_wins() {
        let explicit = PathBuf::from("/opt/debugger");
        assert_eq!(
            system_root(Some(&explicit)),
            Some(PathBuf::from("/opt/debugger"))
        );
    }
}
