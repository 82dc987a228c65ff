// Error taxonomy for the remote control API
//
// Every remote call returns a 32-bit signed status: 0 is success, negative
// values are local/transport failures, positive values are remote-side
// failures. A fixed table maps specific codes to specific error kinds;
// everything else becomes a generic `Api` error carrying the raw code.

use std::time::Duration;
use thiserror::Error;

use crate::handle::HandleKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport failure ({code}): {}", status_name(*.code).0)]
    Transport { code: i32 },

    #[error("api error {} ({code}): {}", status_name(*.code).0, status_name(*.code).1)]
    Api { code: i32 },

    #[error("failed to allocate remote {kind:?} handle (status {code})")]
    HandleAllocation { kind: HandleKind, code: i32 },

    #[error("breakpoint rejected: invalid address")]
    BreakpointAddress,

    #[error("breakpoint rejected: invalid action")]
    BreakpointAction,

    #[error("register not found on remote target")]
    RegisterNotFound,

    #[error("command execution failed: {message}")]
    ExecuteCommand { message: String },

    #[error("function evaluation failed: {message}")]
    ExecuteFunction { message: String },

    #[error("timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Map a nonzero status code to the error kind the fixed table assigns
    /// to it. `0` must never reach this function.
    pub fn from_status(code: i32) -> Self {
        debug_assert_ne!(code, 0);
        match code {
            0x1010 | 0x1032 | 0x1042 => Error::RegisterNotFound,
            0x10A2 => Error::BreakpointAddress,
            0x10A3 => Error::BreakpointAction,
            0x10C0 => Error::ExecuteCommand {
                message: String::new(),
            },
            0x10C1 => Error::ExecuteFunction {
                message: String::new(),
            },
            c if c < 0 => Error::Transport { code: c },
            c => Error::Api { code: c },
        }
    }
}

/// Convert a raw-status result from the transport into a typed error.
pub(crate) fn status<T>(result: std::result::Result<T, i32>) -> Result<T> {
    result.map_err(Error::from_status)
}

/// Symbolic name and description for a status code, from the fixed table
/// published with the remote API. Unknown codes map to a generic entry.
pub fn status_name(code: i32) -> (&'static str, &'static str) {
    match code {
        0 => ("OK", "ok, no error"),
        // client-side codes
        -1 => ("ERR_COM_RECEIVE_FAIL", "receiving API response failed"),
        -2 => ("ERR_COM_TRANSMIT_FAIL", "sending API message failed"),
        -3 => ("ERR_COM_PARA_FAIL", "function parameter error"),
        -4 => ("ERR_COM_SEQ_FAIL", "message sequence failed"),
        -5 => ("ERR_NOTIFY_MAX_EVENT", "max. notify events exceeded"),
        -6 => ("ERR_MALLOC_FAIL", "malloc() failed"),
        // standard codes
        2 => ("ERR_STD_RUNNING", "target running"),
        3 => ("ERR_STD_NOTRUNNING", "target not running"),
        4 => ("ERR_STD_RESET", "target is in reset"),
        6 => ("ERR_STD_ACCESSTIMEOUT", "access timeout, target running"),
        10 => ("ERR_STD_INVALID", "not implemented"),
        14 => ("ERR_STD_REGUNDEF", "registerset undefined"),
        15 => ("ERR_STD_VERIFY", "verify error"),
        16 => ("ERR_STD_BUSERROR", "bus error"),
        22 => ("ERR_STD_NOMEM", "no memory mapped"),
        48 => ("ERR_STD_RESETDETECTED", "target reset detected"),
        57 => ("ERR_STD_RTCKTIMEOUT", "no RTCK detected"),
        60 => ("ERR_STD_INVALIDLICENSE", "no valid license detected"),
        64 => ("ERR_STD_CORENOTACTIVE", "core has no clock/power/reset in SMP"),
        67 => ("ERR_STD_USERSIGNAL", "user signal"),
        83 => ("ERR_STD_NORAPI", "tried to connect to emu"),
        113 => ("ERR_STD_FAILED", ""),
        123 => ("ERR_STD_LOCKED", "access locked"),
        128 => ("ERR_STD_POWERFAIL", "power fail"),
        140 => ("ERR_STD_DEBUGPORTFAIL", "debug port fail"),
        144 => ("ERR_STD_DEBUGPORTTIMEOUT", "debug port timeout"),
        147 => ("ERR_STD_NODEVICE", "no debug device"),
        161 => ("ERR_STD_RESETFAIL", "target reset fail"),
        162 => ("ERR_STD_EMUTIMEOUT", "emulator communication timeout"),
        254 => ("ERR_STD_ATTACH", "attach is missing"),
        255 => ("ERR_STD_FATAL", "fatal error 255"),
        // function-specific codes
        0x1000 => ("ERR_GETRAM_INTERNAL", "reading scratch RAM failed internally"),
        0x1011 => ("ERR_READREGBYNAME_FAILED", "reading register by name failed"),
        0x1020 => ("ERR_WRITEREGBYNAME_NOTFOUND", "register not found"),
        0x1021 => ("ERR_WRITEREGBYNAME_FAILED", "writing register by name failed"),
        0x1030 => ("ERR_READREGOBJ_PARAFAIL", "read register object: wrong parameters"),
        0x1031 => ("ERR_READREGOBJ_MAXCORE", "read register object: max cores exceeded"),
        0x1033 => ("ERR_READREGSETOBJ_PARAFAIL", "read register set: wrong parameters"),
        0x1034 => ("ERR_READREGSETOBJ_NUMREGS", "read register set: register count wrong"),
        0x1040 => ("ERR_WRITEREGOBJ_PARAFAIL", "write register object: wrong parameters"),
        0x1041 => ("ERR_WRITEREGOBJ_MAXCORE", "write register object: max cores exceeded"),
        0x1043 => ("ERR_WRITEREGOBJ_FAILED", "writing register failed"),
        0x1050 => ("ERR_SETBP_FAILED", "setting breakpoint failed"),
        0x1060 => ("ERR_READMEMOBJ_PARAFAIL", "read memory object: wrong parameters"),
        0x1070 => ("ERR_WRITEMEMOBJ_PARAFAIL", "write memory object: wrong parameters"),
        0x1071 => ("ERR_TRANSFERMEMOBJ_PARAFAIL", "transfer memory bundle: wrong parameters"),
        0x1072 => ("ERR_TRANSFERMEMOBJ_TRANSFERFAIL", "transfer memory bundle: transfer failed"),
        0x1080 => ("ERR_READVAR_ALLOC", "read variable: allocation failed"),
        0x1081 => ("ERR_READVAR_ACCESS", "read variable: access to symbol failed"),
        0x1091 => ("ERR_READBPOBJ_PARAFAIL", "read breakpoint object: wrong parameters"),
        0x1092 => ("ERR_READBPOBJ_NOTFOUND", "breakpoint not found"),
        0x10A1 => ("ERR_WRITEBPOBJ_FAILED", "writing breakpoint object failed"),
        0x10B0 => ("ERR_MMUTRANSLATION_FAIL", "MMU translation failed"),
        _ => ("UNKNOWN_ERROR", "unknown status code"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table_lookup() {
        assert_eq!(status_name(2).0, "ERR_STD_RUNNING");
        assert_eq!(status_name(0x1050).0, "ERR_SETBP_FAILED");
        assert_eq!(status_name(424242).0, "UNKNOWN_ERROR");
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(Error::from_status(-1), Error::Transport { code: -1 }));
        assert!(matches!(Error::from_status(0x1010), Error::RegisterNotFound));
        assert!(matches!(Error::from_status(0x10A2), Error::BreakpointAddress));
        assert!(matches!(Error::from_status(0x10A3), Error::BreakpointAction));
        assert!(matches!(Error::from_status(0x10C0), Error::ExecuteCommand { .. }));
        assert!(matches!(Error::from_status(113), Error::Api { code: 113 }));
    }

    #[test]
    fn test_api_error_display_includes_code_and_name() {
        let msg = Error::from_status(3).to_string();
        assert!(msg.contains("ERR_STD_NOTRUNNING"));
        assert!(msg.contains('3'));
    }
}
