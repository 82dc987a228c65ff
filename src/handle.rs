// Remote object handles
//
// Typed remote-side objects (addresses, breakpoints, symbols, registers,
// buffers, memory bundles) are acquired from the remote debugger, configured
// through accessors, used, and released. Acquisition is closure-scoped: the
// handle is released on every exit path, including early error returns.

use tracing::warn;

use crate::channel::Link;
use crate::error::{Error, Result};
use crate::transport::RawHandle;

/// Width class of a register object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterWidth {
    R32,
    R64,
    R128,
    R256,
    R512,
}

impl RegisterWidth {
    /// Width in bits.
    pub fn bits(self) -> u32 {
        match self {
            RegisterWidth::R32 => 32,
            RegisterWidth::R64 => 64,
            RegisterWidth::R128 => 128,
            RegisterWidth::R256 => 256,
            RegisterWidth::R512 => 512,
        }
    }
}

/// The closed set of remote object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Address,
    Breakpoint,
    Symbol,
    Register(RegisterWidth),
    /// Raw data buffer of the given capacity in bytes.
    Buffer(usize),
    /// Batch container for the given number of memory regions.
    MemoryBundle(usize),
}

impl Link {
    /// Acquire a remote object of `kind`, run `f` with its handle, and
    /// release it. Release happens whether `f` succeeds or fails; a failed
    /// release is logged and does not mask the closure's outcome.
    pub(crate) fn with_obj<R>(
        &mut self,
        kind: HandleKind,
        f: impl FnOnce(&mut Link, RawHandle) -> Result<R>,
    ) -> Result<R> {
        let handle = self
            .transport()
            .request_obj(kind)
            .map_err(|code| Error::HandleAllocation { kind, code })?;
        let out = f(self, handle);
        if let Err(code) = self.transport().release_obj(kind, handle) {
            warn!(?kind, handle, code, "failed to release remote object");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_width_bits() {
        assert_eq!(RegisterWidth::R32.bits(), 32);
        assert_eq!(RegisterWidth::R512.bits(), 512);
    }
}
