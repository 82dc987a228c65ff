// Channel discipline
//
// The transport multiplexes several logical sessions over one connection,
// keyed by per-session channel state. The transport itself has no notion of
// a current caller beyond the last `set_channel`, so every public operation
// must rebind its own channel before touching the wire. `Channel` wraps the
// transport in a mutex and rebinds inside the lock, which makes each public
// operation atomic with respect to other sessions in the same process.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{status, Result};
use crate::transport::{ChannelToken, Transport};

pub struct Channel {
    link: Mutex<Link>,
}

/// Exclusive, channel-bound access to the transport. Only obtainable through
/// `Channel::bind`, so holding a `Link` implies the channel is current.
pub struct Link {
    transport: Box<dyn Transport>,
    token: ChannelToken,
}

impl Channel {
    pub(crate) fn new(mut transport: Box<dyn Transport>) -> Self {
        let token = transport.channel_defaults();
        Channel {
            link: Mutex::new(Link { transport, token }),
        }
    }

    /// Lock the transport and make this channel current. Every public
    /// operation goes through here; the rebind is unconditional because
    /// another session may have run since the last call.
    pub(crate) fn bind(&self) -> MutexGuard<'_, Link> {
        let mut link = self.link.lock().unwrap_or_else(|e| e.into_inner());
        link.rebind();
        link
    }
}

impl Link {
    fn rebind(&mut self) {
        self.transport.set_channel(&self.token);
    }

    pub(crate) fn transport(&mut self) -> &mut dyn Transport {
        &mut *self.transport
    }

    /// One tagged-record round trip for a sub-function.
    pub(crate) fn exp(&mut self, cmd: u16, data: &[u8]) -> Result<Vec<u8>> {
        debug!(cmd, len = data.len(), "tagged-record round trip");
        status(self.transport.exp(cmd, data))
    }
}
