// Breakpoints
//
// A breakpoint is described by an address, a kind (what accesses trigger
// it), an implementation hint, a set of actions to take on hit, and an
// enable flag. Set and delete both go through a remote breakpoint object:
// configure the object, then commit it with the wanted mode.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::channel::Link;
use crate::debugger::Debugger;
use crate::error::{status, Result};
use crate::handle::HandleKind;
use crate::transport::RawHandle;

bitflags! {
    /// Actions taken when the breakpoint hits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Action: u32 {
        const STOP = 0x01;
        const SPOT = 0x02;
        const ALPHA = 0x04;
        const BETA = 0x08;
        const CHARLIE = 0x10;
        const DELTA = 0x20;
        const ECHO = 0x40;
    }
}

/// What kind of access triggers the breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Program,
    Read,
    Write,
    ReadWrite,
}

impl Kind {
    pub(crate) fn to_raw(self) -> u32 {
        match self {
            Kind::Program => 0x01,
            Kind::Read => 0x02,
            Kind::Write => 0x04,
            Kind::ReadWrite => 0x06,
        }
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x01 => Some(Kind::Program),
            0x02 => Some(Kind::Read),
            0x04 => Some(Kind::Write),
            0x06 => Some(Kind::ReadWrite),
            _ => None,
        }
    }
}

/// How the breakpoint is realized on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Implementation {
    Auto,
    Software,
    Onchip,
    Hardware,
    Mark,
}

impl Implementation {
    pub(crate) fn to_raw(self) -> u32 {
        match self {
            Implementation::Auto => 0x00,
            Implementation::Software => 0x01,
            Implementation::Onchip => 0x02,
            Implementation::Hardware => 0x04,
            Implementation::Mark => 0x08,
        }
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x00 => Some(Implementation::Auto),
            0x01 => Some(Implementation::Software),
            0x02 => Some(Implementation::Onchip),
            0x04 => Some(Implementation::Hardware),
            0x08 => Some(Implementation::Mark),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub address: Option<Address>,
    pub kind: Option<Kind>,
    pub implementation: Option<Implementation>,
    pub action: Option<Action>,
    pub enabled: bool,
}

impl Default for Breakpoint {
    fn default() -> Self {
        Breakpoint {
            address: None,
            kind: None,
            implementation: None,
            action: None,
            enabled: true,
        }
    }
}

impl Breakpoint {
    pub fn at(address: Address) -> Self {
        Breakpoint {
            address: Some(address),
            ..Default::default()
        }
    }
}

// Commit modes for the remote breakpoint object.
const MODE_SET: i32 = 1;
const MODE_DELETE: i32 = 0;

fn load_breakpoint(link: &mut Link, handle: RawHandle, bp: &Breakpoint) -> Result<()> {
    if let Some(address) = &bp.address {
        link.with_obj(HandleKind::Address, |link, addr_handle| {
            link.load_address(addr_handle, address)?;
            status(link.transport().set_breakpoint_address(handle, addr_handle))
        })?;
    }
    if let Some(kind) = bp.kind {
        status(link.transport().set_breakpoint_kind(handle, kind.to_raw()))?;
    }
    if let Some(implementation) = bp.implementation {
        status(
            link.transport()
                .set_breakpoint_impl(handle, implementation.to_raw()),
        )?;
    }
    if let Some(action) = bp.action {
        status(link.transport().set_breakpoint_action(handle, action.bits()))?;
    }
    status(
        link.transport()
            .set_breakpoint_enable(handle, bp.enabled as u8),
    )
}

fn read_breakpoint(link: &mut Link, handle: RawHandle) -> Result<Breakpoint> {
    let address = link.with_obj(HandleKind::Address, |link, addr_handle| {
        status(link.transport().get_breakpoint_address(handle, addr_handle))?;
        link.read_address(addr_handle)
    })?;
    let kind = status(link.transport().get_breakpoint_kind(handle))?;
    let implementation = status(link.transport().get_breakpoint_impl(handle))?;
    let action = status(link.transport().get_breakpoint_action(handle))?;
    let enabled = status(link.transport().get_breakpoint_enable(handle))?;
    Ok(Breakpoint {
        address: Some(address),
        kind: Kind::from_raw(kind),
        implementation: Implementation::from_raw(implementation),
        action: Action::from_bits(action),
        enabled: enabled != 0,
    })
}

impl Debugger {
    /// Set (or update) a breakpoint on the target.
    pub fn breakpoint_set(&self, bp: &Breakpoint) -> Result<()> {
        self.breakpoint_commit(bp, MODE_SET)
    }

    /// Remove a breakpoint from the target.
    pub fn breakpoint_delete(&self, bp: &Breakpoint) -> Result<()> {
        self.breakpoint_commit(bp, MODE_DELETE)
    }

    /// Re-set the breakpoint with its enable flag on.
    pub fn breakpoint_enable(&self, bp: &mut Breakpoint) -> Result<()> {
        bp.enabled = true;
        self.breakpoint_set(bp)
    }

    /// Re-set the breakpoint with its enable flag off.
    pub fn breakpoint_disable(&self, bp: &mut Breakpoint) -> Result<()> {
        bp.enabled = false;
        self.breakpoint_set(bp)
    }

    /// List all breakpoints currently set on the target.
    pub fn breakpoint_list(&self) -> Result<Vec<Breakpoint>> {
        let mut link = self.channel().bind();
        let count = status(link.transport().query_breakpoint_obj_count())?;
        let mut breakpoints = Vec::with_capacity(count as usize);
        for index in 0..count {
            let bp = link.with_obj(HandleKind::Breakpoint, |link, handle| {
                status(link.transport().read_breakpoint_obj_by_index(handle, index))?;
                read_breakpoint(link, handle)
            })?;
            breakpoints.push(bp);
        }
        Ok(breakpoints)
    }

    fn breakpoint_commit(&self, bp: &Breakpoint, mode: i32) -> Result<()> {
        let mut link = self.channel().bind();
        link.with_obj(HandleKind::Breakpoint, |link, handle| {
            load_breakpoint(link, handle, bp)?;
            status(link.transport().write_breakpoint_obj(handle, mode))
        })
    }
}
