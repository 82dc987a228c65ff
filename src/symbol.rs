// Symbol lookup
//
// Symbols are queried through a remote symbol object keyed by either a name
// or an address, never both. The remote side reports a missing symbol by
// answering the query successfully with an all-ones size.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::debugger::Debugger;
use crate::error::{status, Error, Result};
use crate::handle::HandleKind;

/// Size value the remote side uses to report "symbol not found".
const SIZE_NOT_FOUND: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    /// Source path the symbol was loaded from.
    pub path: String,
    pub address: Address,
    pub size: u64,
}

impl Debugger {
    /// Look up a symbol by name. `Ok(None)` means the target has no such
    /// symbol.
    pub fn symbol_query_by_name(&self, name: &str) -> Result<Option<Symbol>> {
        self.symbol_query(Some(name), None)
    }

    /// Look up the symbol covering an address.
    pub fn symbol_query_by_address(&self, address: &Address) -> Result<Option<Symbol>> {
        self.symbol_query(None, Some(address))
    }

    /// Look up a symbol by exactly one key. Passing both or neither is
    /// rejected before any remote call is made.
    pub fn symbol_query(
        &self,
        name: Option<&str>,
        address: Option<&Address>,
    ) -> Result<Option<Symbol>> {
        match (name, address) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidArgument(
                    "symbol query takes a name or an address, not both",
                ))
            }
            (None, None) => {
                return Err(Error::InvalidArgument(
                    "symbol query needs a name or an address",
                ))
            }
            _ => {}
        }

        let mut link = self.channel().bind();
        link.with_obj(HandleKind::Symbol, |link, handle| {
            if let Some(name) = name {
                status(link.transport().set_symbol_name(handle, name))?;
            }
            if let Some(address) = address {
                link.with_obj(HandleKind::Address, |link, addr_handle| {
                    link.load_address(addr_handle, address)?;
                    status(link.transport().set_symbol_address(handle, addr_handle))
                })?;
            }
            status(link.transport().query_symbol_obj(handle))?;

            let size = status(link.transport().get_symbol_size(handle))?;
            if size == SIZE_NOT_FOUND {
                return Ok(None);
            }
            let name = status(link.transport().get_symbol_name(handle))?;
            let path = status(link.transport().get_symbol_path(handle))?;
            let address = link.with_obj(HandleKind::Address, |link, addr_handle| {
                status(link.transport().get_symbol_address(handle, addr_handle))?;
                link.read_address(addr_handle)
            })?;
            Ok(Some(Symbol {
                name,
                path,
                address,
                size,
            }))
        })
    }
}
