// Target addresses
//
// An address is a numeric value plus an optional access-class prefix (for
// example "D" for data, "P" for program, or a wider spec like "NSD"). The
// textual form is `access:0xvalue`; parsing accepts hex in any case as well
// as plain decimal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::channel::Link;
use crate::codec::FncValue;
use crate::debugger::Debugger;
use crate::error::{status, Error, Result};
use crate::handle::HandleKind;
use crate::transport::RawHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub access: Option<String>,
    pub value: u64,
}

impl Address {
    pub fn new(value: u64) -> Self {
        Address {
            access: None,
            value,
        }
    }

    pub fn with_access(access: impl Into<String>, value: u64) -> Self {
        Address {
            access: Some(access.into()),
            value,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(access) = &self.access {
            write!(f, "{access}:")?;
        }
        write!(f, "0x{:08x}", self.value)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (access, digits) = match s.rfind(':') {
            Some(idx) => (Some(&s[..idx]), &s[idx + 1..]),
            None => (None, s),
        };
        let value = if let Some(hex) = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)
        } else {
            digits.parse::<u64>()
        }
        .map_err(|_| Error::Decode(format!("invalid address {s:?}")))?;
        Ok(Address {
            access: access.map(str::to_string),
            value,
        })
    }
}

impl Link {
    /// Copy `address` into a remote address object.
    pub(crate) fn load_address(&mut self, handle: RawHandle, address: &Address) -> Result<()> {
        if let Some(access) = &address.access {
            status(self.transport().set_address_access(handle, access))?;
        }
        status(self.transport().set_address_value(handle, address.value))
    }

    /// Read a remote address object back into a value.
    pub(crate) fn read_address(&mut self, handle: RawHandle) -> Result<Address> {
        let value = status(self.transport().get_address_value(handle))?;
        let access = status(self.transport().get_address_access(handle))?;
        Ok(Address {
            access: (!access.is_empty()).then_some(access),
            value,
        })
    }
}

impl Debugger {
    /// Translate an address to its dual-port equivalent, letting the remote
    /// side resolve access class and mapping.
    pub fn address_to_dualport(&self, address: &Address) -> Result<Address> {
        let result = self.fnc(&format!("CONVert.ADDRESSTODUALPORT({address})"))?;
        match result {
            FncValue::Address(text) | FncValue::String(text) => text.parse(),
            other => Err(Error::Decode(format!(
                "unexpected dual-port conversion result {other:?}"
            ))),
        }
    }

    /// Round-trip an address through a remote address object, normalizing
    /// the access class to what the target actually resolves.
    pub fn address_resolve(&self, address: &Address) -> Result<Address> {
        let mut link = self.channel().bind();
        link.with_obj(HandleKind::Address, |link, handle| {
            link.load_address(handle, address)?;
            link.read_address(handle)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        assert_eq!(Address::new(0x10).to_string(), "0x00000010");
        assert_eq!(
            Address::with_access("D", 0x1234_5678).to_string(),
            "D:0x12345678"
        );
    }

    #[test]
    fn test_parse_hex_any_case() {
        let a: Address = "0xFF".parse().unwrap();
        assert_eq!(a.value, 0xFF);
        let b: Address = "0Xff".parse().unwrap();
        assert_eq!(b.value, 0xFF);
    }

    #[test]
    fn test_parse_decimal_and_access() {
        let a: Address = "D:4096".parse().unwrap();
        assert_eq!(a.access.as_deref(), Some("D"));
        assert_eq!(a.value, 4096);
        let b: Address = "NSD:0x2000".parse().unwrap();
        assert_eq!(b.access.as_deref(), Some("NSD"));
        assert_eq!(b.value, 0x2000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("D:xyz".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn test_display_parse_round_trip() {
        let a = Address::with_access("P", 0xDEAD_BEEF);
        let parsed: Address = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }
}
