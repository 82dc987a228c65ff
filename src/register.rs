// Register access
//
// Registers are read and written through the tagged-record sub-function.
// A request carries a mode word selecting read or write, which register
// units participate (CPU, FPU, VPU), and whether float payloads follow;
// list-form requests then name each register, bare-form requests select a
// whole core. Replies come back as tagged records, one per register.

use serde::{Deserialize, Serialize};

use crate::debugger::Debugger;
use crate::error::{status, Error, Result};
use crate::handle::{HandleKind, RegisterWidth};
use crate::records::{parse_records, Record, TaggedRequest};
use crate::transport::subfunction;

// Mode word bits.
mod mode {
    pub const READ: u16 = 0b10;
    pub const WRITE: u16 = 0b11;
    pub const CPU: u16 = 0b100;
    pub const FPU: u16 = 0b1000;
    pub const VPU: u16 = 0b10000;
    pub const ALL_UNITS: u16 = 0b11100;
    pub const FLOAT_VALUE: u16 = 0b100000;
}

/// Core selector meaning "every core".
const ALL_CORES: u16 = 0xFFFF;

/// Register unit filter for read and write requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterUnit {
    Cpu,
    Fpu,
    Vpu,
}

impl RegisterUnit {
    fn mode_bit(self) -> u16 {
        match self {
            RegisterUnit::Cpu => mode::CPU,
            RegisterUnit::Fpu => mode::FPU,
            RegisterUnit::Vpu => mode::VPU,
        }
    }
}

/// Value payload for register writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    Int(i64),
    Float(f64),
    /// Raw register content, most significant byte first.
    Bytes([u8; 8]),
}

impl RegisterValue {
    /// Little-endian wire form of the payload.
    fn wire_bytes(self) -> [u8; 8] {
        match self {
            RegisterValue::Int(v) => v.to_le_bytes(),
            RegisterValue::Float(v) => v.to_le_bytes(),
            RegisterValue::Bytes(raw) => u64::from_be_bytes(raw).to_le_bytes(),
        }
    }

    fn is_float(self) -> bool {
        matches!(self, RegisterValue::Float(_))
    }
}

/// One register as reported by the remote side.
///
/// `value` and `fvalue` are mutually exclusive views of the content: setting
/// one clears the other. The raw 8-byte value is interpreted most significant
/// byte first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub name: Option<String>,
    /// Register unit tag as reported ("CPU", "FPU", "VPU").
    pub unit: Option<String>,
    pub core: Option<i16>,
    value: Option<[u8; 8]>,
    fvalue: Option<f64>,
}

impl Register {
    pub(crate) fn from_record(record: Record) -> Self {
        Register {
            name: record.name,
            unit: record.ty,
            core: record.core,
            value: record.value,
            fvalue: record.fvalue,
        }
    }

    pub fn value(&self) -> Option<&[u8; 8]> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: [u8; 8]) {
        self.value = Some(value);
        self.fvalue = None;
    }

    /// Integer interpretation of the raw value.
    pub fn ivalue(&self) -> Option<i64> {
        self.value.map(i64::from_be_bytes)
    }

    pub fn set_ivalue(&mut self, value: i64) {
        self.set_value(value.to_be_bytes());
    }

    pub fn fvalue(&self) -> Option<f64> {
        self.fvalue
    }

    pub fn set_fvalue(&mut self, value: f64) {
        self.fvalue = Some(value);
        self.value = None;
    }
}

fn unit_mode(base: u16, unit: Option<RegisterUnit>) -> u16 {
    base | unit.map_or(mode::ALL_UNITS, RegisterUnit::mode_bit)
}

fn list_request(
    base_mode: u16,
    names: &[&str],
    core: Option<u16>,
    unit: Option<RegisterUnit>,
    value: Option<RegisterValue>,
) -> TaggedRequest {
    let mut m = unit_mode(base_mode, unit);
    if value.is_some_and(RegisterValue::is_float) {
        m |= mode::FLOAT_VALUE;
    }
    let mut req = TaggedRequest::new(m);
    req.push_u16(names.len() as u16);
    for name in names {
        req.push_name(name);
        if let Some(core) = core {
            req.push_core(core);
        }
        if let Some(value) = value {
            req.push_value(&value.wire_bytes());
        }
    }
    req
}

impl Debugger {
    /// Read registers matching `name`. Depending on the target one name can
    /// match zero, one, or several registers (one per core, for example).
    pub fn register_read(
        &self,
        name: &str,
        core: Option<u16>,
        unit: Option<RegisterUnit>,
    ) -> Result<Vec<Register>> {
        let req = list_request(mode::READ, &[name], core, unit, None);
        self.register_round_trip(req.as_bytes(), false)
    }

    /// Read several registers by name in one round trip.
    pub fn register_read_by_names(
        &self,
        names: &[&str],
        core: Option<u16>,
        unit: Option<RegisterUnit>,
    ) -> Result<Vec<Register>> {
        let req = list_request(mode::READ, names, core, unit, None);
        self.register_round_trip(req.as_bytes(), true)
    }

    /// Read the whole register set, optionally restricted to one core or
    /// one unit.
    pub fn register_read_all(
        &self,
        core: Option<u16>,
        unit: Option<RegisterUnit>,
    ) -> Result<Vec<Register>> {
        // bare form carries unit bits only, no read/write bit
        let mut req = TaggedRequest::new(unit_mode(0, unit));
        req.push_u16(core.unwrap_or(ALL_CORES));
        self.register_round_trip(req.as_bytes(), true)
    }

    /// Write one register and return its updated state.
    pub fn register_write(
        &self,
        name: &str,
        value: RegisterValue,
        core: Option<u16>,
        unit: Option<RegisterUnit>,
    ) -> Result<Register> {
        self.register_write_by_names(&[name], value, core, unit)?
            .into_iter()
            .next()
            .ok_or(Error::RegisterNotFound)
    }

    /// Write the same value into several registers, returning their updated
    /// states.
    pub fn register_write_by_names(
        &self,
        names: &[&str],
        value: RegisterValue,
        core: Option<u16>,
        unit: Option<RegisterUnit>,
    ) -> Result<Vec<Register>> {
        let req = list_request(mode::WRITE, names, core, unit, Some(value));
        self.register_round_trip(req.as_bytes(), true)
    }

    /// Read one register's value on one core through a remote register
    /// object. Unlike `register_read` this addresses exactly one register.
    pub fn register_value64(&self, name: &str, core: u16) -> Result<u64> {
        let mut link = self.channel().bind();
        link.with_obj(HandleKind::Register(RegisterWidth::R64), |link, handle| {
            status(link.transport().set_register_name(handle, name))?;
            status(link.transport().set_register_core(handle, core))?;
            status(link.transport().get_register_value64(handle))
        })
    }

    /// Write one register's value on one core through a remote register
    /// object.
    pub fn register_set_value64(&self, name: &str, core: u16, value: u64) -> Result<()> {
        let mut link = self.channel().bind();
        link.with_obj(HandleKind::Register(RegisterWidth::R64), |link, handle| {
            status(link.transport().set_register_name(handle, name))?;
            status(link.transport().set_register_core(handle, core))?;
            status(link.transport().set_register_value64(handle, value))
        })
    }

    fn register_round_trip(&self, data: &[u8], retry: bool) -> Result<Vec<Register>> {
        let mut link = self.channel().bind();
        let reply = link.exp(subfunction::REGISTER, data)?;
        let mut regs: Vec<Register> = parse_records(&reply)
            .map(Register::from_record)
            .collect();
        if regs.is_empty() && retry {
            // the remote side occasionally answers one round trip with an
            // empty payload; a single repeat resolves it
            let reply = link.exp(subfunction::REGISTER, data)?;
            regs = parse_records(&reply).map(Register::from_record).collect();
        }
        Ok(regs)
    }
}
