// In-memory stub transport
//
// `StubDebugger` implements the full transport trait against a small
// simulated target: a register file over two cores, a flat RAM window, a
// symbol table, and a breakpoint list. It also models the remote side's
// quirks on demand (attach refusals while starting up, transient empty
// register replies) so session-level behavior can be tested without
// hardware. Used by the test suite and the bundled example.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Buf;

use crate::handle::HandleKind;
use crate::records::tags;
use crate::transport::{subfunction, ChannelToken, Device, RawHandle, Status, Transport};

/// Base and size of the simulated RAM window.
pub const MEMORY_BASE: u64 = 0x2000_0000;
pub const MEMORY_SIZE: usize = 0x1_0000;

const PARAM_ERROR: i32 = -3;
const NO_MEMORY: i32 = 22;
const BP_NOT_FOUND: i32 = 0x1092;
const REG_NOT_FOUND: i32 = 0x1010;
const BP_BAD_ADDRESS: i32 = 0x10A2;
const BP_BAD_ACTION: i32 = 0x10A3;

#[derive(Debug, Clone)]
struct StubRegister {
    name: String,
    unit: &'static str,
    core: i16,
    /// Raw content, most significant byte first (as it appears on the wire).
    value: [u8; 8],
    fvalue: Option<f64>,
}

#[derive(Debug, Clone)]
struct StubSymbol {
    name: String,
    path: String,
    address: u64,
    size: u64,
}

#[derive(Debug, Clone, Default)]
struct CommittedBreakpoint {
    access: String,
    address: u64,
    kind: u32,
    implementation: u32,
    action: u32,
    enable: u8,
}

#[derive(Debug, Clone)]
struct StubRegion {
    address: u64,
    length: usize,
    write: Option<Vec<u8>>,
    data: Vec<u8>,
    synced: bool,
}

#[derive(Debug, Clone)]
enum ObjectState {
    Address {
        access: String,
        value: u64,
    },
    Breakpoint {
        address: Option<(String, u64)>,
        kind: u32,
        implementation: u32,
        action: u32,
        enable: u8,
    },
    Symbol {
        name: String,
        path: String,
        address: u64,
        size: u64,
    },
    Register {
        name: String,
        core: u16,
    },
    Buffer {
        data: Vec<u8>,
    },
    Bundle {
        regions: Vec<StubRegion>,
    },
}

#[derive(Debug, Clone)]
struct CannedFnc {
    status: i32,
    type_code: u32,
    text: String,
}

/// Clonable handle to a simulated target. Clones share state, so a test can
/// hand one clone to `Debugger::connect` and keep another for inspection.
#[derive(Clone)]
pub struct StubDebugger {
    inner: Arc<Mutex<StubState>>,
}

impl Default for StubDebugger {
    fn default() -> Self {
        Self::new()
    }
}

impl StubDebugger {
    pub fn new() -> Self {
        StubDebugger {
            inner: Arc::new(Mutex::new(StubState::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- test scripting ----------------------------------------------------

    /// Refuse the next `n` attach attempts with a receive failure.
    pub fn refuse_attaches(&self, n: u32) {
        self.lock().attach_refusals = n;
    }

    /// Answer the next `n` register round trips with an empty payload.
    pub fn drop_register_replies(&self, n: u32) {
        self.lock().empty_register_replies = n;
    }

    /// Fail the next handle acquisition with `code`.
    pub fn fail_next_acquire(&self, code: i32) {
        self.lock().acquire_failure = Some(code);
    }

    pub fn set_eval(&self, expr: &str, numeric: u32, text: &str) {
        self.lock().set_eval(expr, numeric, text);
    }

    pub fn set_function(&self, expr: &str, type_code: u32, text: &str) {
        self.lock().set_function(expr, type_code, text);
    }

    pub fn fail_function(&self, expr: &str, status: i32, message: &str) {
        self.lock().fail_function(expr, status, message);
    }

    pub fn fail_command(&self, command: &str, status: i32, message: &str) {
        self.lock().fail_command(command, status, message);
    }

    /// Make each started script report busy for `n` polls before idling.
    pub fn set_script_busy_polls(&self, n: u32) {
        self.lock().script_busy_polls = n;
    }

    pub fn set_state(&self, state: i32) {
        self.lock().state = state;
    }

    pub fn set_message(&self, text: &str, kind: u16) {
        self.lock().message = (text.to_string(), kind);
    }

    pub fn add_symbol(&self, name: &str, path: &str, address: u64, size: u64) {
        self.lock().add_symbol(name, path, address, size);
    }

    // -- test inspection ---------------------------------------------------

    /// Remote object handles currently alive.
    pub fn live_objects(&self) -> usize {
        self.lock().objects.len()
    }

    /// Total remote calls issued so far.
    pub fn remote_calls(&self) -> u64 {
        self.lock().remote_calls
    }

    /// How many times the channel was rebound.
    pub fn rebinds(&self) -> u64 {
        self.lock().rebinds
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn committed_breakpoints(&self) -> usize {
        self.lock().breakpoints.len()
    }

    /// Simulated RAM content at an absolute target address.
    pub fn memory_at(&self, address: u64, length: usize) -> Option<Vec<u8>> {
        self.lock().memory_at(address, length).map(<[u8]>::to_vec)
    }

    /// Write simulated RAM directly, bypassing the protocol.
    pub fn poke_memory(&self, address: u64, data: &[u8]) {
        self.lock().poke_memory(address, data);
    }

    /// Integer content of a register, bypassing the protocol.
    pub fn register_ivalue(&self, name: &str, core: i16) -> Option<i64> {
        self.lock().register_ivalue(name, core)
    }
}

struct StubState {
    registers: Vec<StubRegister>,
    memory: Vec<u8>,
    symbols: Vec<StubSymbol>,
    breakpoints: Vec<CommittedBreakpoint>,
    macros: HashMap<String, String>,

    objects: HashMap<RawHandle, ObjectState>,
    next_handle: RawHandle,

    commands: Vec<String>,
    evals: HashMap<String, (u32, String)>,
    last_eval: (u32, String),
    functions: HashMap<String, CannedFnc>,
    failing_commands: HashMap<String, (i32, String)>,

    attach_refusals: u32,
    empty_register_replies: u32,
    acquire_failure: Option<i32>,
    script_polls_left: u32,
    script_busy_polls: u32,

    state: i32,
    message: (String, u16),
    remote_calls: u64,
    rebinds: u64,
}

impl StubState {
    /// A fresh two-core target with a standard register file and zeroed RAM.
    fn new() -> Self {
        let mut registers = Vec::new();
        for core in 0..2i16 {
            for i in 0..13 {
                registers.push(StubRegister {
                    name: format!("R{i}"),
                    unit: "CPU",
                    core,
                    value: [0; 8],
                    fvalue: None,
                });
            }
            for name in ["SP", "LR", "PC"] {
                registers.push(StubRegister {
                    name: name.to_string(),
                    unit: "CPU",
                    core,
                    value: [0; 8],
                    fvalue: None,
                });
            }
            for i in 0..2 {
                registers.push(StubRegister {
                    name: format!("F{i}"),
                    unit: "FPU",
                    core,
                    value: [0; 8],
                    fvalue: Some(0.0),
                });
            }
        }
        StubState {
            registers,
            memory: vec![0; MEMORY_SIZE],
            symbols: Vec::new(),
            breakpoints: Vec::new(),
            macros: HashMap::new(),
            objects: HashMap::new(),
            next_handle: 1,
            commands: Vec::new(),
            evals: HashMap::new(),
            last_eval: (0, String::new()),
            functions: HashMap::new(),
            failing_commands: HashMap::new(),
            attach_refusals: 0,
            empty_register_replies: 0,
            acquire_failure: None,
            script_polls_left: 0,
            script_busy_polls: 0,
            state: 2,
            message: (String::new(), 0),
            remote_calls: 0,
            rebinds: 0,
        }
    }

    fn set_eval(&mut self, expr: &str, numeric: u32, text: &str) {
        self.evals
            .insert(expr.to_string(), (numeric, text.to_string()));
    }

    fn set_function(&mut self, expr: &str, type_code: u32, text: &str) {
        self.functions.insert(
            expr.to_string(),
            CannedFnc {
                status: 0,
                type_code,
                text: text.to_string(),
            },
        );
    }

    fn fail_function(&mut self, expr: &str, status: i32, message: &str) {
        self.functions.insert(
            expr.to_string(),
            CannedFnc {
                status,
                type_code: 0,
                text: message.to_string(),
            },
        );
    }

    fn fail_command(&mut self, command: &str, status: i32, message: &str) {
        self.failing_commands
            .insert(command.to_string(), (status, message.to_string()));
    }

    fn add_symbol(&mut self, name: &str, path: &str, address: u64, size: u64) {
        self.symbols.push(StubSymbol {
            name: name.to_string(),
            path: path.to_string(),
            address,
            size,
        });
    }

    fn memory_at(&self, address: u64, length: usize) -> Option<&[u8]> {
        let offset = address.checked_sub(MEMORY_BASE)? as usize;
        self.memory.get(offset..offset + length)
    }

    fn poke_memory(&mut self, address: u64, data: &[u8]) {
        let offset = (address - MEMORY_BASE) as usize;
        self.memory[offset..offset + data.len()].copy_from_slice(data);
    }

    fn register_ivalue(&self, name: &str, core: i16) -> Option<i64> {
        self.registers
            .iter()
            .find(|r| r.name == name && r.core == core)
            .map(|r| i64::from_be_bytes(r.value))
    }

    // -- internals ---------------------------------------------------------

    fn tick(&mut self) {
        self.remote_calls += 1;
    }

    fn mem_range(&self, address: u64, length: usize) -> Result<std::ops::Range<usize>, i32> {
        let offset = address
            .checked_sub(MEMORY_BASE)
            .ok_or(NO_MEMORY)? as usize;
        if offset + length > self.memory.len() {
            return Err(NO_MEMORY);
        }
        Ok(offset..offset + length)
    }

    fn object(&self, handle: RawHandle) -> Result<&ObjectState, i32> {
        self.objects.get(&handle).ok_or(PARAM_ERROR)
    }

    fn object_mut(&mut self, handle: RawHandle) -> Result<&mut ObjectState, i32> {
        self.objects.get_mut(&handle).ok_or(PARAM_ERROR)
    }

    fn address_obj(&self, handle: RawHandle) -> Result<(String, u64), i32> {
        match self.object(handle)? {
            ObjectState::Address { access, value } => Ok((access.clone(), *value)),
            _ => Err(PARAM_ERROR),
        }
    }

    // The register object is bound by name and core; reads and writes go
    // straight through to the register file.
    fn register_binding(&self, handle: RawHandle) -> Result<(String, u16), i32> {
        match self.object(handle)? {
            ObjectState::Register { name, core } => Ok((name.clone(), *core)),
            _ => Err(PARAM_ERROR),
        }
    }

    fn exp_macro(&mut self, data: &[u8]) -> Result<Vec<u8>, i32> {
        let mut buf = data;
        if buf.remaining() < 4 {
            return Err(PARAM_ERROR);
        }
        let op = buf.get_u16_le();
        let name_len = buf.get_u16_le() as usize;
        if buf.remaining() < name_len {
            return Err(PARAM_ERROR);
        }
        let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
        buf.advance(name_len);
        match op {
            0 => {
                let value = self.macros.get(&name).cloned().unwrap_or_default();
                let mut reply = vec![0, 0];
                reply.extend_from_slice(value.as_bytes());
                Ok(reply)
            }
            1 => {
                if buf.remaining() < 2 {
                    return Err(PARAM_ERROR);
                }
                let value_len = buf.get_u16_le() as usize;
                if buf.remaining() < value_len {
                    return Err(PARAM_ERROR);
                }
                let value = String::from_utf8_lossy(&buf[..value_len]).into_owned();
                self.macros.insert(name, value);
                Ok(Vec::new())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn exp_register(&mut self, data: &[u8]) -> Result<Vec<u8>, i32> {
        if self.empty_register_replies > 0 {
            self.empty_register_replies -= 1;
            return Ok(Vec::new());
        }
        let mut buf = data;
        if buf.remaining() < 4 {
            return Err(PARAM_ERROR);
        }
        let mode = buf.get_u16_le();
        let write = mode & 0b1 != 0;
        let float_write = mode & 0b100000 != 0;
        let unit_ok = |unit: &str| -> bool {
            let bits = mode & 0b11100;
            if bits == 0 {
                return true;
            }
            match unit {
                "CPU" => bits & 0b100 != 0,
                "FPU" => bits & 0b1000 != 0,
                "VPU" => bits & 0b10000 != 0,
                _ => false,
            }
        };

        let mut selected: Vec<usize> = Vec::new();
        if data.len() == 4 && !write {
            // bare form: whole register set for one core (or all cores)
            let core = buf.get_u16_le();
            for (i, reg) in self.registers.iter().enumerate() {
                if unit_ok(reg.unit) && (core == 0xFFFF || reg.core == core as i16) {
                    selected.push(i);
                }
            }
        } else {
            let count = buf.get_u16_le() as usize;
            let mut entries: Vec<(String, Option<u16>, Option<[u8; 8]>)> = Vec::new();
            while buf.remaining() >= 2 && entries.len() <= count {
                let tag = [buf[0], buf[1]];
                buf.advance(2);
                match &tag {
                    t if t == tags::NAME => {
                        if buf.remaining() < 2 {
                            return Err(PARAM_ERROR);
                        }
                        let len = buf.get_u16_le() as usize;
                        if buf.remaining() < len {
                            return Err(PARAM_ERROR);
                        }
                        let raw = &buf[..len];
                        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                        let name = String::from_utf8_lossy(&raw[..end]).into_owned();
                        buf.advance(len);
                        entries.push((name, None, None));
                    }
                    t if t == tags::CORE => {
                        if buf.remaining() < 2 {
                            return Err(PARAM_ERROR);
                        }
                        let core = buf.get_u16_le();
                        if let Some(entry) = entries.last_mut() {
                            entry.1 = Some(core);
                        }
                    }
                    t if t == tags::VALUE => {
                        if buf.remaining() < 8 {
                            return Err(PARAM_ERROR);
                        }
                        let mut raw = [0u8; 8];
                        raw.copy_from_slice(&buf[..8]);
                        buf.advance(8);
                        if let Some(entry) = entries.last_mut() {
                            entry.2 = Some(raw);
                        }
                    }
                    _ => return Err(PARAM_ERROR),
                }
            }
            for (name, core, value) in &entries {
                for (i, reg) in self.registers.iter().enumerate() {
                    if reg.name != *name || !unit_ok(reg.unit) {
                        continue;
                    }
                    if core.is_some_and(|c| reg.core != c as i16) {
                        continue;
                    }
                    selected.push(i);
                }
                if write {
                    let Some(wire) = value else {
                        return Err(PARAM_ERROR);
                    };
                    for &i in selected.iter().rev() {
                        let reg = &mut self.registers[i];
                        if reg.name != *name {
                            break;
                        }
                        if float_write {
                            reg.fvalue = Some(f64::from_le_bytes(*wire));
                        } else {
                            reg.value = u64::from_le_bytes(*wire).to_be_bytes();
                        }
                    }
                }
            }
        }
        Ok(self.register_reply(&selected))
    }

    fn register_reply(&self, indices: &[usize]) -> Vec<u8> {
        let mut out = Vec::new();
        for &i in indices {
            let reg = &self.registers[i];
            let mut padded = reg.name.len() + 1;
            if padded & 1 != 0 {
                padded += 1;
            }
            out.extend_from_slice(tags::NAME);
            out.extend_from_slice(&(padded as u16).to_le_bytes());
            out.extend_from_slice(reg.name.as_bytes());
            out.extend(std::iter::repeat(0u8).take(padded - reg.name.len()));

            out.extend_from_slice(tags::TYPE);
            out.extend_from_slice(&reg.unit.as_bytes()[..3]);
            out.push(0);

            out.extend_from_slice(tags::VALUE);
            out.extend_from_slice(&reg.value);

            if reg.unit == "FPU" {
                out.extend_from_slice(tags::FLOAT_VALUE);
                out.extend_from_slice(&reg.fvalue.unwrap_or(0.0).to_be_bytes());
            }

            out.extend_from_slice(tags::CORE);
            out.extend_from_slice(&reg.core.to_be_bytes());

            out.extend_from_slice(tags::END_OF_RECORD);
            out.extend_from_slice(&[0, 0]);
        }
        out
    }
}

impl Transport for StubState {
    fn config(&mut self, _key: &str, _value: &str) -> Status {
        self.tick();
        Ok(())
    }

    fn init(&mut self) -> Status {
        self.tick();
        Ok(())
    }

    fn attach(&mut self, _device: Device) -> Status {
        self.tick();
        if self.attach_refusals > 0 {
            self.attach_refusals -= 1;
            return Err(-1);
        }
        Ok(())
    }

    fn exit(&mut self) -> Status {
        self.tick();
        Ok(())
    }

    fn ping(&mut self) -> Status {
        self.tick();
        Ok(())
    }

    fn stop(&mut self) -> Status {
        self.tick();
        Ok(())
    }

    fn channel_defaults(&mut self) -> ChannelToken {
        ChannelToken::new(vec![0; 16])
    }

    fn set_channel(&mut self, _token: &ChannelToken) {
        self.rebinds += 1;
    }

    fn execute_command(
        &mut self,
        command: &str,
        _capacity: usize,
    ) -> Result<String, (i32, String)> {
        self.tick();
        self.commands.push(command.to_string());
        if let Some((code, message)) = self.failing_commands.get(command) {
            return Err((*code, message.clone()));
        }
        if let Some(expr) = command.strip_prefix("EVAL ") {
            self.last_eval = self.evals.get(expr).cloned().unwrap_or_default();
        }
        if command.strip_prefix("DO ").is_some() {
            self.script_polls_left = self.script_busy_polls;
        }
        Ok(String::new())
    }

    fn execute_function(
        &mut self,
        expr: &str,
        _capacity: usize,
    ) -> Result<(u32, String), (i32, String)> {
        self.tick();
        match self.functions.get(expr) {
            Some(canned) if canned.status != 0 => Err((canned.status, canned.text.clone())),
            Some(canned) => Ok((canned.type_code, canned.text.clone())),
            None => Ok((0x8000, String::new())),
        }
    }

    fn eval_get(&mut self) -> Result<u32, i32> {
        self.tick();
        Ok(self.last_eval.0)
    }

    fn eval_get_string(&mut self) -> Result<String, i32> {
        self.tick();
        Ok(self.last_eval.1.clone())
    }

    fn get_state(&mut self) -> Result<i32, i32> {
        self.tick();
        Ok(self.state)
    }

    fn get_message(&mut self) -> Result<(String, u16), i32> {
        self.tick();
        Ok(self.message.clone())
    }

    fn script_state(&mut self) -> Result<i32, i32> {
        self.tick();
        if self.script_polls_left > 0 {
            self.script_polls_left -= 1;
            Ok(1)
        } else {
            Ok(0)
        }
    }

    fn request_obj(&mut self, kind: HandleKind) -> Result<RawHandle, i32> {
        self.tick();
        if let Some(code) = self.acquire_failure.take() {
            return Err(code);
        }
        let state = match kind {
            HandleKind::Address => ObjectState::Address {
                access: String::new(),
                value: 0,
            },
            HandleKind::Breakpoint => ObjectState::Breakpoint {
                address: None,
                kind: 0,
                implementation: 0,
                action: 0,
                enable: 1,
            },
            HandleKind::Symbol => ObjectState::Symbol {
                name: String::new(),
                path: String::new(),
                address: 0,
                size: 0,
            },
            HandleKind::Register(_) => ObjectState::Register {
                name: String::new(),
                core: 0,
            },
            HandleKind::Buffer(size) => ObjectState::Buffer {
                data: vec![0; size],
            },
            HandleKind::MemoryBundle(_) => ObjectState::Bundle {
                regions: Vec::new(),
            },
        };
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, state);
        Ok(handle)
    }

    fn release_obj(&mut self, _kind: HandleKind, handle: RawHandle) -> Status {
        self.tick();
        self.objects.remove(&handle).map(|_| ()).ok_or(PARAM_ERROR)
    }

    fn set_address_value(&mut self, handle: RawHandle, new: u64) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Address { value, .. } => {
                *value = new;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_address_value(&mut self, handle: RawHandle) -> Result<u64, i32> {
        self.tick();
        Ok(self.address_obj(handle)?.1)
    }

    fn set_address_access(&mut self, handle: RawHandle, new: &str) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Address { access, .. } => {
                *access = new.to_string();
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_address_access(&mut self, handle: RawHandle) -> Result<String, i32> {
        self.tick();
        Ok(self.address_obj(handle)?.0)
    }

    fn set_breakpoint_address(&mut self, handle: RawHandle, address: RawHandle) -> Status {
        self.tick();
        let addr = self.address_obj(address)?;
        match self.object_mut(handle)? {
            ObjectState::Breakpoint { address, .. } => {
                *address = Some(addr);
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_breakpoint_address(&mut self, handle: RawHandle, address: RawHandle) -> Status {
        self.tick();
        let (bp_access, bp_value) = match self.object(handle)? {
            ObjectState::Breakpoint { address, .. } => {
                address.clone().ok_or(BP_BAD_ADDRESS)?
            }
            _ => return Err(PARAM_ERROR),
        };
        match self.object_mut(address)? {
            ObjectState::Address { access, value } => {
                *access = bp_access;
                *value = bp_value;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn set_breakpoint_kind(&mut self, handle: RawHandle, new: u32) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Breakpoint { kind, .. } => {
                *kind = new;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_breakpoint_kind(&mut self, handle: RawHandle) -> Result<u32, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Breakpoint { kind, .. } => Ok(*kind),
            _ => Err(PARAM_ERROR),
        }
    }

    fn set_breakpoint_impl(&mut self, handle: RawHandle, new: u32) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Breakpoint { implementation, .. } => {
                *implementation = new;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_breakpoint_impl(&mut self, handle: RawHandle) -> Result<u32, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Breakpoint { implementation, .. } => Ok(*implementation),
            _ => Err(PARAM_ERROR),
        }
    }

    fn set_breakpoint_action(&mut self, handle: RawHandle, new: u32) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Breakpoint { action, .. } => {
                *action = new;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_breakpoint_action(&mut self, handle: RawHandle) -> Result<u32, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Breakpoint { action, .. } => Ok(*action),
            _ => Err(PARAM_ERROR),
        }
    }

    fn set_breakpoint_enable(&mut self, handle: RawHandle, new: u8) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Breakpoint { enable, .. } => {
                *enable = new;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_breakpoint_enable(&mut self, handle: RawHandle) -> Result<u8, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Breakpoint { enable, .. } => Ok(*enable),
            _ => Err(PARAM_ERROR),
        }
    }

    fn write_breakpoint_obj(&mut self, handle: RawHandle, mode: i32) -> Status {
        self.tick();
        let bp = match self.object(handle)? {
            ObjectState::Breakpoint {
                address,
                kind,
                implementation,
                action,
                enable,
            } => {
                let (access, addr) = address.clone().ok_or(BP_BAD_ADDRESS)?;
                if *action > 0x7F {
                    return Err(BP_BAD_ACTION);
                }
                CommittedBreakpoint {
                    access,
                    address: addr,
                    kind: *kind,
                    implementation: *implementation,
                    action: *action,
                    enable: *enable,
                }
            }
            _ => return Err(PARAM_ERROR),
        };
        match mode {
            1 => {
                if let Some(existing) = self
                    .breakpoints
                    .iter_mut()
                    .find(|b| b.address == bp.address)
                {
                    *existing = bp;
                } else {
                    self.breakpoints.push(bp);
                }
                Ok(())
            }
            0 => {
                self.breakpoints.retain(|b| b.address != bp.address);
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn query_breakpoint_obj_count(&mut self) -> Result<u32, i32> {
        self.tick();
        Ok(self.breakpoints.len() as u32)
    }

    fn read_breakpoint_obj_by_index(&mut self, handle: RawHandle, index: u32) -> Status {
        self.tick();
        let bp = self
            .breakpoints
            .get(index as usize)
            .cloned()
            .ok_or(BP_NOT_FOUND)?;
        match self.object_mut(handle)? {
            ObjectState::Breakpoint {
                address,
                kind,
                implementation,
                action,
                enable,
            } => {
                *address = Some((bp.access, bp.address));
                *kind = bp.kind;
                *implementation = bp.implementation;
                *action = bp.action;
                *enable = bp.enable;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn set_symbol_name(&mut self, handle: RawHandle, new: &str) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Symbol { name, .. } => {
                *name = new.to_string();
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_symbol_name(&mut self, handle: RawHandle) -> Result<String, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Symbol { name, .. } => Ok(name.clone()),
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_symbol_path(&mut self, handle: RawHandle) -> Result<String, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Symbol { path, .. } => Ok(path.clone()),
            _ => Err(PARAM_ERROR),
        }
    }

    fn set_symbol_address(&mut self, handle: RawHandle, address: RawHandle) -> Status {
        self.tick();
        let (_, value) = self.address_obj(address)?;
        match self.object_mut(handle)? {
            ObjectState::Symbol { address, .. } => {
                *address = value;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_symbol_address(&mut self, handle: RawHandle, address: RawHandle) -> Status {
        self.tick();
        let value = match self.object(handle)? {
            ObjectState::Symbol { address, .. } => *address,
            _ => return Err(PARAM_ERROR),
        };
        match self.object_mut(address)? {
            ObjectState::Address {
                value: addr_value, ..
            } => {
                *addr_value = value;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_symbol_size(&mut self, handle: RawHandle) -> Result<u64, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Symbol { size, .. } => Ok(*size),
            _ => Err(PARAM_ERROR),
        }
    }

    fn query_symbol_obj(&mut self, handle: RawHandle) -> Status {
        self.tick();
        let (query_name, query_address) = match self.object(handle)? {
            ObjectState::Symbol { name, address, .. } => (name.clone(), *address),
            _ => return Err(PARAM_ERROR),
        };
        let found = self
            .symbols
            .iter()
            .find(|s| {
                if query_name.is_empty() {
                    query_address >= s.address && query_address < s.address + s.size.max(1)
                } else {
                    s.name == query_name
                }
            })
            .cloned();
        match self.object_mut(handle)? {
            ObjectState::Symbol {
                name,
                path,
                address,
                size,
            } => {
                match found {
                    Some(sym) => {
                        *name = sym.name;
                        *path = sym.path;
                        *address = sym.address;
                        *size = sym.size;
                    }
                    None => *size = u64::MAX,
                }
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn set_register_name(&mut self, handle: RawHandle, new: &str) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Register { name, .. } => {
                *name = new.to_string();
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn set_register_core(&mut self, handle: RawHandle, new: u16) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Register { core, .. } => {
                *core = new;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn get_register_value64(&mut self, handle: RawHandle) -> Result<u64, i32> {
        self.tick();
        let (name, core) = self.register_binding(handle)?;
        self.registers
            .iter()
            .find(|r| r.name == name && r.core == core as i16)
            .map(|r| u64::from_be_bytes(r.value))
            .ok_or(REG_NOT_FOUND)
    }

    fn set_register_value64(&mut self, handle: RawHandle, new: u64) -> Status {
        self.tick();
        let (name, core) = self.register_binding(handle)?;
        let reg = self
            .registers
            .iter_mut()
            .find(|r| r.name == name && r.core == core as i16)
            .ok_or(REG_NOT_FOUND)?;
        reg.value = new.to_be_bytes();
        reg.fvalue = None;
        Ok(())
    }

    fn copy_data_to_buffer(&mut self, handle: RawHandle, new: &[u8]) -> Status {
        self.tick();
        match self.object_mut(handle)? {
            ObjectState::Buffer { data } => {
                data.clear();
                data.extend_from_slice(new);
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn copy_data_from_buffer(&mut self, handle: RawHandle, length: usize) -> Result<Vec<u8>, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Buffer { data } => {
                data.get(..length).map(<[u8]>::to_vec).ok_or(PARAM_ERROR)
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn read_memory_obj(&mut self, buffer: RawHandle, address: RawHandle, length: usize) -> Status {
        self.tick();
        let (_, addr) = self.address_obj(address)?;
        let range = self.mem_range(addr, length)?;
        let bytes = self.memory[range].to_vec();
        match self.object_mut(buffer)? {
            ObjectState::Buffer { data } => {
                *data = bytes;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn write_memory_obj(&mut self, buffer: RawHandle, address: RawHandle, length: usize) -> Status {
        self.tick();
        let (_, addr) = self.address_obj(address)?;
        let bytes = match self.object(buffer)? {
            ObjectState::Buffer { data } => {
                data.get(..length).map(<[u8]>::to_vec).ok_or(PARAM_ERROR)?
            }
            _ => return Err(PARAM_ERROR),
        };
        let range = self.mem_range(addr, length)?;
        self.memory[range].copy_from_slice(&bytes);
        Ok(())
    }

    fn bundle_add_read(&mut self, handle: RawHandle, address: RawHandle, length: u32) -> Status {
        self.tick();
        let (_, addr) = self.address_obj(address)?;
        match self.object_mut(handle)? {
            ObjectState::Bundle { regions } => {
                regions.push(StubRegion {
                    address: addr,
                    length: length as usize,
                    write: None,
                    data: Vec::new(),
                    synced: false,
                });
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn bundle_add_write(&mut self, handle: RawHandle, address: RawHandle, data: &[u8]) -> Status {
        self.tick();
        let (_, addr) = self.address_obj(address)?;
        match self.object_mut(handle)? {
            ObjectState::Bundle { regions } => {
                regions.push(StubRegion {
                    address: addr,
                    length: data.len(),
                    write: Some(data.to_vec()),
                    data: Vec::new(),
                    synced: false,
                });
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn transfer_bundle_obj(&mut self, handle: RawHandle) -> Status {
        self.tick();
        let mut regions = match self.object_mut(handle)? {
            ObjectState::Bundle { regions } => std::mem::take(regions),
            _ => return Err(PARAM_ERROR),
        };
        for region in &mut regions {
            match self.mem_range(region.address, region.length) {
                Ok(range) => {
                    match &region.write {
                        Some(data) => self.memory[range].copy_from_slice(data),
                        None => region.data = self.memory[range].to_vec(),
                    }
                    region.synced = true;
                }
                Err(_) => region.synced = false,
            }
        }
        match self.object_mut(handle)? {
            ObjectState::Bundle { regions: slot } => {
                *slot = regions;
                Ok(())
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn bundle_sync_ok(&mut self, handle: RawHandle, index: usize) -> Result<bool, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Bundle { regions } => {
                regions.get(index).map(|r| r.synced).ok_or(PARAM_ERROR)
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn bundle_data_by_index(
        &mut self,
        handle: RawHandle,
        index: usize,
        length: usize,
    ) -> Result<Vec<u8>, i32> {
        self.tick();
        match self.object(handle)? {
            ObjectState::Bundle { regions } => {
                let region = regions.get(index).ok_or(PARAM_ERROR)?;
                region.data.get(..length).map(<[u8]>::to_vec).ok_or(PARAM_ERROR)
            }
            _ => Err(PARAM_ERROR),
        }
    }

    fn exp(&mut self, cmd: u16, data: &[u8]) -> Result<Vec<u8>, i32> {
        self.tick();
        match cmd {
            subfunction::MACRO => self.exp_macro(data),
            subfunction::REGISTER => self.exp_register(data),
            _ => Err(PARAM_ERROR),
        }
    }

    fn check_state_notify(&mut self, _param: u32) -> Status {
        self.tick();
        Ok(())
    }
}

impl Transport for StubDebugger {
    fn config(&mut self, key: &str, value: &str) -> Status {
        self.lock().config(key, value)
    }

    fn init(&mut self) -> Status {
        self.lock().init()
    }

    fn attach(&mut self, device: Device) -> Status {
        self.lock().attach(device)
    }

    fn exit(&mut self) -> Status {
        self.lock().exit()
    }

    fn ping(&mut self) -> Status {
        self.lock().ping()
    }

    fn stop(&mut self) -> Status {
        self.lock().stop()
    }

    fn channel_defaults(&mut self) -> ChannelToken {
        self.lock().channel_defaults()
    }

    fn set_channel(&mut self, token: &ChannelToken) {
        self.lock().set_channel(token)
    }

    fn execute_command(
        &mut self,
        command: &str,
        capacity: usize,
    ) -> Result<String, (i32, String)> {
        self.lock().execute_command(command, capacity)
    }

    fn execute_function(
        &mut self,
        expr: &str,
        capacity: usize,
    ) -> Result<(u32, String), (i32, String)> {
        self.lock().execute_function(expr, capacity)
    }

    fn eval_get(&mut self) -> Result<u32, i32> {
        self.lock().eval_get()
    }

    fn eval_get_string(&mut self) -> Result<String, i32> {
        self.lock().eval_get_string()
    }

    fn get_state(&mut self) -> Result<i32, i32> {
        self.lock().get_state()
    }

    fn get_message(&mut self) -> Result<(String, u16), i32> {
        self.lock().get_message()
    }

    fn script_state(&mut self) -> Result<i32, i32> {
        self.lock().script_state()
    }

    fn request_obj(&mut self, kind: HandleKind) -> Result<RawHandle, i32> {
        self.lock().request_obj(kind)
    }

    fn release_obj(&mut self, kind: HandleKind, handle: RawHandle) -> Status {
        self.lock().release_obj(kind, handle)
    }

    fn set_address_value(&mut self, handle: RawHandle, value: u64) -> Status {
        self.lock().set_address_value(handle, value)
    }

    fn get_address_value(&mut self, handle: RawHandle) -> Result<u64, i32> {
        self.lock().get_address_value(handle)
    }

    fn set_address_access(&mut self, handle: RawHandle, access: &str) -> Status {
        self.lock().set_address_access(handle, access)
    }

    fn get_address_access(&mut self, handle: RawHandle) -> Result<String, i32> {
        self.lock().get_address_access(handle)
    }

    fn set_breakpoint_address(&mut self, handle: RawHandle, address: RawHandle) -> Status {
        self.lock().set_breakpoint_address(handle, address)
    }

    fn get_breakpoint_address(&mut self, handle: RawHandle, address: RawHandle) -> Status {
        self.lock().get_breakpoint_address(handle, address)
    }

    fn set_breakpoint_kind(&mut self, handle: RawHandle, kind: u32) -> Status {
        self.lock().set_breakpoint_kind(handle, kind)
    }

    fn get_breakpoint_kind(&mut self, handle: RawHandle) -> Result<u32, i32> {
        self.lock().get_breakpoint_kind(handle)
    }

    fn set_breakpoint_impl(&mut self, handle: RawHandle, implementation: u32) -> Status {
        self.lock().set_breakpoint_impl(handle, implementation)
    }

    fn get_breakpoint_impl(&mut self, handle: RawHandle) -> Result<u32, i32> {
        self.lock().get_breakpoint_impl(handle)
    }

    fn set_breakpoint_action(&mut self, handle: RawHandle, action: u32) -> Status {
        self.lock().set_breakpoint_action(handle, action)
    }

    fn get_breakpoint_action(&mut self, handle: RawHandle) -> Result<u32, i32> {
        self.lock().get_breakpoint_action(handle)
    }

    fn set_breakpoint_enable(&mut self, handle: RawHandle, enable: u8) -> Status {
        self.lock().set_breakpoint_enable(handle, enable)
    }

    fn get_breakpoint_enable(&mut self, handle: RawHandle) -> Result<u8, i32> {
        self.lock().get_breakpoint_enable(handle)
    }

    fn write_breakpoint_obj(&mut self, handle: RawHandle, mode: i32) -> Status {
        self.lock().write_breakpoint_obj(handle, mode)
    }

    fn query_breakpoint_obj_count(&mut self) -> Result<u32, i32> {
        self.lock().query_breakpoint_obj_count()
    }

    fn read_breakpoint_obj_by_index(&mut self, handle: RawHandle, index: u32) -> Status {
        self.lock().read_breakpoint_obj_by_index(handle, index)
    }

    fn set_symbol_name(&mut self, handle: RawHandle, name: &str) -> Status {
        self.lock().set_symbol_name(handle, name)
    }

    fn get_symbol_name(&mut self, handle: RawHandle) -> Result<String, i32> {
        self.lock().get_symbol_name(handle)
    }

    fn get_symbol_path(&mut self, handle: RawHandle) -> Result<String, i32> {
        self.lock().get_symbol_path(handle)
    }

    fn set_symbol_address(&mut self, handle: RawHandle, address: RawHandle) -> Status {
        self.lock().set_symbol_address(handle, address)
    }

    fn get_symbol_address(&mut self, handle: RawHandle, address: RawHandle) -> Status {
        self.lock().get_symbol_address(handle, address)
    }

    fn get_symbol_size(&mut self, handle: RawHandle) -> Result<u64, i32> {
        self.lock().get_symbol_size(handle)
    }

    fn query_symbol_obj(&mut self, handle: RawHandle) -> Status {
        self.lock().query_symbol_obj(handle)
    }

    fn set_register_name(&mut self, handle: RawHandle, name: &str) -> Status {
        self.lock().set_register_name(handle, name)
    }

    fn set_register_core(&mut self, handle: RawHandle, core: u16) -> Status {
        self.lock().set_register_core(handle, core)
    }

    fn get_register_value64(&mut self, handle: RawHandle) -> Result<u64, i32> {
        self.lock().get_register_value64(handle)
    }

    fn set_register_value64(&mut self, handle: RawHandle, value: u64) -> Status {
        self.lock().set_register_value64(handle, value)
    }

    fn copy_data_to_buffer(&mut self, handle: RawHandle, data: &[u8]) -> Status {
        self.lock().copy_data_to_buffer(handle, data)
    }

    fn copy_data_from_buffer(&mut self, handle: RawHandle, length: usize) -> Result<Vec<u8>, i32> {
        self.lock().copy_data_from_buffer(handle, length)
    }

    fn read_memory_obj(&mut self, buffer: RawHandle, address: RawHandle, length: usize) -> Status {
        self.lock().read_memory_obj(buffer, address, length)
    }

    fn write_memory_obj(&mut self, buffer: RawHandle, address: RawHandle, length: usize) -> Status {
        self.lock().write_memory_obj(buffer, address, length)
    }

    fn bundle_add_read(&mut self, handle: RawHandle, address: RawHandle, length: u32) -> Status {
        self.lock().bundle_add_read(handle, address, length)
    }

    fn bundle_add_write(&mut self, handle: RawHandle, address: RawHandle, data: &[u8]) -> Status {
        self.lock().bundle_add_write(handle, address, data)
    }

    fn transfer_bundle_obj(&mut self, handle: RawHandle) -> Status {
        self.lock().transfer_bundle_obj(handle)
    }

    fn bundle_sync_ok(&mut self, handle: RawHandle, index: usize) -> Result<bool, i32> {
        self.lock().bundle_sync_ok(handle, index)
    }

    fn bundle_data_by_index(
        &mut self,
        handle: RawHandle,
        index: usize,
        length: usize,
    ) -> Result<Vec<u8>, i32> {
        self.lock().bundle_data_by_index(handle, index, length)
    }

    fn exp(&mut self, cmd: u16, data: &[u8]) -> Result<Vec<u8>, i32> {
        self.lock().exp(cmd, data)
    }

    fn check_state_notify(&mut self, param: u32) -> Status {
        self.lock().check_state_notify(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_register_file() {
        let stub = StubDebugger::new();
        assert_eq!(stub.register_ivalue("R0", 0), Some(0));
        assert_eq!(stub.register_ivalue("PC", 1), Some(0));
        assert_eq!(stub.register_ivalue("R99", 0), None);
    }

    #[test]
    fn test_handle_lifecycle() {
        let mut stub = StubDebugger::new();
        let h = stub.request_obj(HandleKind::Address).unwrap();
        assert_eq!(stub.live_objects(), 1);
        stub.release_obj(HandleKind::Address, h).unwrap();
        assert_eq!(stub.live_objects(), 0);
        assert!(stub.release_obj(HandleKind::Address, h).is_err());
    }

    #[test]
    fn test_memory_bounds() {
        let state = StubState::new();
        assert!(state.mem_range(MEMORY_BASE, 16).is_ok());
        assert!(state.mem_range(MEMORY_BASE - 1, 1).is_err());
        assert!(state.mem_range(MEMORY_BASE + MEMORY_SIZE as u64, 1).is_err());
    }

    #[test]
    fn test_macro_round_trip_over_exp() {
        let mut stub = StubDebugger::new();
        let mut set = Vec::new();
        set.extend_from_slice(&1u16.to_le_bytes());
        set.extend_from_slice(&4u16.to_le_bytes());
        set.extend_from_slice(b"NAME");
        set.extend_from_slice(&5u16.to_le_bytes());
        set.extend_from_slice(b"value");
        stub.exp(subfunction::MACRO, &set).unwrap();

        let mut get = Vec::new();
        get.extend_from_slice(&0u16.to_le_bytes());
        get.extend_from_slice(&4u16.to_le_bytes());
        get.extend_from_slice(b"NAME");
        let reply = stub.exp(subfunction::MACRO, &get).unwrap();
        assert_eq!(&reply[2..], b"value");
    }
}
