// rcl-client: remote control client for in-circuit debuggers
//
// The crate speaks the remote API of a debugger front end: a synchronous
// request/response protocol carried over a native transport library, with
// typed remote objects for addresses, breakpoints, symbols, registers, and
// memory. `Debugger` is the session entry point; the transport behind it is
// pluggable, and `StubDebugger` provides an in-memory target for tests.

pub mod address;
pub mod breakpoint;
pub mod channel;
pub mod codec;
pub mod debugger;
pub mod error;
pub mod handle;
pub mod memory;
pub mod records;
pub mod register;
pub mod stub;
pub mod symbol;
pub mod transport;

pub use address::Address;
pub use breakpoint::Breakpoint;
pub use codec::FncValue;
pub use debugger::{ConnectOptions, Debugger, Message, StatePoller};
pub use error::{status_name, Error, Result};
pub use memory::MemoryBundle;
pub use register::{Register, RegisterUnit, RegisterValue};
pub use stub::StubDebugger;
pub use symbol::Symbol;
pub use transport::{Device, Transport};
