// Walk through a full session against the in-memory stub target.

use rcl_client::breakpoint::{Action, Breakpoint, Kind};
use rcl_client::stub::MEMORY_BASE;
use rcl_client::{Address, ConnectOptions, Debugger, RegisterValue, StubDebugger};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("rcl_client=debug")
        .init();

    let stub = StubDebugger::new();
    stub.add_symbol("main", "/src/main.c", MEMORY_BASE + 0x200, 0x40);

    let debugger = Debugger::connect(Box::new(stub.clone()), &ConnectOptions::default())?;
    println!("connected, target state: {}", debugger.state()?);

    debugger.register_write("PC", RegisterValue::Int(0x8000), Some(0), None)?;
    let pc = &debugger.register_read("PC", Some(0), None)?[0];
    println!("PC on core 0: {:#x}", pc.ivalue().unwrap_or(0));

    let addr = Address::new(MEMORY_BASE + 0x40);
    debugger.memory_write_u32(&addr, 0xCAFE_F00D)?;
    println!("memory at {addr}: {:#010x}", debugger.memory_read_u32(&addr)?);

    let sym = debugger.symbol_query_by_name("main")?.expect("symbol");
    println!("{} is at {} ({} bytes)", sym.name, sym.address, sym.size);

    let mut bp = Breakpoint::at(sym.address.clone());
    bp.kind = Some(Kind::Program);
    bp.action = Some(Action::STOP);
    debugger.breakpoint_set(&bp)?;
    println!("breakpoints set: {}", debugger.breakpoint_list()?.len());

    debugger.breakpoint_delete(&bp)?;
    debugger.disconnect()?;
    println!("done, leaked handles: {}", stub.live_objects());
    Ok(())
}
