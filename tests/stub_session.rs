// End-to-end session tests against the in-memory stub target.

use std::time::Duration;

use rcl_client::breakpoint::{Action, Breakpoint, Implementation, Kind};
use rcl_client::codec::result_types;
use rcl_client::stub::MEMORY_BASE;
use rcl_client::{
    Address, ConnectOptions, Debugger, Error, FncValue, MemoryBundle, RegisterUnit, RegisterValue,
    StubDebugger,
};

fn session() -> (StubDebugger, Debugger) {
    let stub = StubDebugger::new();
    let debugger = Debugger::connect(Box::new(stub.clone()), &ConnectOptions::default())
        .expect("stub connect");
    (stub, debugger)
}

#[test]
fn connect_retries_until_remote_is_ready() {
    let stub = StubDebugger::new();
    stub.refuse_attaches(2);
    let options = ConnectOptions {
        timeout: Some(Duration::from_secs(5)),
        ..ConnectOptions::default()
    };
    let debugger = Debugger::connect(Box::new(stub.clone()), &options).expect("eventual attach");
    debugger.ping().unwrap();
    // the session handle stays printable for test diagnostics
    assert!(format!("{debugger:?}").starts_with("Debugger"));
}

#[test]
fn connect_gives_up_after_timeout() {
    let stub = StubDebugger::new();
    stub.refuse_attaches(u32::MAX);
    let options = ConnectOptions {
        timeout: Some(Duration::ZERO),
        ..ConnectOptions::default()
    };
    match Debugger::connect(Box::new(stub), &options) {
        Err(Error::Timeout { .. }) => {}
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn register_write_then_read_round_trip() {
    let (stub, debugger) = session();
    debugger
        .register_write("R0", RegisterValue::Int(0x1234), Some(0), None)
        .unwrap();
    assert_eq!(stub.register_ivalue("R0", 0), Some(0x1234));
    // the other core is untouched
    assert_eq!(stub.register_ivalue("R0", 1), Some(0));

    let regs = debugger.register_read("R0", Some(0), None).unwrap();
    assert_eq!(regs.len(), 1);
    assert_eq!(regs[0].ivalue(), Some(0x1234));
    assert_eq!(regs[0].core, Some(0));
}

#[test]
fn register_write_without_core_hits_every_core() {
    let (stub, debugger) = session();
    debugger
        .register_write_by_names(&["PC"], RegisterValue::Int(0x8000), None, None)
        .unwrap();
    assert_eq!(stub.register_ivalue("PC", 0), Some(0x8000));
    assert_eq!(stub.register_ivalue("PC", 1), Some(0x8000));
}

#[test]
fn float_register_write_reads_back_as_float() {
    let (_stub, debugger) = session();
    let reg = debugger
        .register_write("F0", RegisterValue::Float(2.5), Some(0), Some(RegisterUnit::Fpu))
        .unwrap();
    assert_eq!(reg.fvalue(), Some(2.5));
    assert_eq!(reg.unit.as_deref(), Some("FPU"));
}

#[test]
fn register_read_all_filters_by_core_and_unit() {
    let (_stub, debugger) = session();
    let all = debugger.register_read_all(None, None).unwrap();
    // 16 CPU + 2 FPU registers per core, two cores
    assert_eq!(all.len(), 36);
    let core0 = debugger.register_read_all(Some(0), None).unwrap();
    assert_eq!(core0.len(), 18);
    let fpu = debugger
        .register_read_all(None, Some(RegisterUnit::Fpu))
        .unwrap();
    assert_eq!(fpu.len(), 4);
    assert!(fpu.iter().all(|r| r.unit.as_deref() == Some("FPU")));
}

#[test]
fn register_object_reads_and_writes_one_register() {
    let (stub, debugger) = session();
    debugger.register_set_value64("SP", 1, 0x2000_1000).unwrap();
    assert_eq!(stub.register_ivalue("SP", 1), Some(0x2000_1000));
    assert_eq!(debugger.register_value64("SP", 1).unwrap(), 0x2000_1000);
    // the other core is untouched
    assert_eq!(debugger.register_value64("SP", 0).unwrap(), 0);
    match debugger.register_value64("NOPE", 0) {
        Err(Error::RegisterNotFound) => {}
        other => panic!("expected missing register, got {other:?}"),
    }
    assert_eq!(stub.live_objects(), 0);
}

#[test]
fn empty_reply_is_retried_once() {
    let (stub, debugger) = session();
    stub.drop_register_replies(1);
    let regs = debugger.register_read_all(Some(0), None).unwrap();
    assert_eq!(regs.len(), 18);
}

#[test]
fn single_register_read_does_not_retry() {
    let (stub, debugger) = session();
    stub.drop_register_replies(1);
    let regs = debugger.register_read("R0", Some(0), None).unwrap();
    assert!(regs.is_empty());
}

#[test]
fn no_handles_leak_across_operations() {
    let (stub, debugger) = session();
    debugger.memory_write(&Address::new(MEMORY_BASE), &[1, 2, 3, 4]).unwrap();
    debugger.memory_read(&Address::new(MEMORY_BASE), 4).unwrap();
    debugger
        .breakpoint_set(&Breakpoint::at(Address::new(MEMORY_BASE + 0x100)))
        .unwrap();
    debugger.breakpoint_list().unwrap();
    debugger.symbol_query_by_name("missing").unwrap();
    assert_eq!(stub.live_objects(), 0);
}

#[test]
fn handles_are_released_on_error_paths() {
    let (stub, debugger) = session();
    // memory read outside the mapped window fails mid-operation
    let err = debugger
        .memory_read(&Address::new(0x1000), 4)
        .unwrap_err();
    match err {
        Error::Api { code: 22 } => {}
        other => panic!("expected no-memory error, got {other:?}"),
    }
    assert_eq!(stub.live_objects(), 0);
}

#[test]
fn handle_allocation_failure_is_typed() {
    let (stub, debugger) = session();
    stub.fail_next_acquire(-6);
    match debugger.memory_read(&Address::new(MEMORY_BASE), 4) {
        Err(Error::HandleAllocation { code: -6, .. }) => {}
        other => panic!("expected allocation failure, got {other:?}"),
    }
    assert_eq!(stub.live_objects(), 0);
}

#[test]
fn memory_round_trip_and_scalars() {
    let (stub, debugger) = session();
    let addr = Address::new(MEMORY_BASE + 0x40);
    debugger.memory_write(&addr, b"\xDE\xAD\xBE\xEF").unwrap();
    assert_eq!(debugger.memory_read(&addr, 4).unwrap(), b"\xDE\xAD\xBE\xEF");
    assert_eq!(stub.memory_at(MEMORY_BASE + 0x40, 4).unwrap(), b"\xDE\xAD\xBE\xEF");

    debugger.memory_write_u32(&addr, 0x11223344).unwrap();
    assert_eq!(debugger.memory_read_u32(&addr).unwrap(), 0x11223344);
    debugger.memory_write_f64(&addr, 6.25).unwrap();
    assert_eq!(debugger.memory_read_f64(&addr).unwrap(), 6.25);
}

#[test]
fn bundle_transfer_mixes_reads_and_writes() {
    let (stub, debugger) = session();
    stub.poke_memory(MEMORY_BASE, &[7; 8]);

    let mut bundle = MemoryBundle::new();
    bundle.add_read(Address::new(MEMORY_BASE), 8);
    bundle.add_write(Address::new(MEMORY_BASE + 0x10), vec![9; 4]);
    // outside the mapped window: must not sync, must not fail the batch
    bundle.add_read(Address::new(0x10), 4);
    debugger.memory_transfer(&mut bundle).unwrap();

    let regions = bundle.regions();
    assert!(regions[0].synced);
    assert_eq!(regions[0].data.as_deref(), Some(&[7u8; 8][..]));
    assert!(regions[1].synced);
    assert_eq!(stub.memory_at(MEMORY_BASE + 0x10, 4).unwrap(), &[9; 4]);
    assert!(!regions[2].synced);
    assert_eq!(regions[2].data, None);
    assert_eq!(stub.live_objects(), 0);
}

#[test]
fn breakpoint_set_list_delete() {
    let (stub, debugger) = session();
    let mut bp = Breakpoint::at(Address::with_access("P", MEMORY_BASE));
    bp.kind = Some(Kind::Program);
    bp.implementation = Some(Implementation::Onchip);
    bp.action = Some(Action::STOP | Action::SPOT);
    debugger.breakpoint_set(&bp).unwrap();
    assert_eq!(stub.committed_breakpoints(), 1);

    let listed = debugger.breakpoint_list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].address, bp.address);
    assert_eq!(listed[0].kind, Some(Kind::Program));
    assert_eq!(listed[0].implementation, Some(Implementation::Onchip));
    assert_eq!(listed[0].action, Some(Action::STOP | Action::SPOT));
    assert!(listed[0].enabled);

    debugger.breakpoint_delete(&bp).unwrap();
    assert_eq!(stub.committed_breakpoints(), 0);
    assert_eq!(stub.live_objects(), 0);
}

#[test]
fn breakpoint_disable_keeps_it_listed() {
    let (_stub, debugger) = session();
    let mut bp = Breakpoint::at(Address::new(MEMORY_BASE + 4));
    debugger.breakpoint_set(&bp).unwrap();
    debugger.breakpoint_disable(&mut bp).unwrap();
    let listed = debugger.breakpoint_list().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].enabled);
}

#[test]
fn breakpoint_without_address_is_rejected() {
    let (_stub, debugger) = session();
    match debugger.breakpoint_set(&Breakpoint::default()) {
        Err(Error::BreakpointAddress) => {}
        other => panic!("expected address rejection, got {other:?}"),
    }
}

#[test]
fn symbol_query_by_name_and_address() {
    let (stub, debugger) = session();
    stub.add_symbol("main", "/src/main.c", MEMORY_BASE + 0x200, 0x40);

    let sym = debugger.symbol_query_by_name("main").unwrap().unwrap();
    assert_eq!(sym.name, "main");
    assert_eq!(sym.path, "/src/main.c");
    assert_eq!(sym.address.value, MEMORY_BASE + 0x200);
    assert_eq!(sym.size, 0x40);

    // an address inside the symbol resolves to it
    let sym = debugger
        .symbol_query_by_address(&Address::new(MEMORY_BASE + 0x210))
        .unwrap()
        .unwrap();
    assert_eq!(sym.name, "main");

    assert_eq!(debugger.symbol_query_by_name("nope").unwrap(), None);
    assert_eq!(stub.live_objects(), 0);
}

#[test]
fn symbol_query_argument_check_precedes_remote_calls() {
    let (stub, debugger) = session();
    let before = stub.remote_calls();
    let addr = Address::new(0x10);
    match debugger.symbol_query(Some("main"), Some(&addr)) {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("expected invalid argument, got {other:?}"),
    }
    match debugger.symbol_query(None, None) {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("expected invalid argument, got {other:?}"),
    }
    assert_eq!(stub.remote_calls(), before);
}

#[test]
fn failed_command_carries_remote_diagnostic() {
    let (stub, debugger) = session();
    stub.fail_command("Break.Set nowhere", 0x10C0, "address not mapped");
    match debugger.cmd("Break.Set nowhere") {
        Err(Error::ExecuteCommand { message }) => assert_eq!(message, "address not mapped"),
        other => panic!("expected command failure, got {other:?}"),
    }
}

#[test]
fn function_evaluation_decodes_typed_results() {
    let (stub, debugger) = session();
    stub.set_function("STATE.RUN()", result_types::BOOLEAN, "TRUE()");
    stub.set_function("Register(PC)", result_types::HEX, "8000");
    stub.set_function("RunTime.ACTUAL()", result_types::TIME, "1.5s");
    assert_eq!(debugger.fnc("STATE.RUN()").unwrap(), FncValue::Boolean(true));
    assert_eq!(debugger.fnc("Register(PC)").unwrap(), FncValue::Hex(0x8000));
    assert_eq!(debugger.fnc("RunTime.ACTUAL()").unwrap(), FncValue::Time(1.5));
    // unscripted expressions evaluate to nothing
    assert_eq!(debugger.fnc("whatever").unwrap(), FncValue::Empty);
}

#[test]
fn failed_function_carries_remote_diagnostic() {
    let (stub, debugger) = session();
    stub.fail_function("BROKEN()", 0x10C1, "unknown function");
    match debugger.fnc("BROKEN()") {
        Err(Error::ExecuteFunction { message }) => assert_eq!(message, "unknown function"),
        other => panic!("expected function failure, got {other:?}"),
    }
}

#[test]
fn eval_helpers_wrap_practice_expressions() {
    let (stub, debugger) = session();
    stub.set_eval("STATE.RUN()", 1, "");
    stub.set_eval("FORMAT.DECIMAL(CORE.NUMBER())", 0, "2");
    stub.set_eval("FORMAT.STRing(CPU())", 0, "CortexM4");
    assert!(debugger.cmd_bool("STATE.RUN()").unwrap());
    assert_eq!(debugger.cmd_int("CORE.NUMBER()").unwrap(), 2);
    assert_eq!(debugger.cmd_str("CPU()").unwrap(), "CortexM4");
}

#[test]
fn macros_round_trip_through_the_session() {
    let (_stub, debugger) = session();
    debugger.set_macro("BUILD", "release").unwrap();
    assert_eq!(debugger.get_macro("BUILD").unwrap(), "release");
    assert_eq!(debugger.get_macro("UNSET").unwrap(), "");
}

#[test]
fn run_script_waits_for_idle_interpreter() {
    let (stub, debugger) = session();
    stub.set_script_busy_polls(2);
    debugger
        .run_script("flash.cmm", Some(Duration::from_secs(5)))
        .unwrap();
    assert!(stub
        .executed_commands()
        .iter()
        .any(|c| c == "DO flash.cmm"));
}

#[test]
fn run_script_times_out_while_busy() {
    let (stub, debugger) = session();
    stub.set_script_busy_polls(u32::MAX);
    match debugger.run_script("forever.cmm", Some(Duration::ZERO)) {
        Err(Error::Timeout { .. }) => {}
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn state_and_messages_surface() {
    let (stub, debugger) = session();
    stub.set_state(3);
    assert_eq!(debugger.state().unwrap(), 3);
    stub.set_message("target halted", 2);
    let message = debugger.get_message().unwrap();
    assert_eq!(message.text, "target halted");
    assert_eq!(message.kind, 2);
}

#[test]
fn every_operation_rebinds_the_channel() {
    let (stub, debugger) = session();
    let before = stub.rebinds();
    debugger.ping().unwrap();
    debugger.state().unwrap();
    assert_eq!(stub.rebinds(), before + 2);
}
