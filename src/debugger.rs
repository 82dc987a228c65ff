// Debugger session façade
//
// `Debugger` owns the channel and exposes the high-level operations: connect
// and attach, command execution, function evaluation, script control, and
// state queries. The domain façades (registers, breakpoints, symbols,
// memory) hang their operations off this type from their own modules.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::channel::{Channel, Link};
use crate::codec::{decode_function_result, FncValue};
use crate::error::{status, Error, Result};
use crate::transport::{subfunction, Device, Transport, RESULT_CAPACITY};

/// How often connect retries poll the remote side.
const CONNECT_RETRY_PAUSE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub node: String,
    pub port: u16,
    /// Transport packet length in bytes.
    pub packlen: u16,
    /// Give up attaching after this long; `None` retries forever.
    pub timeout: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            node: "localhost".to_string(),
            port: 20000,
            packlen: 1024,
            timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Message pulled from the remote message area: text plus a severity class
/// reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub kind: u16,
}

pub struct Debugger {
    channel: Arc<Channel>,
}

impl fmt::Debug for Debugger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debugger").finish_non_exhaustive()
    }
}

impl Debugger {
    /// Connect to the remote debugger and attach to it.
    ///
    /// The remote side may still be starting up, so the handshake loops:
    /// initialize, drop the connection, initialize again, then attach.
    /// A receive failure during attach means the remote side is not ready
    /// yet and the loop retries until `options.timeout` elapses. Any other
    /// failure is final.
    pub fn connect(transport: Box<dyn Transport>, options: &ConnectOptions) -> Result<Self> {
        let channel = Arc::new(Channel::new(transport));
        {
            let mut link = channel.bind();
            let t = link.transport();
            status(t.config("NODE=", &options.node))?;
            status(t.config("PORT=", &options.port.to_string()))?;
            status(t.config("PACKLEN=", &options.packlen.to_string()))?;

            let start = Instant::now();
            loop {
                status(t.init())?;
                status(t.exit())?;
                status(t.init())?;
                match t.attach(Device::Icd) {
                    Ok(()) => break,
                    Err(-1) => {
                        if let Some(timeout) = options.timeout {
                            if start.elapsed() >= timeout {
                                return Err(Error::Timeout {
                                    elapsed: start.elapsed(),
                                });
                            }
                        }
                        debug!(elapsed = ?start.elapsed(), "remote not ready, retrying attach");
                        if let Err(code) = t.exit() {
                            warn!(code, "dropping half-open connection failed");
                        }
                        thread::sleep(CONNECT_RETRY_PAUSE);
                    }
                    Err(code) => return Err(Error::from_status(code)),
                }
            }
        }
        info!(node = %options.node, port = options.port, "connected to remote debugger");
        Ok(Debugger { channel })
    }

    pub(crate) fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Tear down the connection. The session is unusable afterwards.
    pub fn disconnect(self) -> Result<()> {
        let mut link = self.channel.bind();
        status(link.transport().exit())
    }

    /// Round-trip liveness check.
    pub fn ping(&self) -> Result<()> {
        let mut link = self.channel.bind();
        status(link.transport().ping())
    }

    /// Ask the remote side to stop whatever command it is running.
    pub fn stop(&self) -> Result<()> {
        let mut link = self.channel.bind();
        status(link.transport().stop())
    }

    /// Raw target state as reported by the remote side.
    pub fn state(&self) -> Result<i32> {
        let mut link = self.channel.bind();
        status(link.transport().get_state())
    }

    /// Pull the current message area content.
    pub fn get_message(&self) -> Result<Message> {
        let mut link = self.channel.bind();
        let (text, kind) = status(link.transport().get_message())?;
        Ok(Message { text, kind })
    }

    /// Execute a command. Commands have no return value; a failed command
    /// surfaces the remote diagnostic text in the error.
    pub fn cmd(&self, command: &str) -> Result<()> {
        let mut link = self.channel.bind();
        exec_on(&mut link, command)
    }

    /// Evaluate a function expression into a typed value.
    pub fn fnc(&self, expr: &str) -> Result<FncValue> {
        let mut link = self.channel.bind();
        debug!(expr, "evaluate function");
        match link.transport().execute_function(expr, RESULT_CAPACITY) {
            Ok((type_code, text)) => decode_function_result(type_code, &text),
            Err((code, text)) => match Error::from_status(code) {
                Error::ExecuteFunction { .. } => Err(Error::ExecuteFunction { message: text }),
                other => Err(other),
            },
        }
    }

    /// Evaluate a practice expression to a boolean.
    pub fn cmd_bool(&self, expr: &str) -> Result<bool> {
        let mut link = self.channel.bind();
        exec_on(&mut link, &format!("EVAL {expr}"))?;
        Ok(status(link.transport().eval_get())? != 0)
    }

    /// Evaluate a practice expression to an integer.
    pub fn cmd_int(&self, expr: &str) -> Result<i64> {
        let text = self.eval_format(expr, "DECIMAL")?;
        text.trim()
            .trim_end_matches('.')
            .parse()
            .map_err(|_| Error::Decode(format!("invalid integer evaluation {text:?}")))
    }

    /// Evaluate a practice expression to a float.
    pub fn cmd_float(&self, expr: &str) -> Result<f64> {
        let text = self.eval_format(expr, "FLOAT")?;
        text.trim()
            .parse()
            .map_err(|_| Error::Decode(format!("invalid float evaluation {text:?}")))
    }

    /// Evaluate a practice expression to a string.
    pub fn cmd_str(&self, expr: &str) -> Result<String> {
        self.eval_format(expr, "STRing")
    }

    fn eval_format(&self, expr: &str, format: &str) -> Result<String> {
        let mut link = self.channel.bind();
        exec_on(&mut link, &format!("EVAL FORMAT.{format}({expr})"))?;
        status(link.transport().eval_get_string())
    }

    /// Start a script and wait until the remote interpreter goes idle.
    /// `timeout` bounds the wait; `None` waits indefinitely.
    pub fn run_script(&self, path: &str, timeout: Option<Duration>) -> Result<()> {
        let mut link = self.channel.bind();
        exec_on(&mut link, &format!("DO {path}"))?;
        let start = Instant::now();
        loop {
            let state = status(link.transport().script_state())?;
            if state <= 0 {
                return Ok(());
            }
            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    return Err(Error::Timeout {
                        elapsed: start.elapsed(),
                    });
                }
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    /// Read a global script macro by name.
    pub fn get_macro(&self, name: &str) -> Result<String> {
        let mut data = Vec::with_capacity(4 + name.len());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&(name.len() as u16).to_le_bytes());
        data.extend_from_slice(name.as_bytes());
        let mut link = self.channel.bind();
        let reply = link.exp(subfunction::MACRO, &data)?;
        // reply opens with a 2-byte sub-function header
        let value = reply.get(2..).unwrap_or_default();
        Ok(String::from_utf8_lossy(value).into_owned())
    }

    /// Write a global script macro.
    pub fn set_macro(&self, name: &str, value: &str) -> Result<()> {
        let mut data = Vec::with_capacity(6 + name.len() + value.len());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&(name.len() as u16).to_le_bytes());
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(&(value.len() as u16).to_le_bytes());
        data.extend_from_slice(value.as_bytes());
        let mut link = self.channel.bind();
        link.exp(subfunction::MACRO, &data)?;
        Ok(())
    }

    /// Service pending state notifications once.
    pub fn poll_notifications(&self) -> Result<()> {
        let mut link = self.channel.bind();
        status(link.transport().check_state_notify(0))
    }

    /// Spawn a background thread that services state notifications at the
    /// given period. The poller shares the channel lock with foreground
    /// operations, so each poll serializes with them.
    pub fn start_state_poll(&self, period: Duration) -> StatePoller {
        let channel = Arc::clone(&self.channel);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                let mut link = channel.bind();
                if let Err(code) = link.transport().check_state_notify(0) {
                    warn!(code, "state notification poll failed");
                }
                drop(link);
                thread::sleep(period);
            }
        });
        StatePoller {
            stop,
            handle: Some(handle),
        }
    }
}

/// Execute a command on an already-bound link.
pub(crate) fn exec_on(link: &mut Link, command: &str) -> Result<()> {
    debug!(command, "execute command");
    match link.transport().execute_command(command, RESULT_CAPACITY) {
        Ok(_) => Ok(()),
        Err((code, text)) => match Error::from_status(code) {
            Error::ExecuteCommand { .. } => Err(Error::ExecuteCommand { message: text }),
            other => Err(other),
        },
    }
}

/// Handle to a background notification poller; stops the thread on drop.
pub struct StatePoller {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StatePoller {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatePoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
