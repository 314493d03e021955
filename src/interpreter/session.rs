//! Debug session controller: a state machine over an interpreted call stack,
//! advanced one command at a time.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::constant_info::ConstantPool;
use crate::descriptor::JvmType;
use crate::error::{EngineError, SessionError};
use crate::method_info::MethodDescriptor;
use crate::types::ClassFile;

use super::execute::{execute, Flow, Machine};
use super::frame::{Frame, FrameSnapshot, LoadedMethod};
use super::value::Value;

/// Lifecycle of a [`DebugSession`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Fresh at the entry point; nothing executed yet.
    Idle,
    /// Inside `run`.
    Running,
    Paused,
    /// The entry method returned or threw with no handler.
    Terminated,
    /// An engine fault; only `reset` recovers.
    Errored,
}

/// Why the last `step` or `run` returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Step,
    Breakpoint { line: u32 },
    Terminated,
    /// `run` executed `SessionConfig::max_iterations` instructions without
    /// reaching a breakpoint.
    IterationBoundExceeded,
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Most instructions a single `run` executes.
    pub max_iterations: u64,
    /// Deeper calls raise `StackOverflowError`.
    pub max_call_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            max_call_depth: 256,
        }
    }
}

/// Everything a front end shows after a command.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// `name:descriptor` of the method at the top of the stack.
    pub method: String,
    pub pc: Option<u32>,
    pub line: Option<u32>,
    /// Call stack, entry method first.
    pub frames: Vec<FrameSnapshot>,
    pub statics: BTreeMap<String, Value>,
    pub return_value: Option<Value>,
    /// `Class: message` of an exception that escaped the entry method.
    pub uncaught_exception: Option<String>,
    pub output: String,
    pub stop_reason: Option<StopReason>,
    /// Instructions executed since start or reset.
    pub steps: u64,
}

impl SessionSnapshot {
    /// The top frame, if any method is still executing.
    pub fn top(&self) -> Option<&FrameSnapshot> {
        self.frames.last()
    }
}

/// One interactive execution of a method.
///
/// Commands take `&mut self`, so a session runs at most one command at a
/// time. Breakpoints survive `reset`.
#[derive(Debug)]
pub struct DebugSession<'c> {
    machine: Machine<'c>,
    config: SessionConfig,
    entry: Arc<LoadedMethod>,
    /// Declared parameters, without the receiver.
    args: Vec<Value>,
    methods: HashMap<String, Arc<LoadedMethod>>,
    frames: Vec<Frame>,
    state: SessionState,
    breakpoints: BTreeSet<(String, u32)>,
    return_value: Option<Value>,
    uncaught_exception: Option<String>,
    stop_reason: Option<StopReason>,
    steps: u64,
}

impl<'c> DebugSession<'c> {
    /// Open `method` (a name or `name:descriptor`) of `class` for execution.
    ///
    /// Missing arguments become symbolic values named after their
    /// parameter; instance methods get a fresh receiver of the class.
    pub fn new(class: &'c ClassFile, method: &str, args: Vec<Value>, config: SessionConfig) -> Result<Self, EngineError> {
        let index = class
            .find_method(method)?
            .ok_or_else(|| SessionError::MethodNotFound(method.to_string()))?;
        let descriptor = class.methods[index].describe(&class.const_pool)?;
        let mut args = args;
        if args.len() > descriptor.signature.params.len() {
            warn!(
                "{} takes {} arguments, ignoring {} extra",
                descriptor.key(),
                descriptor.signature.params.len(),
                args.len() - descriptor.signature.params.len()
            );
            args.truncate(descriptor.signature.params.len());
        }
        let entry = Arc::new(LoadedMethod::load(descriptor)?);
        let mut machine = Machine::new(class)?;
        let frame = entry_frame(&mut machine, &entry, &args);
        debug!("session opened on {}", entry.key());

        let mut methods = HashMap::new();
        methods.insert(entry.key(), Arc::clone(&entry));
        Ok(Self {
            machine,
            config,
            entry,
            args,
            methods,
            frames: vec![frame],
            state: SessionState::Idle,
            breakpoints: BTreeSet::new(),
            return_value: None,
            uncaught_exception: None,
            stop_reason: None,
            steps: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.entry.descriptor
    }

    /// Program output written so far.
    pub fn output(&self) -> &str {
        &self.machine.output
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    /// Set a breakpoint on a source line of the entry method, or of any
    /// other method of the class that maps it.
    pub fn set_breakpoint(&mut self, line: u32) -> Result<(), SessionError> {
        let key = if self.entry.code.pcs_for_line(line).is_empty() {
            let pool = self.machine.pool();
            self.machine
                .class
                .methods
                .iter()
                .filter_map(|m| m.describe(pool).ok())
                .find(|m| m.code.as_ref().is_some_and(|c| !c.pcs_for_line(line).is_empty()))
                .map(|m| m.key())
        } else {
            Some(self.entry.key())
        };
        let key = key.ok_or(SessionError::InvalidBreakpoint { line })?;
        debug!("breakpoint at {} line {}", key, line);
        self.breakpoints.insert((key, line));
        Ok(())
    }

    /// Remove the breakpoint on `line`. Returns whether one was set.
    pub fn clear_breakpoint(&mut self, line: u32) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|(_, l)| *l != line);
        before != self.breakpoints.len()
    }

    pub fn breakpoints(&self) -> Vec<u32> {
        self.breakpoints.iter().map(|(_, line)| *line).collect()
    }

    /// Execute exactly one instruction.
    pub fn step(&mut self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_runnable()?;
        self.execute_one()?;
        let reason = if self.state == SessionState::Terminated {
            StopReason::Terminated
        } else {
            self.state = SessionState::Paused;
            StopReason::Step
        };
        self.stop_reason = Some(reason);
        Ok(self.snapshot())
    }

    /// Execute until a breakpoint, termination or the iteration bound.
    pub fn run(&mut self) -> Result<SessionSnapshot, SessionError> {
        self.run_with_cancel(&AtomicBool::new(false))
    }

    /// Like [`run`](Self::run), also stopping once `cancel` is set. The flag
    /// is checked before every instruction.
    ///
    /// A breakpoint at the current location does not stop the run: at least
    /// one instruction executes first. A run that stops before executing
    /// anything leaves the session in the state it started from.
    pub fn run_with_cancel(&mut self, cancel: &AtomicBool) -> Result<SessionSnapshot, SessionError> {
        self.ensure_runnable()?;
        let previous = self.state;
        self.state = SessionState::Running;
        let mut iterations = 0;
        let reason = loop {
            if cancel.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }
            if iterations >= self.config.max_iterations {
                warn!(
                    "run stopped after {} instructions without reaching a breakpoint",
                    iterations
                );
                break StopReason::IterationBoundExceeded;
            }
            self.execute_one()?;
            iterations += 1;
            if self.state == SessionState::Terminated {
                break StopReason::Terminated;
            }
            if let Some(line) = self.breakpoint_hit() {
                break StopReason::Breakpoint { line };
            }
        };
        if self.state == SessionState::Running {
            self.state = if iterations == 0 { previous } else { SessionState::Paused };
        }
        debug!("run stopped: {:?} after {} instructions", reason, iterations);
        self.stop_reason = Some(reason);
        Ok(self.snapshot())
    }

    /// Back to `Idle` at the entry point with the original arguments. Heap,
    /// statics and output are discarded.
    pub fn reset(&mut self) -> SessionSnapshot {
        self.machine.reset();
        self.frames = vec![entry_frame(&mut self.machine, &self.entry, &self.args)];
        self.state = SessionState::Idle;
        self.return_value = None;
        self.uncaught_exception = None;
        self.stop_reason = None;
        self.steps = 0;
        debug!("session reset to {}", self.entry.key());
        self.snapshot()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let top = self.frames.last();
        SessionSnapshot {
            state: self.state,
            method: top.map_or_else(|| self.entry.key(), |f| f.method.key()),
            pc: top.map(|f| f.pc),
            line: top.and_then(Frame::line),
            frames: self.frames.iter().map(Frame::snapshot).collect(),
            statics: self.machine.statics.clone(),
            return_value: self.return_value.clone(),
            uncaught_exception: self.uncaught_exception.clone(),
            output: self.machine.output.clone(),
            stop_reason: self.stop_reason.clone(),
            steps: self.steps,
        }
    }

    /// Render a value, following heap references one level.
    pub fn describe_value(&self, value: &Value) -> String {
        self.machine.heap.describe(value)
    }

    fn ensure_runnable(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Terminated | SessionState::Errored => Err(SessionError::NotRunnable { state: self.state }),
            _ => Ok(()),
        }
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!("session on {} failed: {}", self.entry.key(), err);
        self.state = SessionState::Errored;
        err
    }

    fn fault(&mut self, pc: u32, reason: String) -> SessionError {
        self.fail(SessionError::Fault { pc, reason })
    }

    fn execute_one(&mut self) -> Result<(), SessionError> {
        let (method, pc) = match self.frames.last() {
            Some(frame) => (Arc::clone(&frame.method), frame.pc),
            None => {
                self.state = SessionState::Terminated;
                return Ok(());
            }
        };
        let Some(entry) = method.instruction_at(pc) else {
            return Err(self.fault(pc, "no instruction starts at this offset".to_string()));
        };
        trace!("{} {}: {}", method.key(), pc, entry.instruction.mnemonic());
        self.steps += 1;

        let result = match self.frames.last_mut() {
            Some(frame) => execute(&mut self.machine, frame, entry),
            None => return Ok(()),
        };
        let flow = result.map_err(|reason| self.fault(pc, reason))?;
        match flow {
            Flow::Next => self.transfer(&method, pc, entry.next_address() as i64),
            Flow::Jump(target) => self.transfer(&method, pc, target),
            Flow::Invoke { key, args } => self.call(pc, &key, args),
            Flow::Return(value) => self.return_from(value),
            Flow::Throw(value) => self.throw(value),
        }
    }

    /// Move the top frame to `target`, which must start an instruction.
    fn transfer(&mut self, method: &LoadedMethod, from: u32, target: i64) -> Result<(), SessionError> {
        let Some(target) = u32::try_from(target)
            .ok()
            .filter(|t| method.instruction_at(*t).is_some())
        else {
            return Err(self.fault(
                from,
                format!("control transfer to offset {} outside the instruction stream", target),
            ));
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = target;
        }
        Ok(())
    }

    fn call(&mut self, pc: u32, key: &str, args: Vec<Value>) -> Result<(), SessionError> {
        if self.frames.len() >= self.config.max_call_depth {
            let error = self.machine.heap.alloc_exception("java/lang/StackOverflowError", key);
            return self.throw(Value::Ref(error));
        }
        let callee = match self.load_method(key) {
            Ok(callee) => callee,
            Err(err) => {
                let err = match err {
                    SessionError::MethodNotFound(_) | SessionError::NoCode(_) => SessionError::Fault {
                        pc,
                        reason: err.to_string(),
                    },
                    other => other,
                };
                return Err(self.fail(err));
            }
        };
        debug!("call {} at depth {}", key, self.frames.len());
        self.frames.push(Frame::new(callee, args));
        Ok(())
    }

    fn load_method(&mut self, key: &str) -> Result<Arc<LoadedMethod>, SessionError> {
        if let Some(method) = self.methods.get(key) {
            return Ok(Arc::clone(method));
        }
        let (name, descriptor) = key
            .split_once(':')
            .ok_or_else(|| SessionError::MethodNotFound(key.to_string()))?;
        let class = self.machine.class;
        let index = class
            .method_index(name, descriptor)
            .ok_or_else(|| SessionError::MethodNotFound(key.to_string()))?;
        let described = class.methods[index]
            .describe(&class.const_pool)
            .map_err(|err| SessionError::Fault {
                pc: 0,
                reason: format!("{}: {}", key, err),
            })?;
        let method = Arc::new(LoadedMethod::load(described)?);
        self.methods.insert(key.to_string(), Arc::clone(&method));
        Ok(method)
    }

    fn return_from(&mut self, value: Option<Value>) -> Result<(), SessionError> {
        self.frames.pop();
        let (method, from) = match self.frames.last_mut() {
            Some(caller) => {
                if let Some(value) = value {
                    caller.push(value);
                }
                (Arc::clone(&caller.method), caller.pc)
            }
            None => {
                debug!("{} returned {:?}", self.entry.key(), value);
                self.return_value = value;
                self.state = SessionState::Terminated;
                return Ok(());
            }
        };
        // The caller still points at its invoke instruction.
        let next = method
            .instruction_at(from)
            .map_or(-1, |i| i.next_address() as i64);
        self.transfer(&method, from, next)
    }

    /// Unwind to the innermost handler covering each frame's pc.
    fn throw(&mut self, value: Value) -> Result<(), SessionError> {
        let class_name = self.machine.exception_class(&value);
        let pool = self.machine.pool();
        while let Some(frame) = self.frames.last_mut() {
            let handler = frame
                .method
                .code
                .exception_table
                .iter()
                .find(|e| e.covers(frame.pc) && catches(pool, e.catch_type, &class_name))
                .map(|e| e.handler_pc);
            if let Some(handler_pc) = handler {
                debug!("{} caught by handler at {}", class_name, handler_pc);
                let method = Arc::clone(&frame.method);
                let from = frame.pc;
                frame.stack.clear();
                frame.push(value);
                return self.transfer(&method, from, handler_pc as i64);
            }
            self.frames.pop();
        }
        let description = self
            .machine
            .heap
            .to_java_string(&value, &JvmType::Reference("java/lang/Object".to_string()));
        debug!("uncaught {}", description);
        self.uncaught_exception = Some(description);
        self.state = SessionState::Terminated;
        Ok(())
    }

    fn breakpoint_hit(&self) -> Option<u32> {
        let frame = self.frames.last()?;
        let code = &frame.method.code;
        if !code.is_line_start(frame.pc) {
            return None;
        }
        let line = code.line_for_pc(frame.pc)?;
        self.breakpoints
            .contains(&(frame.method.key(), line))
            .then_some(line)
    }
}

/// Whether a handler with `catch_type` catches `class_name`. Class
/// hierarchies are not loaded, so only the well-known roots match
/// subclasses.
fn catches(pool: &ConstantPool, catch_type: u16, class_name: &str) -> bool {
    if catch_type == 0 {
        return true;
    }
    match pool.class_name(catch_type) {
        Ok(name) => {
            name == class_name
                || name == "java/lang/Throwable"
                || (matches!(name, "java/lang/Exception" | "java/lang/RuntimeException")
                    && !class_name.ends_with("Error"))
        }
        Err(_) => false,
    }
}

fn entry_frame(machine: &mut Machine<'_>, entry: &Arc<LoadedMethod>, args: &[Value]) -> Frame {
    let descriptor = &entry.descriptor;
    let mut values = Vec::with_capacity(args.len() + 1);
    let mut slot = 0;
    if !descriptor.is_static() {
        values.push(Value::Ref(machine.new_instance()));
        slot = 1;
    }
    for (i, ty) in descriptor.signature.params.iter().enumerate() {
        let value = match args.get(i) {
            Some(value) => value.clone(),
            None => Value::Symbolic(
                entry
                    .code
                    .any_local_name(slot)
                    .map_or_else(|| format!("{}{}", ty.local_prefix(), slot), str::to_string),
            ),
        };
        values.push(value);
        slot += ty.slot_size();
    }
    Frame::new(Arc::clone(entry), values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_all_and_roots_match() {
        let pool = ConstantPool::default();
        assert!(catches(&pool, 0, "java/lang/ArithmeticException"));
        assert!(!catches(&pool, 7, "java/lang/ArithmeticException"));
    }

    #[test]
    fn default_config_bounds_runs() {
        let config = SessionConfig::default();
        assert_eq!(config.max_iterations, 100_000);
        assert_eq!(config.max_call_depth, 256);
    }
}
