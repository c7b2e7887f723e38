//! Observer port for script execution.
//!
//! A [`Debugger`] receives copies of interpreter state at each stage of a
//! thread's lifecycle. The high level order is:
//!
//! ```text
//! BeforeExecute
//! for each step:
//!   BeforeStep
//!   BeforeExecuteOpcode
//!   for each stack push:  BeforeStackPush; AfterStackPush
//!   for each stack pop:   BeforeStackPop; AfterStackPop
//!   AfterExecuteOpcode
//!   if end of current script:
//!     BeforeScriptChange; AfterScriptChange
//!   if end of final script under pre-genesis rules:
//!     BeforeStackPush; AfterStackPush
//!   AfterStep
//! AfterExecute
//! AfterSuccess  xor  AfterError
//! ```
//!
//! Instrumentation never changes observable execution semantics; the engine
//! only checks for debugger presence to skip hook dispatch.

use crate::util::Error;

/// Branch execution state for one IF/NOTIF nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondState {
    /// Branch is executing.
    True,
    /// Branch is suppressed; an ELSE can revive it.
    False,
    /// Branch is nested inside a suppressed branch; ELSE cannot revive it.
    Skip,
}

/// A copy of interpreter state handed to debugger hooks.
#[derive(Debug, Clone, Default)]
pub struct State {
    /// Primary data stack, bottom first.
    pub data_stack: Vec<Vec<u8>>,
    /// Alternate stack, bottom first.
    pub alt_stack: Vec<Vec<u8>>,
    /// 0 while the unlocking script runs, 1 for the locking script.
    pub script_index: usize,
    /// Byte offset of the current opcode in the current script.
    pub program_counter: usize,
    /// Nested IF/NOTIF state, outermost first.
    pub cond_stack: Vec<CondState>,
    /// Count of non-push opcodes executed in the current script.
    pub op_count: usize,
}

/// Hooks called during script execution. All default to no-ops.
#[allow(unused_variables)]
pub trait Debugger {
    /// Called once before the first step.
    fn before_execute(&mut self, state: &State) {}
    /// Called before each step parses its opcode.
    fn before_step(&mut self, state: &State) {}
    /// Called after the opcode is parsed, before it executes.
    fn before_execute_opcode(&mut self, state: &State) {}
    /// Called after the opcode executed.
    fn after_execute_opcode(&mut self, state: &State) {}
    /// Called when the current script is exhausted, before switching.
    fn before_script_change(&mut self, state: &State) {}
    /// Called after the interpreter switched to the next script.
    fn after_script_change(&mut self, state: &State) {}
    /// Called at the end of each step.
    fn after_step(&mut self, state: &State) {}
    /// Called once after the last step, success or not.
    fn after_execute(&mut self, state: &State) {}
    /// Called when execution finished successfully.
    fn after_success(&mut self, state: &State) {}
    /// Called with the fatal error when execution failed.
    fn after_error(&mut self, state: &State, error: &Error) {}

    /// Called before data lands on a stack.
    fn before_stack_push(&mut self, state: &State, data: &[u8]) {}
    /// Called after data landed on a stack.
    fn after_stack_push(&mut self, state: &State, data: &[u8]) {}
    /// Called before a stack pop.
    fn before_stack_pop(&mut self, state: &State) {}
    /// Called after a stack pop with the removed data.
    fn after_stack_pop(&mut self, state: &State, data: &[u8]) {}
}

/// The default debugger: every hook is a no-op and the engine skips state
/// snapshots entirely when it is in use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopDebugger;

impl Debugger for NopDebugger {}
