//! Stack machine for evaluating locking/unlocking script pairs.

use crate::script::Script;
use crate::script::checker::Checker;
use crate::script::debug::{CondState, Debugger, State};
use crate::script::op_codes::*;
use crate::script::stack::{
    decode_bigint, decode_bool, decode_num, encode_bigint, encode_num, is_minimally_encoded,
};
use crate::util::{Error, Result, ScriptError, hash160, lshift, rshift, sha256d};
use bitcoin_hashes::{Hash as BHHash, ripemd160 as bh_ripemd160, sha1 as bh_sha1, sha256 as bh_sha256};
use num_bigint::BigInt;
use num_traits::{One, ToPrimitive, Zero};

// Classic limits, lifted after genesis activation.
const MAX_SCRIPT_SIZE: usize = 10_000;
const MAX_ELEMENT_SIZE: usize = 520;
const MAX_OPS_PER_SCRIPT: usize = 500;
const MAX_STACK_SIZE: usize = 1_000;
const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;

/// Configurable executor for one unlocking/locking script pair.
///
/// ```no_run
/// use bsvtx::script::{Engine, Script, TransactionlessChecker};
///
/// let unlocking = Script::new();
/// let locking = Script::from_asm("OP_1")?;
/// Engine::new()
///     .with_scripts(&unlocking, &locking)
///     .after_genesis(true)
///     .execute(&mut TransactionlessChecker)?;
/// # Ok::<(), bsvtx::util::Error>(())
/// ```
#[derive(Default)]
pub struct Engine<'a> {
    scripts: Option<(&'a Script, &'a Script)>,
    after_genesis: bool,
    debugger: Option<&'a mut dyn Debugger>,
}

impl<'a> Engine<'a> {
    /// Creates an engine with classic (pre-genesis) rules and no debugger.
    #[must_use]
    pub fn new() -> Engine<'a> {
        Engine::default()
    }

    /// Sets the unlocking and locking scripts to execute. Required.
    #[must_use]
    pub fn with_scripts(mut self, unlocking: &'a Script, locking: &'a Script) -> Engine<'a> {
        self.scripts = Some((unlocking, locking));
        self
    }

    /// Relaxes classic script, element, opcode and stack limits.
    #[must_use]
    pub fn after_genesis(mut self, yes: bool) -> Engine<'a> {
        self.after_genesis = yes;
        self
    }

    /// Installs a debugger. Without one, hook dispatch is skipped entirely.
    #[must_use]
    pub fn with_debugger(mut self, debugger: &'a mut dyn Debugger) -> Engine<'a> {
        self.debugger = Some(debugger);
        self
    }

    /// Runs the scripts to completion.
    ///
    /// # Errors
    /// Any fatal `ScriptError`, surfaced after the `AfterError` hook.
    pub fn execute<C: Checker>(self, checker: &mut C) -> Result<()> {
        let (unlocking, locking) = self
            .scripts
            .ok_or_else(|| Error::BadArgument("scripts not supplied".to_string()))?;
        let mut thread = Thread {
            scripts: [unlocking.as_bytes(), locking.as_bytes()],
            script_index: 0,
            pc: 0,
            data_stack: Vec::new(),
            alt_stack: Vec::new(),
            cond_stack: Vec::new(),
            op_count: 0,
            check_index: 0,
            after_genesis: self.after_genesis,
            debugger: self.debugger,
        };
        thread.run(checker)
    }
}

struct Thread<'a> {
    scripts: [&'a [u8]; 2],
    script_index: usize,
    pc: usize,
    data_stack: Vec<Vec<u8>>,
    alt_stack: Vec<Vec<u8>>,
    cond_stack: Vec<CondState>,
    op_count: usize,
    check_index: usize,
    after_genesis: bool,
    debugger: Option<&'a mut dyn Debugger>,
}

impl<'a> Thread<'a> {
    fn snap(&self) -> State {
        State {
            data_stack: self.data_stack.clone(),
            alt_stack: self.alt_stack.clone(),
            script_index: self.script_index,
            program_counter: self.pc,
            cond_stack: self.cond_stack.clone(),
            op_count: self.op_count,
        }
    }

    fn dbg<F: FnOnce(&mut dyn Debugger, &State)>(&mut self, f: F) {
        if self.debugger.is_none() {
            return;
        }
        let state = self.snap();
        if let Some(d) = self.debugger.as_deref_mut() {
            f(d, &state);
        }
    }

    fn run<C: Checker>(&mut self, checker: &mut C) -> Result<()> {
        let result = self.run_inner(checker);
        self.dbg(|d, s| d.after_execute(s));
        match &result {
            Ok(()) => self.dbg(|d, s| d.after_success(s)),
            Err(e) => self.dbg(|d, s| d.after_error(s, e)),
        }
        result
    }

    fn run_inner<C: Checker>(&mut self, checker: &mut C) -> Result<()> {
        if !self.after_genesis
            && (self.scripts[0].len() > MAX_SCRIPT_SIZE || self.scripts[1].len() > MAX_SCRIPT_SIZE)
        {
            return Err(ScriptError::ScriptOverflow.into());
        }
        self.dbg(|d, s| d.before_execute(s));

        let mut finished = false;
        while !finished {
            let script = self.scripts[self.script_index];
            if self.pc >= script.len() {
                // Empty script: transition without a step.
                finished = self.end_of_script()?;
                continue;
            }

            self.dbg(|d, s| d.before_step(s));
            self.dbg(|d, s| d.before_execute_opcode(s));
            let stop = self.execute_opcode(checker)?;
            self.dbg(|d, s| d.after_execute_opcode(s));

            if stop {
                // Post-genesis OP_RETURN terminates evaluation in place.
                finished = true;
            } else if self.pc >= self.scripts[self.script_index].len() {
                finished = self.end_of_script()?;
            }
            self.dbg(|d, s| d.after_step(s));
        }

        match self.data_stack.last() {
            None => Err(ScriptError::VerifyFailed.into()),
            Some(top) if !decode_bool(top) => Err(ScriptError::VerifyFailed.into()),
            Some(_) => {
                if !self.after_genesis && self.data_stack.len() != 1 {
                    return Err(ScriptError::CleanStack.into());
                }
                Ok(())
            }
        }
    }

    /// Handles exhaustion of the current script. Returns true when the run
    /// is complete.
    fn end_of_script(&mut self) -> Result<bool> {
        if !self.cond_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional.into());
        }
        if self.script_index == 0 {
            self.dbg(|d, s| d.before_script_change(s));
            self.script_index = 1;
            self.pc = 0;
            self.alt_stack.clear();
            self.op_count = 0;
            self.check_index = 0;
            self.dbg(|d, s| d.after_script_change(s));
            Ok(false)
        } else {
            if !self.after_genesis {
                // BIP16-era post-script push, observed even without a
                // semantic redemption.
                let top = self.data_stack.last().cloned().unwrap_or_default();
                self.dbg(|d, s| d.before_stack_push(s, &top));
                self.dbg(|d, s| d.after_stack_push(s, &top));
            }
            Ok(true)
        }
    }

    fn executing(&self) -> bool {
        self.cond_stack.iter().all(|c| *c == CondState::True)
    }

    fn push(&mut self, data: Vec<u8>) -> Result<()> {
        if !self.after_genesis {
            if data.len() > MAX_ELEMENT_SIZE {
                return Err(ScriptError::ScriptOverflow.into());
            }
            if self.data_stack.len() + self.alt_stack.len() + 1 > MAX_STACK_SIZE {
                return Err(ScriptError::ScriptOverflow.into());
            }
        }
        self.dbg(|d, s| d.before_stack_push(s, &data));
        self.data_stack.push(data);
        if self.debugger.is_some() {
            let data = self.data_stack.last().cloned().unwrap_or_default();
            self.dbg(|d, s| d.after_stack_push(s, &data));
        }
        Ok(())
    }

    fn push_bool(&mut self, b: bool) -> Result<()> {
        self.push(if b { vec![1] } else { vec![] })
    }

    fn pop(&mut self) -> Result<Vec<u8>> {
        self.dbg(|d, s| d.before_stack_pop(s));
        let v = self
            .data_stack
            .pop()
            .ok_or(Error::Script(ScriptError::InvalidStackOperation))?;
        self.dbg(|d, s| d.after_stack_pop(s, &v));
        Ok(v)
    }

    fn push_alt(&mut self, data: Vec<u8>) -> Result<()> {
        if !self.after_genesis && self.data_stack.len() + self.alt_stack.len() + 1 > MAX_STACK_SIZE {
            return Err(ScriptError::ScriptOverflow.into());
        }
        self.dbg(|d, s| d.before_stack_push(s, &data));
        self.alt_stack.push(data);
        if self.debugger.is_some() {
            let data = self.alt_stack.last().cloned().unwrap_or_default();
            self.dbg(|d, s| d.after_stack_push(s, &data));
        }
        Ok(())
    }

    fn pop_alt(&mut self) -> Result<Vec<u8>> {
        self.dbg(|d, s| d.before_stack_pop(s));
        let v = self
            .alt_stack
            .pop()
            .ok_or(Error::Script(ScriptError::InvalidStackOperation))?;
        self.dbg(|d, s| d.after_stack_pop(s, &v));
        Ok(v)
    }

    fn top(&self, depth: usize) -> Result<&Vec<u8>> {
        if self.data_stack.len() <= depth {
            return Err(ScriptError::InvalidStackOperation.into());
        }
        Ok(&self.data_stack[self.data_stack.len() - 1 - depth])
    }

    fn need(&self, minsize: usize) -> Result<()> {
        if self.data_stack.len() < minsize {
            return Err(ScriptError::InvalidStackOperation.into());
        }
        Ok(())
    }

    fn pop_bool(&mut self) -> Result<bool> {
        let v = self.pop()?;
        Ok(decode_bool(&v))
    }

    fn pop_num(&mut self) -> Result<i64> {
        let v = self.pop()?;
        if self.after_genesis && !is_minimally_encoded(&v) {
            return Err(ScriptError::MinimalEncoding.into());
        }
        decode_num(&v)
    }

    fn pop_bigint(&mut self) -> Result<BigInt> {
        let v = self.pop()?;
        if self.after_genesis {
            if !is_minimally_encoded(&v) {
                return Err(ScriptError::MinimalEncoding.into());
            }
        } else if v.len() > 4 {
            return Err(ScriptError::NumericOverflow.into());
        }
        Ok(decode_bigint(&v))
    }

    fn push_bigint(&mut self, n: &BigInt) -> Result<()> {
        self.push(encode_bigint(n))
    }

    /// Executes the opcode at the program counter and advances past it.
    /// Returns true when evaluation must stop in place (OP_RETURN after
    /// genesis).
    fn execute_opcode<C: Checker>(&mut self, checker: &mut C) -> Result<bool> {
        let script = self.scripts[self.script_index];
        let i = self.pc;
        let op = script[i];
        let executing = self.executing();

        if op > OP_16 {
            self.op_count += 1;
            if !self.after_genesis && self.op_count > MAX_OPS_PER_SCRIPT {
                return Err(ScriptError::ScriptOverflow.into());
            }
        }
        if op == OP_2MUL || op == OP_2DIV {
            return Err(ScriptError::DisabledOpcode(op).into());
        }
        if op == OP_VERIF || op == OP_VERNOTIF {
            return Err(ScriptError::BadOpcode(op).into());
        }

        // Push opcodes advance over their payload whether executing or not,
        // so suppressed branches keep IF/ELSE/ENDIF nesting aligned.
        match op {
            len @ 1..=75 => {
                let len = len as usize;
                remains(i + 1, len, script)?;
                if executing {
                    self.push(script[i + 1..i + 1 + len].to_vec())?;
                }
                self.pc = i + 1 + len;
                return Ok(false);
            }
            OP_PUSHDATA1 => {
                remains(i + 1, 1, script)?;
                let len = script[i + 1] as usize;
                remains(i + 2, len, script)?;
                if executing {
                    self.push(script[i + 2..i + 2 + len].to_vec())?;
                }
                self.pc = i + 2 + len;
                return Ok(false);
            }
            OP_PUSHDATA2 => {
                remains(i + 1, 2, script)?;
                let len = u16::from_le_bytes([script[i + 1], script[i + 2]]) as usize;
                remains(i + 3, len, script)?;
                if executing {
                    self.push(script[i + 3..i + 3 + len].to_vec())?;
                }
                self.pc = i + 3 + len;
                return Ok(false);
            }
            OP_PUSHDATA4 => {
                remains(i + 1, 4, script)?;
                let len = u32::from_le_bytes([
                    script[i + 1],
                    script[i + 2],
                    script[i + 3],
                    script[i + 4],
                ]) as usize;
                remains(i + 5, len, script)?;
                if executing {
                    self.push(script[i + 5..i + 5 + len].to_vec())?;
                }
                self.pc = i + 5 + len;
                return Ok(false);
            }
            _ => {}
        }
        self.pc = i + 1;

        // Conditionals execute in suppressed branches too.
        match op {
            OP_IF | OP_NOTIF => {
                if executing {
                    let mut b = self.pop_bool()?;
                    if op == OP_NOTIF {
                        b = !b;
                    }
                    self.cond_stack.push(if b { CondState::True } else { CondState::False });
                } else {
                    self.cond_stack.push(CondState::Skip);
                }
                return Ok(false);
            }
            OP_ELSE => {
                match self.cond_stack.last_mut() {
                    None => return Err(ScriptError::UnbalancedConditional.into()),
                    Some(c @ CondState::True) => *c = CondState::False,
                    Some(c @ CondState::False) => *c = CondState::True,
                    Some(CondState::Skip) => {}
                }
                return Ok(false);
            }
            OP_ENDIF => {
                if self.cond_stack.pop().is_none() {
                    return Err(ScriptError::UnbalancedConditional.into());
                }
                return Ok(false);
            }
            _ => {}
        }

        if !executing {
            return Ok(false);
        }

        match op {
            OP_0 => self.push(vec![])?,
            OP_1NEGATE => self.push(encode_num(-1)?)?,
            OP_1 | 82..=96 => self.push(encode_num((op - OP_1 + 1) as i64)?)?,
            OP_NOP => {}
            OP_VERIFY => {
                if !self.pop_bool()? {
                    return Err(ScriptError::VerifyFailed.into());
                }
            }
            OP_RETURN => {
                if self.after_genesis {
                    return Ok(true);
                }
                return Err(ScriptError::EarlyReturn.into());
            }
            OP_TOALTSTACK => {
                let v = self.pop()?;
                self.push_alt(v)?;
            }
            OP_FROMALTSTACK => {
                let v = self.pop_alt()?;
                self.push(v)?;
            }
            OP_IFDUP => {
                let top = self.top(0)?;
                if decode_bool(top) {
                    let copy = top.clone();
                    self.push(copy)?;
                }
            }
            OP_DEPTH => {
                let depth = self.data_stack.len() as i64;
                self.push(encode_num(depth)?)?;
            }
            OP_DROP => {
                self.pop()?;
            }
            OP_DUP => {
                let copy = self.top(0)?.clone();
                self.push(copy)?;
            }
            OP_NIP => {
                let top = self.pop()?;
                self.pop()?;
                self.push(top)?;
            }
            OP_OVER => {
                let copy = self.top(1)?.clone();
                self.push(copy)?;
            }
            OP_PICK | OP_ROLL => {
                let n = self.pop_num()?;
                if n < 0 {
                    return Err(ScriptError::InvalidStackOperation.into());
                }
                let n = n as usize;
                self.need(n + 1)?;
                if op == OP_PICK {
                    let copy = self.data_stack[self.data_stack.len() - 1 - n].clone();
                    self.push(copy)?;
                } else {
                    let item = self.data_stack.remove(self.data_stack.len() - 1 - n);
                    self.push(item)?;
                }
            }
            OP_ROT => {
                self.need(3)?;
                let third = self.data_stack.remove(self.data_stack.len() - 3);
                self.push(third)?;
            }
            OP_SWAP => {
                self.need(2)?;
                let second = self.data_stack.remove(self.data_stack.len() - 2);
                self.push(second)?;
            }
            OP_TUCK => {
                self.need(2)?;
                let top = self.top(0)?.clone();
                let len = self.data_stack.len();
                self.data_stack.insert(len - 2, top);
            }
            OP_2DROP => {
                self.pop()?;
                self.pop()?;
            }
            OP_2DUP => {
                let top = self.top(0)?.clone();
                let second = self.top(1)?.clone();
                self.push(second)?;
                self.push(top)?;
            }
            OP_3DUP => {
                let top = self.top(0)?.clone();
                let second = self.top(1)?.clone();
                let third = self.top(2)?.clone();
                self.push(third)?;
                self.push(second)?;
                self.push(top)?;
            }
            OP_2OVER => {
                let third = self.top(2)?.clone();
                let fourth = self.top(3)?.clone();
                self.push(fourth)?;
                self.push(third)?;
            }
            OP_2ROT => {
                self.need(6)?;
                let index = self.data_stack.len() - 6;
                let sixth = self.data_stack.remove(index);
                let fifth = self.data_stack.remove(index);
                self.push(sixth)?;
                self.push(fifth)?;
            }
            OP_2SWAP => {
                self.need(4)?;
                let index = self.data_stack.len() - 4;
                let fourth = self.data_stack.remove(index);
                let third = self.data_stack.remove(index);
                self.push(fourth)?;
                self.push(third)?;
            }
            OP_CAT => {
                let top = self.pop()?;
                let mut second = self.pop()?;
                second.extend_from_slice(&top);
                self.push(second)?;
            }
            OP_SPLIT => {
                let n = self.pop_num()?;
                let x = self.pop()?;
                if n < 0 || n as usize > x.len() {
                    return Err(ScriptError::InvalidStackOperation.into());
                }
                let n = n as usize;
                self.push(x[..n].to_vec())?;
                self.push(x[n..].to_vec())?;
            }
            OP_SIZE => {
                let len = self.top(0)?.len() as i64;
                self.push(encode_num(len)?)?;
            }
            OP_AND | OP_OR | OP_XOR => {
                let a = self.pop()?;
                let b = self.pop()?;
                if a.len() != b.len() {
                    return Err(ScriptError::InvalidStackOperation.into());
                }
                let mut result = Vec::with_capacity(a.len());
                for j in 0..a.len() {
                    result.push(match op {
                        OP_AND => a[j] & b[j],
                        OP_OR => a[j] | b[j],
                        _ => a[j] ^ b[j],
                    });
                }
                self.push(result)?;
            }
            OP_INVERT => {
                let mut v = self.pop()?;
                v.iter_mut().for_each(|byte| *byte = !*byte);
                self.push(v)?;
            }
            OP_LSHIFT | OP_RSHIFT => {
                let n = self.pop_num()?;
                let v = self.pop()?;
                if n < 0 {
                    return Err(ScriptError::InvalidStackOperation.into());
                }
                let shifted =
                    if op == OP_LSHIFT { lshift(&v, n as usize) } else { rshift(&v, n as usize) };
                self.push(shifted)?;
            }
            OP_EQUAL => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.push_bool(a == b)?;
            }
            OP_EQUALVERIFY => {
                let a = self.pop()?;
                let b = self.pop()?;
                if a != b {
                    return Err(ScriptError::VerifyFailed.into());
                }
            }
            OP_1ADD => {
                let x = self.pop_bigint()?;
                self.push_bigint(&(x + 1))?;
            }
            OP_1SUB => {
                let x = self.pop_bigint()?;
                self.push_bigint(&(x - 1))?;
            }
            OP_NEGATE => {
                let x = self.pop_bigint()?;
                self.push_bigint(&(-x))?;
            }
            OP_ABS => {
                let mut x = self.pop_bigint()?;
                if x < BigInt::zero() {
                    x = -x;
                }
                self.push_bigint(&x)?;
            }
            OP_NOT => {
                let x = self.pop_bigint()?;
                self.push_bool(x == BigInt::zero())?;
            }
            OP_0NOTEQUAL => {
                let x = self.pop_bigint()?;
                self.push_bool(x != BigInt::zero())?;
            }
            OP_ADD => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bigint(&(a + b))?;
            }
            OP_SUB => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bigint(&(a - b))?;
            }
            OP_MUL => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bigint(&(a * b))?;
            }
            OP_DIV => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                if b == BigInt::zero() {
                    return Err(ScriptError::DivideByZero.into());
                }
                self.push_bigint(&(a / b))?;
            }
            OP_MOD => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                if b == BigInt::zero() {
                    return Err(ScriptError::DivideByZero.into());
                }
                // BigInt remainder takes the sign of the dividend
                self.push_bigint(&(a % b))?;
            }
            OP_BOOLAND => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bool(a != BigInt::zero() && b != BigInt::zero())?;
            }
            OP_BOOLOR => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bool(a != BigInt::zero() || b != BigInt::zero())?;
            }
            OP_NUMEQUAL => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bool(a == b)?;
            }
            OP_NUMEQUALVERIFY => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                if a != b {
                    return Err(ScriptError::VerifyFailed.into());
                }
            }
            OP_NUMNOTEQUAL => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bool(a != b)?;
            }
            OP_LESSTHAN => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bool(a < b)?;
            }
            OP_GREATERTHAN => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bool(a > b)?;
            }
            OP_LESSTHANOREQUAL => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bool(a <= b)?;
            }
            OP_GREATERTHANOREQUAL => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bool(a >= b)?;
            }
            OP_MIN => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bigint(if a < b { &a } else { &b })?;
            }
            OP_MAX => {
                let b = self.pop_bigint()?;
                let a = self.pop_bigint()?;
                self.push_bigint(if a > b { &a } else { &b })?;
            }
            OP_WITHIN => {
                let max = self.pop_bigint()?;
                let min = self.pop_bigint()?;
                let x = self.pop_bigint()?;
                self.push_bool(x >= min && x < max)?;
            }
            OP_NUM2BIN => {
                let m = self.pop_bigint()?;
                let mut n = self.pop()?;
                if m < BigInt::one() {
                    return Err(ScriptError::InvalidStackOperation.into());
                }
                let m = m.to_usize().ok_or(Error::Script(ScriptError::NumericOverflow))?;
                let mut sign = 0u8;
                if let Some(last) = n.last_mut() {
                    sign = *last & 0x80;
                    *last &= 0x7f;
                }
                while n.last() == Some(&0) {
                    n.pop();
                }
                if n.len() > m {
                    return Err(ScriptError::NumericOverflow.into());
                }
                n.resize(m, 0);
                let last = n.len() - 1;
                n[last] |= sign;
                self.push(n)?;
            }
            OP_BIN2NUM => {
                let v = self.pop()?;
                let n = decode_bigint(&v);
                let encoded = encode_bigint(&n);
                if !self.after_genesis && encoded.len() > 4 {
                    return Err(ScriptError::NumericOverflow.into());
                }
                self.push(encoded)?;
            }
            OP_RIPEMD160 => {
                let v = self.pop()?;
                let h = bh_ripemd160::Hash::hash(&v).to_byte_array();
                self.push(h.to_vec())?;
            }
            OP_SHA1 => {
                let v = self.pop()?;
                let h = bh_sha1::Hash::hash(&v).to_byte_array();
                self.push(h.to_vec())?;
            }
            OP_SHA256 => {
                let v = self.pop()?;
                let h = bh_sha256::Hash::hash(&v).to_byte_array();
                self.push(h.to_vec())?;
            }
            OP_HASH160 => {
                let v = self.pop()?;
                self.push(hash160(&v).0.to_vec())?;
            }
            OP_HASH256 => {
                let v = self.pop()?;
                self.push(sha256d(&v).0.to_vec())?;
            }
            OP_CODESEPARATOR => self.check_index = i + 1,
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                let pubkey = self.pop()?;
                let sig = self.pop()?;
                self.check_signature_encoding(&sig)?;
                self.check_pubkey_encoding(&pubkey)?;
                let subscript = self.subscript(&sig);
                let success = checker.check_sig(&sig, &pubkey, &subscript)?;
                if op == OP_CHECKSIG {
                    self.push_bool(success)?;
                } else if !success {
                    return Err(ScriptError::VerifyFailed.into());
                }
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let success = self.check_multisig(checker)?;
                if op == OP_CHECKMULTISIG {
                    self.push_bool(success)?;
                } else if !success {
                    return Err(ScriptError::VerifyFailed.into());
                }
            }
            OP_CHECKLOCKTIMEVERIFY => {
                if !self.after_genesis {
                    let locktime = self.pop_num()?;
                    if !checker.check_locktime(locktime)? {
                        return Err(ScriptError::VerifyFailed.into());
                    }
                }
            }
            OP_CHECKSEQUENCEVERIFY => {
                if !self.after_genesis {
                    let sequence = self.pop_num()?;
                    if !checker.check_sequence(sequence)? {
                        return Err(ScriptError::VerifyFailed.into());
                    }
                }
            }
            OP_NOP1 | OP_NOP4..=OP_NOP10 => {}
            _ => return Err(ScriptError::BadOpcode(op).into()),
        }
        Ok(false)
    }

    /// Script code for signature checks: from the last OP_CODESEPARATOR,
    /// with pre-fork signature occurrences removed.
    fn subscript(&self, sig: &[u8]) -> Vec<u8> {
        let tail = &self.scripts[self.script_index][self.check_index..];
        if prefork(sig) { remove_sig(sig, tail) } else { tail.to_vec() }
    }

    fn check_signature_encoding(&self, sig: &[u8]) -> Result<()> {
        if sig.is_empty() {
            return Ok(());
        }
        let flag = sig[sig.len() - 1];
        let base = flag & 0x1f;
        if !(1..=3).contains(&base) {
            return Err(ScriptError::SigHashType.into());
        }
        let der = &sig[..sig.len() - 1];
        let parsed =
            secp256k1::ecdsa::Signature::from_der(der).map_err(|_| ScriptError::SigDer)?;
        let mut normalized = parsed;
        normalized.normalize_s();
        if normalized != parsed {
            return Err(ScriptError::SigHighS.into());
        }
        Ok(())
    }

    fn check_pubkey_encoding(&self, pubkey: &[u8]) -> Result<()> {
        secp256k1::PublicKey::from_slice(pubkey).map_err(|_| ScriptError::PubKeyFormat)?;
        Ok(())
    }

    fn check_multisig<C: Checker>(&mut self, checker: &mut C) -> Result<bool> {
        let total = self.pop_num()?;
        if total < 0 || (!self.after_genesis && total > MAX_PUBKEYS_PER_MULTISIG) {
            return Err(ScriptError::InvalidStackOperation.into());
        }
        self.op_count += total as usize;
        if !self.after_genesis && self.op_count > MAX_OPS_PER_SCRIPT {
            return Err(ScriptError::ScriptOverflow.into());
        }
        let mut keys = Vec::with_capacity(total as usize);
        for _ in 0..total {
            keys.push(self.pop()?);
        }

        let required = self.pop_num()?;
        if required < 0 || required > total {
            return Err(ScriptError::InvalidStackOperation.into());
        }
        let mut sigs = Vec::with_capacity(required as usize);
        for _ in 0..required {
            sigs.push(self.pop()?);
        }

        // The historical extra pop
        self.pop()?;

        let mut subscript = self.scripts[self.script_index][self.check_index..].to_vec();
        for sig in &sigs {
            if prefork(sig) {
                subscript = remove_sig(sig, &subscript);
            }
        }

        let mut key = 0;
        let mut sig = 0;
        while sig < sigs.len() {
            if key == keys.len() {
                return Ok(false);
            }
            if checker.check_sig(&sigs[sig], &keys[key], &subscript)? {
                sig += 1;
            }
            key += 1;
        }
        Ok(sig == required as usize)
    }
}

#[inline]
fn prefork(sig: &[u8]) -> bool {
    use crate::transaction::sighash::Flag;
    !sig.is_empty() && !Flag(sig[sig.len() - 1]).has(Flag::FORK_ID)
}

#[inline]
fn remove_sig(sig: &[u8], script: &[u8]) -> Vec<u8> {
    if sig.is_empty() {
        return script.to_vec();
    }
    let mut result = Vec::with_capacity(script.len());
    let mut i = 0;
    let mut start = 0;
    while i + sig.len() <= script.len() {
        if script[i..i + sig.len()] == *sig {
            result.extend_from_slice(&script[start..i]);
            start = i + sig.len();
            i = start;
        } else {
            i = next_op(i, script);
        }
    }
    result.extend_from_slice(&script[start..]);
    result
}

#[inline]
fn remains(i: usize, len: usize, script: &[u8]) -> Result<()> {
    if i + len > script.len() {
        Err(ScriptError::ScriptOverflow.into())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::checker::TransactionlessChecker;
    use pretty_assertions::assert_eq;

    fn eval(unlocking: &Script, locking: &Script) -> Result<()> {
        Engine::new()
            .with_scripts(unlocking, locking)
            .after_genesis(true)
            .execute(&mut TransactionlessChecker)
    }

    fn eval_classic(unlocking: &Script, locking: &Script) -> Result<()> {
        Engine::new().with_scripts(unlocking, locking).execute(&mut TransactionlessChecker)
    }

    fn script_err(r: Result<()>) -> ScriptError {
        match r {
            Err(Error::Script(e)) => e,
            other => panic!("expected script error, got {:?}", other),
        }
    }

    #[test]
    fn push_and_succeed() {
        let mut unlocking = Script::new();
        unlocking.append_data(&[1, 2, 3]).unwrap();
        let locking = Script::new();
        assert!(eval(&unlocking, &locking).is_ok());
    }

    #[test]
    fn empty_scripts_fail() {
        let e = script_err(eval(&Script::new(), &Script::new()));
        assert_eq!(e, ScriptError::VerifyFailed);
    }

    #[test]
    fn false_top_fails() {
        let locking = Script::from_asm("OP_0").unwrap();
        let e = script_err(eval(&Script::new(), &locking));
        assert_eq!(e, ScriptError::VerifyFailed);
    }

    #[test]
    fn arithmetic() {
        let locking = Script::from_asm("OP_2 OP_3 OP_ADD OP_5 OP_NUMEQUAL").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        let locking = Script::from_asm("OP_7 OP_2 OP_SUB OP_5 OP_NUMEQUAL").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        let locking = Script::from_asm("OP_7 OP_2 OP_DIV OP_3 OP_NUMEQUAL").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        // remainder takes the dividend's sign
        let locking = Script::from_asm("OP_1NEGATE OP_7 OP_MUL OP_3 OP_MOD OP_1NEGATE OP_NUMEQUAL")
            .unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn divide_by_zero() {
        let locking = Script::from_asm("OP_5 OP_0 OP_DIV").unwrap();
        assert_eq!(script_err(eval(&Script::new(), &locking)), ScriptError::DivideByZero);
        let locking = Script::from_asm("OP_5 OP_0 OP_MOD").unwrap();
        assert_eq!(script_err(eval(&Script::new(), &locking)), ScriptError::DivideByZero);
    }

    #[test]
    fn conditionals_nest() {
        // Outer false branch suppresses the inner IF entirely
        let locking =
            Script::from_asm("OP_0 OP_IF OP_1 OP_IF OP_RETURN OP_ENDIF OP_ELSE OP_1 OP_ENDIF")
                .unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        // Taken branch
        let locking = Script::from_asm("OP_1 OP_IF OP_2 OP_ELSE OP_3 OP_ENDIF OP_2 OP_NUMEQUAL")
            .unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn conditional_skips_push_payload() {
        // The suppressed branch contains a push whose payload looks like
        // OP_ENDIF; it must be skipped as data, not control flow.
        let mut locking = Script::new();
        locking.append(OP_0);
        locking.append(OP_IF);
        locking.append_data(&[OP_ENDIF, OP_ENDIF]).unwrap();
        locking.append(OP_ENDIF);
        locking.append(OP_1);
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn unbalanced_conditionals() {
        let locking = Script::from_asm("OP_1 OP_IF OP_1").unwrap();
        assert_eq!(
            script_err(eval(&Script::new(), &locking)),
            ScriptError::UnbalancedConditional
        );
        let locking = Script::from_asm("OP_1 OP_ENDIF").unwrap();
        assert_eq!(
            script_err(eval(&Script::new(), &locking)),
            ScriptError::UnbalancedConditional
        );
        let locking = Script::from_asm("OP_ELSE OP_1").unwrap();
        assert_eq!(
            script_err(eval(&Script::new(), &locking)),
            ScriptError::UnbalancedConditional
        );
    }

    #[test]
    fn alt_stack_clears_on_script_change() {
        let mut unlocking = Script::from_asm("OP_1 OP_2").unwrap();
        unlocking.append(OP_TOALTSTACK);
        // OP_FROMALTSTACK in the locking script must find nothing
        let locking = Script::from_asm("OP_FROMALTSTACK").unwrap();
        assert_eq!(
            script_err(eval(&unlocking, &locking)),
            ScriptError::InvalidStackOperation
        );

        // Within one script the alt stack works
        let locking = Script::from_asm("OP_5 OP_TOALTSTACK OP_1 OP_DROP OP_FROMALTSTACK").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn data_stack_persists_across_scripts() {
        let unlocking = Script::from_asm("OP_2 OP_3").unwrap();
        let locking = Script::from_asm("OP_ADD OP_5 OP_NUMEQUAL").unwrap();
        assert!(eval(&unlocking, &locking).is_ok());
    }

    #[test]
    fn splice_and_bitwise() {
        let locking = Script::from_asm("ff ff OP_CAT ffff OP_EQUAL").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        let locking = Script::from_asm("aabb OP_1 OP_SPLIT OP_SWAP OP_DROP bb OP_EQUAL").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        let locking = Script::from_asm("f00f 0ff0 OP_XOR ffff OP_EQUAL").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        let locking = Script::from_asm("010203 OP_SIZE OP_3 OP_NUMEQUALVERIFY OP_DROP OP_1")
            .unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn num2bin_bin2num() {
        let locking = Script::from_asm("OP_1 OP_4 OP_NUM2BIN 01000000 OP_EQUAL").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        let locking = Script::from_asm("01000000 OP_BIN2NUM OP_1 OP_EQUAL").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn minimal_encoding_after_genesis() {
        let mut locking = Script::new();
        locking.append_slice(&[2, 0x01, 0x00]); // non-minimal 1
        locking.append(OP_1ADD);
        assert_eq!(script_err(eval(&Script::new(), &locking)), ScriptError::MinimalEncoding);
    }

    #[test]
    fn classic_numeric_range() {
        // 5-byte operand rejected before genesis
        let mut locking = Script::new();
        locking.append_slice(&[5, 1, 0, 0, 0, 1]);
        locking.append(OP_1ADD);
        assert_eq!(script_err(eval_classic(&Script::new(), &locking)), ScriptError::NumericOverflow);
        // but fine after genesis
        let mut locking = Script::new();
        locking.append_slice(&[5, 1, 0, 0, 0, 1]);
        locking.append(OP_1ADD);
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn clean_stack_pre_genesis() {
        let locking = Script::from_asm("OP_1 OP_1").unwrap();
        assert_eq!(script_err(eval_classic(&Script::new(), &locking)), ScriptError::CleanStack);
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn early_return() {
        let locking = Script::from_asm("OP_1 OP_RETURN OP_0").unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());
        assert_eq!(script_err(eval_classic(&Script::new(), &locking)), ScriptError::EarlyReturn);
    }

    #[test]
    fn element_size_limit_pre_genesis() {
        let mut locking = Script::new();
        locking.append_data(&vec![7u8; 521]).unwrap();
        assert_eq!(script_err(eval_classic(&Script::new(), &locking)), ScriptError::ScriptOverflow);
        let mut locking = Script::new();
        locking.append_data(&vec![7u8; 521]).unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn truncated_push_fails() {
        let locking = Script::from_bytes(vec![5, 1, 2]);
        assert_eq!(script_err(eval(&Script::new(), &locking)), ScriptError::ScriptOverflow);
    }

    #[test]
    fn disabled_and_bad_opcodes() {
        let locking = Script::from_bytes(vec![OP_1, OP_2MUL]);
        assert_eq!(script_err(eval(&Script::new(), &locking)), ScriptError::DisabledOpcode(OP_2MUL));
        let locking = Script::from_bytes(vec![OP_1, 0xba]);
        assert_eq!(script_err(eval(&Script::new(), &locking)), ScriptError::BadOpcode(0xba));
        // reserved opcode inside an unexecuted branch is fine
        let locking = Script::from_bytes(vec![OP_0, OP_IF, OP_RESERVED, OP_ENDIF, OP_1]);
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn pick_and_roll() {
        let locking = Script::from_asm("OP_3 OP_2 OP_1 OP_2 OP_PICK OP_3 OP_NUMEQUALVERIFY OP_2DROP")
            .unwrap();
        // stack after: [3] -> truthy
        assert!(eval(&Script::new(), &locking).is_ok());

        let locking = Script::from_asm("OP_3 OP_2 OP_1 OP_2 OP_ROLL OP_3 OP_NUMEQUALVERIFY OP_2DROP OP_1")
            .unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        let locking = Script::from_asm("OP_1 OP_1NEGATE OP_PICK").unwrap();
        assert_eq!(
            script_err(eval(&Script::new(), &locking)),
            ScriptError::InvalidStackOperation
        );
    }

    #[test]
    fn hash_opcodes() {
        // SHA256 of the empty string
        let locking = Script::from_asm(
            "OP_0 OP_SHA256 e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855 OP_EQUAL",
        )
        .unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());

        // HASH256 is double SHA256
        let locking = Script::from_asm(
            "OP_0 OP_HASH256 5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456 OP_EQUAL",
        )
        .unwrap();
        assert!(eval(&Script::new(), &locking).is_ok());
    }

    #[test]
    fn debugger_hook_order() {
        #[derive(Default)]
        struct Recorder {
            hooks: Vec<&'static str>,
        }
        impl Debugger for Recorder {
            fn before_execute(&mut self, _: &State) {
                self.hooks.push("BeforeExecute");
            }
            fn before_step(&mut self, _: &State) {
                self.hooks.push("BeforeStep");
            }
            fn before_execute_opcode(&mut self, _: &State) {
                self.hooks.push("BeforeExecuteOpcode");
            }
            fn after_execute_opcode(&mut self, _: &State) {
                self.hooks.push("AfterExecuteOpcode");
            }
            fn before_script_change(&mut self, _: &State) {
                self.hooks.push("BeforeScriptChange");
            }
            fn after_script_change(&mut self, _: &State) {
                self.hooks.push("AfterScriptChange");
            }
            fn after_step(&mut self, _: &State) {
                self.hooks.push("AfterStep");
            }
            fn after_execute(&mut self, _: &State) {
                self.hooks.push("AfterExecute");
            }
            fn after_success(&mut self, _: &State) {
                self.hooks.push("AfterSuccess");
            }
            fn after_error(&mut self, _: &State, _: &Error) {
                self.hooks.push("AfterError");
            }
            fn before_stack_push(&mut self, _: &State, _: &[u8]) {
                self.hooks.push("BeforeStackPush");
            }
            fn after_stack_push(&mut self, _: &State, _: &[u8]) {
                self.hooks.push("AfterStackPush");
            }
            fn before_stack_pop(&mut self, _: &State) {
                self.hooks.push("BeforeStackPop");
            }
            fn after_stack_pop(&mut self, _: &State, _: &[u8]) {
                self.hooks.push("AfterStackPop");
            }
        }

        let unlocking = Script::from_asm("OP_1").unwrap();
        let locking = Script::from_asm("OP_1 OP_DROP").unwrap();
        let mut recorder = Recorder::default();
        let result = Engine::new()
            .with_scripts(&unlocking, &locking)
            .with_debugger(&mut recorder)
            .execute(&mut TransactionlessChecker);
        assert!(result.is_ok());

        assert_eq!(
            recorder.hooks,
            vec![
                "BeforeExecute",
                // unlocking: OP_1
                "BeforeStep",
                "BeforeExecuteOpcode",
                "BeforeStackPush",
                "AfterStackPush",
                "AfterExecuteOpcode",
                "BeforeScriptChange",
                "AfterScriptChange",
                "AfterStep",
                // locking: OP_1
                "BeforeStep",
                "BeforeExecuteOpcode",
                "BeforeStackPush",
                "AfterStackPush",
                "AfterExecuteOpcode",
                "AfterStep",
                // locking: OP_DROP, then end of final script (classic rules
                // fire the trailing push pair)
                "BeforeStep",
                "BeforeExecuteOpcode",
                "BeforeStackPop",
                "AfterStackPop",
                "AfterExecuteOpcode",
                "BeforeStackPush",
                "AfterStackPush",
                "AfterStep",
                "AfterExecute",
                "AfterSuccess",
            ]
        );
    }

    #[test]
    fn debugger_error_hook() {
        #[derive(Default)]
        struct ErrorCatcher {
            caught: Option<String>,
        }
        impl Debugger for ErrorCatcher {
            fn after_error(&mut self, _: &State, error: &Error) {
                self.caught = Some(error.to_string());
            }
        }

        let locking = Script::from_asm("OP_0").unwrap();
        let mut catcher = ErrorCatcher::default();
        let result = Engine::new()
            .with_scripts(&Script::new(), &locking)
            .after_genesis(true)
            .with_debugger(&mut catcher)
            .execute(&mut TransactionlessChecker);
        assert!(result.is_err());
        assert_eq!(catcher.caught.unwrap(), "Script error: verify failed");
    }

    #[test]
    fn missing_scripts_rejected() {
        let r = Engine::new().execute(&mut TransactionlessChecker);
        assert!(matches!(r, Err(Error::BadArgument(_))));
    }
}
