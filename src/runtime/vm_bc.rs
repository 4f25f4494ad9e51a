use crate::bytecode::ir::{Constant, ProgramBc};
use crate::bytecode::op::Opcode;
use crate::config::VmConfig;
use crate::lang::node::Number;
use crate::lang::value::Value;
use crate::runtime::externals::Externals;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::stack::{InstrumentedStack, StackStats};
use std::io::{self, Write};
use std::rc::Rc;

/// One runtime frame: the slots of a block or parameter list.
type Frame = Vec<Value>;

/// Saved caller state for one active call.
struct CallRecord {
    return_addr: usize,
    chain: Vec<Frame>,
    function: usize,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmStats {
    pub operand: StackStats,
    pub calls: StackStats,
    /// Instructions executed.
    pub steps: u64,
}

impl std::fmt::Display for VmStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "steps:         {}", self.steps)?;
        writeln!(f, "operand stack: {}", self.operand)?;
        write!(f, "call stack:    {}", self.calls)
    }
}

fn symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::BinaryAdd => "+",
        Opcode::BinarySub => "-",
        Opcode::BinaryMul => "*",
        Opcode::BinaryDiv => "/",
        Opcode::BinaryMod => "%",
        Opcode::BinaryPow => "^",
        Opcode::BinaryEq => "==",
        Opcode::BinaryNe => "!=",
        Opcode::BinaryLt => "<",
        Opcode::BinaryGe => ">=",
        Opcode::UnaryNeg => "-",
        Opcode::UnaryNot => "!",
        _ => "?",
    }
}

/// Floored modulo: the result takes the sign of the divisor.
fn floor_mod_int(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

fn floor_mod_float(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

/// Stack VM for compiled Cilly programs.
///
/// Executes `code` from address 0 until the program counter runs off the end.
/// Variables live in a chain of frames; `LOAD_VAR d s` reads
/// `chain[len - 1 - d][s]`. A call saves the caller's chain in its call
/// record and runs the callee on a copy of it with the parameter frame
/// appended; a return restores the saved chain.
pub struct Vm<'a> {
    program: &'a ProgramBc,
    externals: &'a Externals,
    config: VmConfig,
    constants: Vec<Value>,
    stack: InstrumentedStack<Value>,
    calls: InstrumentedStack<CallRecord>,
    chain: Vec<Frame>,
    out: Box<dyn Write + 'a>,
    /// Items printed since the last newline.
    line: Vec<String>,
    steps: u64,
}

impl<'a> Vm<'a> {
    pub fn new(program: &'a ProgramBc, externals: &'a Externals) -> Self {
        let constants = program.constants.iter().map(Constant::to_value).collect();

        Self {
            program,
            externals,
            config: VmConfig::default(),
            constants,
            stack: InstrumentedStack::new(),
            calls: InstrumentedStack::new(),
            chain: Vec::new(),
            out: Box::new(io::stdout()),
            line: Vec::new(),
            steps: 0,
        }
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    /// Redirects `print` output (stdout by default).
    pub fn with_output(mut self, out: impl Write + 'a) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn stack(&self) -> &[Value] {
        self.stack.as_slice()
    }

    pub fn call_depth(&self) -> usize {
        self.calls.len()
    }

    pub fn stats(&self) -> VmStats {
        VmStats {
            operand: self.stack.stats(),
            calls: self.calls.stats(),
            steps: self.steps,
        }
    }

    /// Runs the program to completion.
    pub fn run(&mut self) -> Result<VmStats, RuntimeError> {
        let len = self.program.code.len();
        tracing::debug!(code = len, "vm start");

        let mut pc = 0;
        while pc < len {
            self.steps += 1;
            pc = self.step(pc)?;
        }

        self.out.flush().map_err(|e| RuntimeError::Output {
            pc,
            message: e.to_string(),
        })?;

        let stats = self.stats();
        tracing::debug!(
            steps = stats.steps,
            max_stack = stats.operand.max_depth,
            max_calls = stats.calls.max_depth,
            "vm finished"
        );
        Ok(stats)
    }

    /// Executes the instruction at `pc` and returns the next pc.
    fn step(&mut self, pc: usize) -> Result<usize, RuntimeError> {
        let program = self.program;
        let code = &program.code;
        let op = Opcode::from_u32(code[pc]).ok_or(RuntimeError::UnknownOpcode {
            pc,
            code: code[pc],
        })?;
        let next = pc + 1 + op.arity();
        if next > code.len() {
            return Err(RuntimeError::TruncatedInstruction { pc, op });
        }
        let arg = |i: usize| code[pc + 1 + i] as usize;

        match op {
            Opcode::LoadConst => {
                let index = arg(0);
                let value = self
                    .constants
                    .get(index)
                    .cloned()
                    .ok_or(RuntimeError::BadConstant { pc, index })?;
                self.push(pc, value)?;
            }
            Opcode::LoadNull => self.push(pc, Value::NULL)?,
            Opcode::LoadTrue => self.push(pc, Value::TRUE)?,
            Opcode::LoadFalse => self.push(pc, Value::FALSE)?,

            Opcode::LoadVar => {
                let value = self.slot(pc, arg(0), arg(1))?.clone();
                self.push(pc, value)?;
            }
            Opcode::StoreVar => {
                let value = self.pop(pc, op)?;
                *self.slot(pc, arg(0), arg(1))? = value;
            }

            Opcode::PrintItem => {
                let value = self.pop(pc, op)?;
                self.line.push(value.to_string());
            }
            Opcode::PrintNewline => {
                let text = self.line.join(" ");
                self.line.clear();
                writeln!(self.out, "{}", text).map_err(|e| RuntimeError::Output {
                    pc,
                    message: e.to_string(),
                })?;
            }

            Opcode::Jmp => return Ok(arg(0)),
            Opcode::JmpTrue => {
                if self.pop(pc, op)? == Value::TRUE {
                    return Ok(arg(0));
                }
            }
            Opcode::JmpFalse => {
                if self.pop(pc, op)? == Value::FALSE {
                    return Ok(arg(0));
                }
            }
            Opcode::Pop => {
                self.pop(pc, op)?;
            }

            Opcode::EnterScope => self.chain.push(vec![Value::NULL; arg(0)]),
            Opcode::LeaveScope => {
                self.chain.pop().ok_or(RuntimeError::NoScope { pc })?;
            }

            Opcode::Call => return self.call(pc, arg(0), next),
            Opcode::CallValue => {
                let argc = arg(0);
                let id = match self.pop(pc, op)? {
                    Value::Number(Number::Int(n)) if n >= 0 => n as usize,
                    other => {
                        return Err(RuntimeError::NotCallable {
                            pc,
                            type_name: other.type_name(),
                        });
                    }
                };
                let f = program
                    .function(id)
                    .ok_or(RuntimeError::UnknownFunction { pc, id })?;
                if f.arity() != argc {
                    return Err(RuntimeError::ArityMismatch {
                        pc,
                        name: f.name.clone(),
                        expected: f.arity(),
                        found: argc,
                    });
                }
                return self.call(pc, id, next);
            }
            Opcode::Return => return self.ret(pc, Value::NULL),
            Opcode::ReturnValue => {
                let value = self.pop(pc, op)?;
                return self.ret(pc, value);
            }
            Opcode::CallPrimitive => self.call_external(pc, arg(0))?,

            Opcode::UnaryNeg => {
                let value = match self.pop(pc, op)? {
                    Value::Number(Number::Int(n)) => n
                        .checked_neg()
                        .map(Value::int)
                        .ok_or(RuntimeError::Arithmetic { pc, symbol: "-" })?,
                    Value::Number(Number::Float(n)) => Value::float(-n),
                    other => {
                        return Err(RuntimeError::type_error(
                            pc,
                            format!("cannot negate {}", other.type_name()),
                        ));
                    }
                };
                self.push(pc, value)?;
            }
            Opcode::UnaryNot => {
                let value = self.pop(pc, op)?;
                self.push(pc, Value::bool(!value.is_truthy()))?;
            }

            Opcode::BinaryAdd
            | Opcode::BinarySub
            | Opcode::BinaryMul
            | Opcode::BinaryDiv
            | Opcode::BinaryMod
            | Opcode::BinaryPow
            | Opcode::BinaryEq
            | Opcode::BinaryNe
            | Opcode::BinaryLt
            | Opcode::BinaryGe => {
                let b = self.pop(pc, op)?;
                let a = self.pop(pc, op)?;
                let value = binary(pc, op, &a, &b)?;
                self.push(pc, value)?;
            }
        }

        Ok(next)
    }

    // Frames

    fn slot(&mut self, pc: usize, depth: usize, slot: usize) -> Result<&mut Value, RuntimeError> {
        let out_of_range = RuntimeError::ScopeOutOfRange { pc, depth, slot };
        let index = self
            .chain
            .len()
            .checked_sub(depth + 1)
            .ok_or_else(|| out_of_range.clone())?;
        self.chain[index].get_mut(slot).ok_or(out_of_range)
    }

    // Calls

    fn call(&mut self, pc: usize, id: usize, return_addr: usize) -> Result<usize, RuntimeError> {
        let program = self.program;
        let f = program
            .function(id)
            .ok_or(RuntimeError::UnknownFunction { pc, id })?;

        if self.calls.len() >= self.config.max_call_depth {
            return Err(RuntimeError::LimitExceeded {
                pc,
                what: "call depth",
                limit: self.config.max_call_depth,
            });
        }

        // Arguments were evaluated and pushed left to right.
        let mut frame = vec![Value::NULL; f.arity()];
        for slot in frame.iter_mut().rev() {
            *slot = self.pop(pc, Opcode::Call)?;
        }

        let mut chain = self.chain.clone();
        chain.push(frame);
        let caller = std::mem::replace(&mut self.chain, chain);
        self.calls.push(CallRecord {
            return_addr,
            chain: caller,
            function: id,
        });

        tracing::trace!(function = %f.name, depth = self.calls.len(), "call");
        Ok(f.entry as usize)
    }

    fn ret(&mut self, pc: usize, value: Value) -> Result<usize, RuntimeError> {
        let record = self.calls.pop().ok_or(RuntimeError::EmptyCallStack { pc })?;
        self.chain = record.chain;
        self.push(pc, value)?;

        tracing::trace!(function = record.function, depth = self.calls.len(), "return");
        Ok(record.return_addr)
    }

    fn call_external(&mut self, pc: usize, index: usize) -> Result<(), RuntimeError> {
        let program = self.program;
        let name = match program.constants.get(index) {
            Some(Constant::Str(name)) => name,
            _ => return Err(RuntimeError::BadConstant { pc, index }),
        };
        let externals = self.externals;
        let ext = externals
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownExternal {
                pc,
                name: name.clone(),
            })?;

        let mut args = Vec::with_capacity(ext.arity);
        for _ in 0..ext.arity {
            args.push(self.pop(pc, Opcode::CallPrimitive)?);
        }
        args.reverse();

        ext.call(&args).map_err(|message| RuntimeError::External {
            pc,
            name: name.clone(),
            message,
        })?;
        self.push(pc, Value::NULL)
    }

    // Stack operations

    fn push(&mut self, pc: usize, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.max_stack_size {
            return Err(RuntimeError::LimitExceeded {
                pc,
                what: "stack size",
                limit: self.config.max_stack_size,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, pc: usize, op: Opcode) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or(RuntimeError::StackUnderflow { pc, op })
    }
}

fn binary(pc: usize, op: Opcode, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match op {
        Opcode::BinaryEq => return Ok(Value::bool(a.equals(b))),
        Opcode::BinaryNe => return Ok(Value::bool(!a.equals(b))),
        _ => {}
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numeric(pc, op, *x, *y),
        (Value::Str(x), Value::Str(y)) => match op {
            Opcode::BinaryAdd => {
                let mut s = String::with_capacity(x.len() + y.len());
                s.push_str(x);
                s.push_str(y);
                Ok(Value::Str(Rc::from(s)))
            }
            Opcode::BinaryLt => Ok(Value::bool(x < y)),
            Opcode::BinaryGe => Ok(Value::bool(x >= y)),
            _ => Err(operand_error(pc, op, a, b)),
        },
        _ => Err(operand_error(pc, op, a, b)),
    }
}

fn operand_error(pc: usize, op: Opcode, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::type_error(
        pc,
        format!(
            "cannot apply '{}' to {} and {}",
            symbol(op),
            a.type_name(),
            b.type_name()
        ),
    )
}

fn numeric(pc: usize, op: Opcode, x: Number, y: Number) -> Result<Value, RuntimeError> {
    use Number::Int;
    let overflow = RuntimeError::Arithmetic {
        pc,
        symbol: symbol(op),
    };

    let value = match op {
        Opcode::BinaryAdd | Opcode::BinarySub | Opcode::BinaryMul => match (x, y) {
            (Int(a), Int(b)) => {
                let r = match op {
                    Opcode::BinaryAdd => a.checked_add(b),
                    Opcode::BinarySub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                Value::int(r.ok_or(overflow)?)
            }
            _ => {
                let (a, b) = (x.as_f64(), y.as_f64());
                Value::float(match op {
                    Opcode::BinaryAdd => a + b,
                    Opcode::BinarySub => a - b,
                    _ => a * b,
                })
            }
        },
        Opcode::BinaryDiv => {
            if y.is_zero() {
                return Err(RuntimeError::DivisionByZero { pc });
            }
            Value::float(x.as_f64() / y.as_f64())
        }
        Opcode::BinaryMod => {
            if y.is_zero() {
                return Err(RuntimeError::DivisionByZero { pc });
            }
            match (x, y) {
                (Int(a), Int(b)) => Value::int(floor_mod_int(a, b).ok_or(overflow)?),
                _ => Value::float(floor_mod_float(x.as_f64(), y.as_f64())),
            }
        }
        Opcode::BinaryPow => match (x, y) {
            (Int(a), Int(b)) if b >= 0 => {
                let exp = u32::try_from(b).map_err(|_| overflow.clone())?;
                Value::int(a.checked_pow(exp).ok_or(overflow)?)
            }
            _ => Value::float(x.as_f64().powf(y.as_f64())),
        },
        Opcode::BinaryLt => Value::bool(match (x, y) {
            (Int(a), Int(b)) => a < b,
            _ => x.as_f64() < y.as_f64(),
        }),
        Opcode::BinaryGe => Value::bool(match (x, y) {
            (Int(a), Int(b)) => a >= b,
            _ => x.as_f64() >= y.as_f64(),
        }),
        _ => {
            return Err(RuntimeError::type_error(
                pc,
                format!("{} is not a binary operator", op),
            ));
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::Compiler;
    use crate::bytecode::ir::FunctionDesc;
    use crate::frontend::{lexer::Lexer, parser::Parser};
    use std::cell::RefCell;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn compile(src: &str, externals: &Externals) -> ProgramBc {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        Compiler::new(&externals.signatures())
            .compile(&program)
            .unwrap()
    }

    /// Run source and return printed output and stats.
    fn run_with(
        src: &str,
        externals: &Externals,
        config: VmConfig,
    ) -> Result<(String, VmStats), RuntimeError> {
        let bc = compile(src, externals);
        let mut out = Vec::new();
        let stats = {
            let mut vm = Vm::new(&bc, externals)
                .with_config(config)
                .with_output(&mut out);
            let stats = vm.run()?;
            assert!(vm.stack().is_empty(), "stack not empty: {:?}", vm.stack());
            assert_eq!(vm.call_depth(), 0);
            stats
        };
        Ok((String::from_utf8(out).unwrap(), stats))
    }

    fn run_src(src: &str) -> String {
        run_with(src, &Externals::new(), VmConfig::default())
            .unwrap()
            .0
    }

    fn run_err(src: &str) -> RuntimeError {
        run_with(src, &Externals::new(), VmConfig::default()).unwrap_err()
    }

    fn raw(code: Vec<u32>) -> ProgramBc {
        ProgramBc {
            code,
            ..ProgramBc::new()
        }
    }

    fn run_raw(bc: &ProgramBc) -> Result<VmStats, RuntimeError> {
        let externals = Externals::new();
        let mut sink = Vec::new();
        Vm::new(bc, &externals).with_output(&mut sink).run()
    }

    // ============================================================
    // Programs
    // ============================================================

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(run_src("print(1 + 2 * 3);"), "7\n");
    }

    #[test]
    fn test_assignment() {
        assert_eq!(run_src("var x = 10; x = x + 5; print(x);"), "15\n");
    }

    #[test]
    fn test_if_else() {
        assert_eq!(run_src("if (1 > 2) print(3); else print(4);"), "4\n");
        assert_eq!(run_src("if (2 >= 2) print(3); else print(4);"), "3\n");
    }

    #[test]
    fn test_print_joins_with_spaces() {
        assert_eq!(
            run_src("print(\"a\", 1, 2.5, true, null); print();"),
            "a 1 2.5 true null\n\n"
        );
    }

    #[test]
    fn test_nested_block_shadowing() {
        let src = r#"
            var x1 = 100;
            {
                var x1 = 200;
                {
                    var x1 = 300;
                    print("inner x1", x1);
                }
                print("middle x1", x1);
            }
            print("outer x1", x1);
        "#;
        assert_eq!(
            run_src(src),
            "inner x1 300\nmiddle x1 200\nouter x1 100\n"
        );
    }

    #[test]
    fn test_inner_assignment_reaches_outer() {
        assert_eq!(run_src("var a = 1; { a = 2; } print(a);"), "2\n");
    }

    #[test]
    fn test_mutual_recursion() {
        let src = r#"
            define odd = fun(n) { if (n == 0) return false; return even(n - 1); };
            define even = fun(n) { if (n == 0) return true; return odd(n - 1); };
            print("even(3)=", even(3));
            print("odd(3)=", odd(3));
        "#;
        assert_eq!(run_src(src), "even(3)= false\nodd(3)= true\n");
    }

    #[test]
    fn test_recursive_fib() {
        let src = "define fib = fun(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }; print(fib(15));";
        assert_eq!(run_src(src), "610\n");
    }

    #[test]
    fn test_argument_order() {
        let src = "define sub = fun(a, b) { return a - b; }; print(sub(10, 3));";
        assert_eq!(run_src(src), "7\n");
    }

    #[test]
    fn test_arguments_are_evaluated_left_to_right() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut ext = Externals::new();
        ext.register("mark", 1, move |args| {
            sink.borrow_mut().push(args[0].to_string());
            Ok(())
        });

        let src = r#"
            define second = fun(a, b, c) { return b; };
            print(second(mark("a"), "b", mark("c")));
            var g = second;
            print(g(1, mark("d"), mark("e")));
        "#;
        let (out, _) = run_with(src, &ext, VmConfig::default()).unwrap();
        assert_eq!(out, "b\nnull\n");
        assert_eq!(*log.borrow(), vec!["a", "c", "d", "e"]);
    }

    #[test]
    fn test_implicit_return_is_null() {
        assert_eq!(run_src("define f = fun() { }; print(f());"), "null\n");
        assert_eq!(run_src("define f = fun() { return; }; print(f());"), "null\n");
    }

    #[test]
    fn test_while_break_continue() {
        let src = r#"
            var i = 0;
            var sum = 0;
            while (true) {
                i = i + 1;
                if (i > 10) break;
                if (i % 2 == 0) { continue; }
                sum = sum + i;
            }
            print(sum, i);
        "#;
        assert_eq!(run_src(src), "25 11\n");
    }

    #[test]
    fn test_nested_loops_keep_their_own_jumps() {
        let src = r#"
            var i = 0;
            while (i < 3) {
                var j = 0;
                while (true) {
                    j = j + 1;
                    if (j == 2) break;
                }
                print(i, j);
                i = i + 1;
            }
        "#;
        assert_eq!(run_src(src), "0 2\n1 2\n2 2\n");
    }

    #[test]
    fn test_short_circuit_skips_rhs() {
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let mut ext = Externals::new();
        ext.register("touch", 0, move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let src = "print(false && touch()); print(true || touch()); print(true && touch());";
        let (out, _) = run_with(src, &ext, VmConfig::default()).unwrap();
        assert_eq!(out, "false\ntrue\nnull\n");
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_function_values() {
        let src = r#"
            define twice = fun(f, x) { return f(f(x)); };
            define inc = fun(n) { return n + 1; };
            print(twice(inc, 5));
            var sq = fun(x) { return x * x; };
            print(sq(7), fun(a) { return a; }(9));
        "#;
        assert_eq!(run_src(src), "7\n49 9\n");
    }

    #[test]
    fn test_values_and_operators() {
        assert_eq!(run_src("print(7 / 2, 6 / 3);"), "3.5 2.0\n");
        assert_eq!(run_src("print(-7 % 3, 7 % -3, 7.5 % 2);"), "2 -2 1.5\n");
        assert_eq!(run_src("print(1 == 1.0, 1 != 2, \"a\" == \"a\", null == false);"), "true true true false\n");
        assert_eq!(run_src("print(\"ab\" + \"cd\", \"a\" < \"b\");"), "abcd true\n");
        assert_eq!(run_src("print(!0, !\"\", !1, -2.5);"), "true true false -2.5\n");
        assert_eq!(run_src("print(1 + 0.5, 2 * 1.5);"), "1.5 3.0\n");
    }

    #[test]
    fn test_externals_receive_arguments_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut ext = Externals::new();
        ext.register("pair", 2, move |args| {
            sink.borrow_mut().push(format!("{} {}", args[0], args[1]));
            Ok(())
        });

        let (_, stats) = run_with("pair(1, \"two\"); pair(3, 4);", &ext, VmConfig::default()).unwrap();
        assert_eq!(*log.borrow(), vec!["1 two".to_string(), "3 4".to_string()]);
        assert_eq!(stats.operand.pushes, stats.operand.pops);
    }

    #[test]
    fn test_stats() {
        let (_, stats) = run_with(
            "define f = fun(n) { if (n == 0) return 0; return f(n - 1); }; f(4);",
            &Externals::new(),
            VmConfig::default(),
        )
        .unwrap();
        assert_eq!(stats.calls.pushes, 5);
        assert_eq!(stats.calls.pops, 5);
        assert_eq!(stats.calls.max_depth, 5);
        assert_eq!(stats.operand.pushes, stats.operand.pops);
        assert!(stats.steps > 0);
    }

    // ============================================================
    // Errors
    // ============================================================

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(run_err("print(1 / 0);"), RuntimeError::DivisionByZero { .. }));
        assert!(matches!(run_err("print(1 % 0);"), RuntimeError::DivisionByZero { .. }));
        assert!(matches!(run_err("print(1.5 / 0.0);"), RuntimeError::DivisionByZero { .. }));
    }

    #[test]
    fn test_type_errors() {
        let err = run_err("print(1 + \"a\");");
        assert!(err.to_string().contains("cannot apply '+' to integer and string"), "{}", err);
        assert!(matches!(run_err("print(-\"a\");"), RuntimeError::Type { .. }));
        assert!(matches!(run_err("print(true < false);"), RuntimeError::Type { .. }));
    }

    #[test]
    fn test_integer_overflow() {
        let err = run_err("print(9223372036854775807 + 1);");
        assert!(matches!(err, RuntimeError::Arithmetic { symbol: "+", .. }));
        let err = run_err("print(2 ^ 64);");
        assert!(matches!(err, RuntimeError::Arithmetic { symbol: "^", .. }));
    }

    #[test]
    fn test_pow() {
        assert_eq!(run_src("print(2 ^ 10, 2 ^ -1, 2.5 ^ 2, 2 * 3 ^ 2);"), "1024 0.5 6.25 18\n");
    }

    #[test]
    fn test_call_value_checks() {
        assert!(matches!(
            run_err("var x = \"f\"; x();"),
            RuntimeError::NotCallable { type_name: "string", .. }
        ));
        assert!(matches!(
            run_err("var g = fun(a) { return a; }; g();"),
            RuntimeError::ArityMismatch { expected: 1, found: 0, .. }
        ));
        assert!(matches!(
            run_err("var n = 7; n();"),
            RuntimeError::UnknownFunction { id: 7, .. }
        ));
    }

    #[test]
    fn test_external_failure() {
        let mut ext = Externals::new();
        ext.register("fail", 0, |_| Err("no pen".to_string()));
        let err = run_with("fail();", &ext, VmConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "at 2: external 'fail' failed: no pen");
    }

    #[test]
    fn test_unknown_external_at_runtime() {
        let mut ext = Externals::new();
        ext.register("ghost", 0, |_| Ok(()));
        let bc = compile("ghost();", &ext);
        let err = run_raw(&bc).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownExternal { ref name, .. } if name == "ghost"));
    }

    #[test]
    fn test_call_depth_limit() {
        let config = VmConfig::default().with_max_call_depth(50);
        let err = run_with(
            "define f = fun(n) { return f(n + 1); }; f(0);",
            &Externals::new(),
            config,
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::LimitExceeded { what: "call depth", limit: 50, .. }));
    }

    #[test]
    fn test_stack_size_limit() {
        let config = VmConfig::default().with_max_stack_size(2);
        let err = run_with("print(1 + (2 + (3 + 4)));", &Externals::new(), config).unwrap_err();
        assert!(matches!(err, RuntimeError::LimitExceeded { what: "stack size", .. }));
    }

    #[test]
    fn test_raw_bytecode_errors() {
        assert_eq!(
            run_raw(&raw(vec![200])).unwrap_err(),
            RuntimeError::UnknownOpcode { pc: 0, code: 200 }
        );
        assert_eq!(
            run_raw(&raw(vec![13, 1, 6, 0])).unwrap_err(),
            RuntimeError::TruncatedInstruction {
                pc: 2,
                op: Opcode::StoreVar
            }
        );
        assert_eq!(
            run_raw(&raw(vec![5, 0, 0])).unwrap_err(),
            RuntimeError::ScopeOutOfRange {
                pc: 0,
                depth: 0,
                slot: 0
            }
        );
        assert_eq!(
            run_raw(&raw(vec![13, 1, 5, 1, 0])).unwrap_err(),
            RuntimeError::ScopeOutOfRange {
                pc: 2,
                depth: 1,
                slot: 0
            }
        );
        assert_eq!(
            run_raw(&raw(vec![16])).unwrap_err(),
            RuntimeError::EmptyCallStack { pc: 0 }
        );
        assert_eq!(
            run_raw(&raw(vec![14])).unwrap_err(),
            RuntimeError::NoScope { pc: 0 }
        );
        assert_eq!(
            run_raw(&raw(vec![12])).unwrap_err(),
            RuntimeError::StackUnderflow {
                pc: 0,
                op: Opcode::Pop
            }
        );
    }

    #[test]
    fn test_conditional_jumps_test_exact_booleans() {
        // LOAD_CONST 0 (the integer 0); JMP_FALSE 7; LOAD_TRUE; PRINT_ITEM; PRINT_NEWLINE
        let bc = ProgramBc {
            code: vec![1, 0, 11, 7, 3, 7, 8],
            constants: vec![Constant::Int(0)],
            ..ProgramBc::new()
        };
        let externals = Externals::new();
        let mut out = Vec::new();
        Vm::new(&bc, &externals).with_output(&mut out).run().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "true\n");
    }

    #[test]
    fn test_callee_runs_on_a_copy_of_the_caller_chain() {
        // main: x = 42; print(f(), x)
        // f: reads x through depth 1, overwrites it with 7, returns the old value
        let bc = ProgramBc {
            code: vec![
                13, 1, // ENTER_SCOPE 1
                1, 0, // LOAD_CONST 42
                6, 0, 0, // STORE_VAR 0 0
                15, 0, // CALL 0
                7, // PRINT_ITEM
                5, 0, 0, // LOAD_VAR 0 0
                7, // PRINT_ITEM
                8, // PRINT_NEWLINE
                9, 26, // JMP end
                5, 1, 0, // f: LOAD_VAR 1 0
                1, 1, // LOAD_CONST 7
                6, 1, 0, // STORE_VAR 1 0
                17, // RETURN_VALUE
            ],
            constants: vec![Constant::Int(42), Constant::Int(7)],
            functions: vec![FunctionDesc {
                id: 0,
                name: "f".to_string(),
                params: vec![],
                entry: 17,
                end: 26,
            }],
            ..ProgramBc::new()
        };
        let externals = Externals::new();
        let mut out = Vec::new();
        let stats = Vm::new(&bc, &externals).with_output(&mut out).run().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "42 42\n");
        assert_eq!(stats.calls.max_depth, 1);
    }
}
