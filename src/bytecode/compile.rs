use std::collections::{HashMap, HashSet};

use crate::{
    bytecode::{
        compile_error::CompileError,
        ir::{Constant, FunctionDesc, PLACEHOLDER, ProgramBc, ScopeKind, ScopeLayout},
        op::Opcode,
    },
    lang::{
        node::{BinaryOp, Expr, Literal, Stmt, UnaryOp},
        program::Program,
    },
};

/// Compile-time view of a host external: its name and argument count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSig {
    pub name: String,
    pub arity: usize,
}

impl ExternalSig {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

/// One open lexical scope.
struct Scope {
    /// Index into `ProgramBc::scopes`; the layout's names are the slots.
    layout: usize,
    /// Slots bound by `define f = fun ...`, mapped to the function id.
    functions: HashMap<usize, usize>,
}

impl Scope {
    fn new(layout: usize) -> Self {
        Self {
            layout,
            functions: HashMap::new(),
        }
    }
}

/// Per-body compilation state. A function body gets a fresh context that
/// holds only its parameter scope.
struct Context {
    scopes: Vec<Scope>,
    function: Option<usize>,
}

/// Jump sites of the innermost enclosing `while`.
struct LoopJumps {
    /// Number of open scopes when the loop started.
    depth: usize,
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

enum Resolved {
    Local {
        depth: usize,
        slot: usize,
        function: Option<usize>,
    },
    Function(usize),
    External(usize),
}

fn word(n: usize) -> Result<u32, CompileError> {
    u32::try_from(n)
        .ok()
        .filter(|&w| w != PLACEHOLDER)
        .ok_or_else(|| CompileError::Internal(format!("operand {} does not fit in a code word", n)))
}

pub struct Compiler<'e> {
    externals: &'e [ExternalSig],

    /// Output bytecode program
    program: ProgramBc,

    /// Function name -> id. Names are program-wide.
    function_ids: HashMap<String, usize>,

    /// Functions whose defining statement has been compiled.
    claimed: HashSet<usize>,
}

impl<'e> Compiler<'e> {
    pub fn new(externals: &'e [ExternalSig]) -> Self {
        Self {
            externals,
            program: ProgramBc::new(),
            function_ids: HashMap::new(),
            claimed: HashSet::new(),
        }
    }

    /// Compiles a whole program. The top level is compiled as a block, so the
    /// emitted code starts with `ENTER_SCOPE` and ends with `LEAVE_SCOPE`.
    pub fn compile(mut self, program: &Program) -> Result<ProgramBc, CompileError> {
        self.register_functions(&program.statements)?;

        let mut ctx = Context {
            scopes: Vec::new(),
            function: None,
        };
        self.compile_block(&program.statements, &mut ctx, None)?;

        tracing::debug!(
            code = self.program.code.len(),
            constants = self.program.constants.len(),
            functions = self.program.functions.len(),
            scopes = self.program.scopes.len(),
            "compiled program"
        );
        Ok(self.program)
    }

    // =========================================================================
    // Pre-pass
    // =========================================================================

    /// Registers every `define name = fun ...` reachable through the program
    /// and nested blocks, so functions can be called before their definition.
    fn register_functions(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for stmt in stmts {
            match stmt {
                Stmt::Define {
                    name,
                    value: Expr::Fun { params, .. },
                } => {
                    self.register_function(name, params)?;
                }
                Stmt::Block(inner) => self.register_functions(inner)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn register_function(&mut self, name: &str, params: &[String]) -> Result<usize, CompileError> {
        if self.function_ids.contains_key(name) {
            return Err(CompileError::DuplicateFunction {
                name: name.to_string(),
            });
        }
        let id = self.program.functions.len();
        self.program.functions.push(FunctionDesc {
            id,
            name: name.to_string(),
            params: params.to_vec(),
            entry: PLACEHOLDER,
            end: PLACEHOLDER,
        });
        self.function_ids.insert(name.to_string(), id);
        Ok(id)
    }

    /// Takes ownership of a pre-registered function for its defining
    /// statement, registering it now if the pre-pass did not see it.
    fn claim_function(&mut self, name: &str, params: &[String]) -> Result<usize, CompileError> {
        let id = match self.function_ids.get(name) {
            Some(&id) => id,
            None => self.register_function(name, params)?,
        };
        if !self.claimed.insert(id) {
            return Err(CompileError::DuplicateFunction {
                name: name.to_string(),
            });
        }
        Ok(id)
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn here(&self) -> usize {
        self.program.code.len()
    }

    fn emit(&mut self, op: Opcode, operands: &[u32]) {
        debug_assert_eq!(op.arity(), operands.len(), "operand count for {}", op);
        self.program.code.push(op.code());
        self.program.code.extend_from_slice(operands);
    }

    /// Emits a jump with a placeholder target; returns the operand position.
    fn emit_jump(&mut self, op: Opcode) -> usize {
        self.program.code.push(op.code());
        self.program.code.push(PLACEHOLDER);
        self.here() - 1
    }

    fn patch(&mut self, operand_pos: usize, value: usize) -> Result<(), CompileError> {
        self.program.code[operand_pos] = word(value)?;
        Ok(())
    }

    fn constant(&mut self, constant: Constant) -> Result<u32, CompileError> {
        let index = match self.program.constants.iter().position(|c| c.same(&constant)) {
            Some(i) => i,
            None => {
                self.program.constants.push(constant);
                self.program.constants.len() - 1
            }
        };
        word(index)
    }

    fn load_function_id(&mut self, id: usize) -> Result<(), CompileError> {
        let k = self.constant(Constant::Int(id as i64))?;
        self.emit(Opcode::LoadConst, &[k]);
        Ok(())
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    /// Records a layout starting at `start`; its `end` is set when the scope
    /// closes.
    fn new_layout(
        &mut self,
        kind: ScopeKind,
        names: Vec<String>,
        start: usize,
    ) -> Result<usize, CompileError> {
        self.program.scopes.push(ScopeLayout {
            kind,
            names,
            start: word(start)?,
            end: PLACEHOLDER,
        });
        Ok(self.program.scopes.len() - 1)
    }

    /// Adds `name` to the innermost scope and returns its slot.
    fn define_var(&mut self, ctx: &Context, name: &str) -> Result<usize, CompileError> {
        let scope = ctx
            .scopes
            .last()
            .ok_or_else(|| CompileError::Internal("no open scope".to_string()))?;
        let names = &mut self.program.scopes[scope.layout].names;
        if names.iter().any(|n| n == name) {
            return Err(CompileError::redefinition(name));
        }
        names.push(name.to_string());
        Ok(names.len() - 1)
    }

    /// Lexical scopes innermost outward, then functions, then externals.
    fn resolve(&self, ctx: &Context, name: &str) -> Option<Resolved> {
        for (depth, scope) in ctx.scopes.iter().rev().enumerate() {
            let names = &self.program.scopes[scope.layout].names;
            if let Some(slot) = names.iter().position(|n| n == name) {
                return Some(Resolved::Local {
                    depth,
                    slot,
                    function: scope.functions.get(&slot).copied(),
                });
            }
        }
        if let Some(&id) = self.function_ids.get(name) {
            return Some(Resolved::Function(id));
        }
        self.externals
            .iter()
            .position(|e| e.name == name)
            .map(Resolved::External)
    }

    fn compile_block(
        &mut self,
        stmts: &[Stmt],
        ctx: &mut Context,
        mut loops: Option<&mut LoopJumps>,
    ) -> Result<(), CompileError> {
        let layout = self.new_layout(ScopeKind::Block, Vec::new(), self.here())?;
        self.program.code.push(Opcode::EnterScope.code());
        self.program.code.push(PLACEHOLDER);
        let size_pos = self.here() - 1;

        ctx.scopes.push(Scope::new(layout));
        for stmt in stmts {
            self.compile_stmt(stmt, ctx, loops.as_deref_mut())?;
        }
        ctx.scopes.pop();

        let size = self.program.scopes[layout].names.len();
        self.patch(size_pos, size)?;
        self.emit(Opcode::LeaveScope, &[]);
        self.program.scopes[layout].end = word(self.here())?;
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_stmt(
        &mut self,
        stmt: &Stmt,
        ctx: &mut Context,
        mut loops: Option<&mut LoopJumps>,
    ) -> Result<(), CompileError> {
        match stmt {
            Stmt::Define {
                name,
                value: Expr::Fun { params, body },
            } => {
                let id = self.claim_function(name, params)?;
                self.compile_function(id, params, body)?;

                let slot = self.define_var(ctx, name)?;
                if let Some(scope) = ctx.scopes.last_mut() {
                    scope.functions.insert(slot, id);
                }
                self.load_function_id(id)?;
                self.emit(Opcode::StoreVar, &[0, word(slot)?]);
            }

            Stmt::Define { name, value } => {
                self.compile_expr(value, ctx)?;
                let slot = self.define_var(ctx, name)?;
                self.emit(Opcode::StoreVar, &[0, word(slot)?]);
            }

            Stmt::Assign { name, value } => match self.resolve(ctx, name) {
                Some(Resolved::Local {
                    depth,
                    slot,
                    function: None,
                }) => {
                    self.compile_expr(value, ctx)?;
                    self.emit(Opcode::StoreVar, &[word(depth)?, word(slot)?]);
                }
                Some(Resolved::External(_)) => {
                    return Err(CompileError::AssignToExternal { name: name.clone() });
                }
                Some(_) => {
                    return Err(CompileError::AssignToFunction { name: name.clone() });
                }
                None => return Err(CompileError::undefined(name)),
            },

            Stmt::Print(args) => {
                for arg in args {
                    self.compile_expr(arg, ctx)?;
                    self.emit(Opcode::PrintItem, &[]);
                }
                self.emit(Opcode::PrintNewline, &[]);
            }

            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(cond, ctx)?;
                let to_else = self.emit_jump(Opcode::JmpFalse);
                self.compile_stmt(then_branch, ctx, loops.as_deref_mut())?;

                match else_branch {
                    Some(else_branch) => {
                        let to_end = self.emit_jump(Opcode::Jmp);
                        self.patch(to_else, self.here())?;
                        self.compile_stmt(else_branch, ctx, loops)?;
                        self.patch(to_end, self.here())?;
                    }
                    None => self.patch(to_else, self.here())?,
                }
            }

            Stmt::While { cond, body } => {
                let start = self.here();
                self.compile_expr(cond, ctx)?;
                let to_end = self.emit_jump(Opcode::JmpFalse);

                let mut jumps = LoopJumps {
                    depth: ctx.scopes.len(),
                    breaks: Vec::new(),
                    continues: Vec::new(),
                };
                self.compile_stmt(body, ctx, Some(&mut jumps))?;
                self.emit(Opcode::Jmp, &[word(start)?]);

                let end = self.here();
                self.patch(to_end, end)?;
                for pos in jumps.breaks {
                    self.patch(pos, end)?;
                }
                for pos in jumps.continues {
                    self.patch(pos, start)?;
                }
            }

            Stmt::Break => {
                let jumps = loops.ok_or(CompileError::BreakOutsideLoop)?;
                self.leave_loop_scopes(ctx, jumps.depth);
                let pos = self.emit_jump(Opcode::Jmp);
                jumps.breaks.push(pos);
            }

            Stmt::Continue => {
                let jumps = loops.ok_or(CompileError::ContinueOutsideLoop)?;
                self.leave_loop_scopes(ctx, jumps.depth);
                let pos = self.emit_jump(Opcode::Jmp);
                jumps.continues.push(pos);
            }

            Stmt::Return(value) => {
                if ctx.function.is_none() {
                    return Err(CompileError::ReturnOutsideFunction);
                }
                match value {
                    Some(value) => {
                        self.compile_expr(value, ctx)?;
                        self.emit(Opcode::ReturnValue, &[]);
                    }
                    None => self.emit(Opcode::Return, &[]),
                }
            }

            Stmt::Block(stmts) => self.compile_block(stmts, ctx, loops)?,

            Stmt::Expr(expr) => {
                self.compile_expr(expr, ctx)?;
                self.emit(Opcode::Pop, &[]);
            }
        }
        Ok(())
    }

    /// One `LEAVE_SCOPE` per block opened since the loop started.
    fn leave_loop_scopes(&mut self, ctx: &Context, loop_depth: usize) {
        for _ in loop_depth..ctx.scopes.len() {
            self.emit(Opcode::LeaveScope, &[]);
        }
    }

    /// Emits `JMP end; <params layout> <body block> RETURN` and fills in the
    /// descriptor's `entry` and `end`.
    fn compile_function(
        &mut self,
        id: usize,
        params: &[String],
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        let skip = self.emit_jump(Opcode::Jmp);
        let entry = self.here();

        let mut seen = HashSet::new();
        for p in params {
            if !seen.insert(p.as_str()) {
                return Err(CompileError::redefinition(p));
            }
        }
        let layout =
            self.new_layout(ScopeKind::Params { function: id }, params.to_vec(), entry)?;

        let mut ctx = Context {
            scopes: vec![Scope::new(layout)],
            function: Some(id),
        };
        self.compile_block(body, &mut ctx, None)?;
        if !matches!(body.last(), Some(Stmt::Return(_))) {
            self.emit(Opcode::Return, &[]);
        }

        let end = self.here();
        self.patch(skip, end)?;
        self.program.scopes[layout].end = word(end)?;
        let desc = &mut self.program.functions[id];
        desc.entry = word(entry)?;
        desc.end = word(end)?;

        tracing::trace!(function = %desc.name, entry, end, "compiled function");
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expr(&mut self, expr: &Expr, ctx: &mut Context) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(lit) => match lit {
                Literal::Number(n) => {
                    let k = self.constant(Constant::from(*n))?;
                    self.emit(Opcode::LoadConst, &[k]);
                }
                Literal::String(s) => {
                    let k = self.constant(Constant::Str(s.clone()))?;
                    self.emit(Opcode::LoadConst, &[k]);
                }
                Literal::True => self.emit(Opcode::LoadTrue, &[]),
                Literal::False => self.emit(Opcode::LoadFalse, &[]),
                Literal::Null => self.emit(Opcode::LoadNull, &[]),
            },

            Expr::Ident(name) => match self.resolve(ctx, name) {
                Some(Resolved::Local { depth, slot, .. }) => {
                    self.emit(Opcode::LoadVar, &[word(depth)?, word(slot)?]);
                }
                Some(Resolved::Function(id)) => self.load_function_id(id)?,
                Some(Resolved::External(_)) => {
                    return Err(CompileError::ExternalAsValue { name: name.clone() });
                }
                None => return Err(CompileError::undefined(name)),
            },

            Expr::Unary { op, operand } => {
                self.compile_expr(operand, ctx)?;
                let op = match op {
                    UnaryOp::Neg => Opcode::UnaryNeg,
                    UnaryOp::Not => Opcode::UnaryNot,
                };
                self.emit(op, &[]);
            }

            Expr::Binary { op, lhs, rhs } => self.compile_binary(*op, lhs, rhs, ctx)?,

            Expr::Call { callee, args } => self.compile_call(callee, args, ctx)?,

            Expr::Fun { params, body } => {
                let id = self.program.functions.len();
                let name = format!("<anonymous@{}>", id);
                let id = self.register_function(&name, params)?;
                self.claimed.insert(id);
                self.compile_function(id, params, body)?;
                self.load_function_id(id)?;
            }
        }
        Ok(())
    }

    fn compile_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        ctx: &mut Context,
    ) -> Result<(), CompileError> {
        let simple = match op {
            BinaryOp::And | BinaryOp::Or => {
                // lhs; JMP_FALSE short; rhs; JMP end; short: LOAD_FALSE; end:
                let (test, constant) = if op == BinaryOp::And {
                    (Opcode::JmpFalse, Opcode::LoadFalse)
                } else {
                    (Opcode::JmpTrue, Opcode::LoadTrue)
                };
                self.compile_expr(lhs, ctx)?;
                let to_short = self.emit_jump(test);
                self.compile_expr(rhs, ctx)?;
                let to_end = self.emit_jump(Opcode::Jmp);
                self.patch(to_short, self.here())?;
                self.emit(constant, &[]);
                self.patch(to_end, self.here())?;
                return Ok(());
            }
            // `a > b` is `b < a`, `a <= b` is `b >= a`.
            BinaryOp::Gt | BinaryOp::LtEq => {
                self.compile_expr(rhs, ctx)?;
                self.compile_expr(lhs, ctx)?;
                let opcode = if op == BinaryOp::Gt {
                    Opcode::BinaryLt
                } else {
                    Opcode::BinaryGe
                };
                self.emit(opcode, &[]);
                return Ok(());
            }
            BinaryOp::Add => Opcode::BinaryAdd,
            BinaryOp::Sub => Opcode::BinarySub,
            BinaryOp::Mul => Opcode::BinaryMul,
            BinaryOp::Div => Opcode::BinaryDiv,
            BinaryOp::Mod => Opcode::BinaryMod,
            BinaryOp::Pow => Opcode::BinaryPow,
            BinaryOp::Eq => Opcode::BinaryEq,
            BinaryOp::NotEq => Opcode::BinaryNe,
            BinaryOp::Lt => Opcode::BinaryLt,
            BinaryOp::GtEq => Opcode::BinaryGe,
        };

        self.compile_expr(lhs, ctx)?;
        self.compile_expr(rhs, ctx)?;
        self.emit(simple, &[]);
        Ok(())
    }

    fn compile_args(&mut self, args: &[Expr], ctx: &mut Context) -> Result<(), CompileError> {
        for arg in args {
            self.compile_expr(arg, ctx)?;
        }
        Ok(())
    }

    /// Direct `CALL` for known functions, `CALL_PRIMITIVE` for externals, and
    /// `CALL_VALUE` when the callee is only known at run time.
    fn compile_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        ctx: &mut Context,
    ) -> Result<(), CompileError> {
        if let Expr::Ident(name) = callee {
            match self.resolve(ctx, name) {
                Some(Resolved::Local {
                    function: Some(id), ..
                })
                | Some(Resolved::Function(id)) => {
                    let expected = self.program.functions[id].arity();
                    if expected != args.len() {
                        return Err(CompileError::arity(name, expected, args.len()));
                    }
                    self.compile_args(args, ctx)?;
                    self.emit(Opcode::Call, &[word(id)?]);
                    return Ok(());
                }
                Some(Resolved::External(index)) => {
                    let expected = self.externals[index].arity;
                    if expected != args.len() {
                        return Err(CompileError::arity(name, expected, args.len()));
                    }
                    self.compile_args(args, ctx)?;
                    let k = self.constant(Constant::Str(name.clone()))?;
                    self.emit(Opcode::CallPrimitive, &[k]);
                    return Ok(());
                }
                Some(Resolved::Local { function: None, .. }) => {}
                None => return Err(CompileError::undefined(name)),
            }
        }

        self.compile_args(args, ctx)?;
        self.compile_expr(callee, ctx)?;
        self.emit(Opcode::CallValue, &[word(args.len())?]);
        Ok(())
    }
}
