use crate::bytecode::compile::ExternalSig;
use crate::bytecode::ir::{Constant, PLACEHOLDER, ProgramBc, ScopeKind};
use crate::bytecode::op::Opcode;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub addr: usize,
    pub op: Opcode,
    pub operands: Vec<u32>,
}

impl Instr {
    /// Address of the following instruction.
    pub fn next(&self) -> usize {
        self.addr + 1 + self.operands.len()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifyError {
    #[error("unknown opcode {code} at {pc}")]
    UnknownOpcode { pc: usize, code: u32 },

    #[error("truncated {op} at {pc}")]
    Truncated { pc: usize, op: Opcode },

    #[error("unpatched operand in {op} at {pc}")]
    Unpatched { pc: usize, op: Opcode },

    #[error("{op} at {pc} targets {target}, which is not an instruction")]
    BadTarget { pc: usize, op: Opcode, target: usize },

    #[error("{op} at {pc} refers to constant {index}, which is {reason}")]
    BadConstant {
        pc: usize,
        op: Opcode,
        index: usize,
        reason: &'static str,
    },

    #[error("{op} at {pc} refers to unknown function {id}")]
    UnknownFunction { pc: usize, op: Opcode, id: usize },

    #[error("CALL_PRIMITIVE at {pc} names unknown external '{name}'")]
    UnknownExternal { pc: usize, name: String },

    #[error("ENTER_SCOPE at {pc} opens {size} slot(s), but no block layout of that size starts there")]
    BadScope { pc: usize, size: usize },

    #[error("function '{name}' has entry {entry}, which is not an instruction")]
    BadFunction { name: String, entry: u32 },

    #[error("stack underflow at {pc}: {op} needs {needed} item(s), height is {height}")]
    Underflow {
        pc: usize,
        op: Opcode,
        needed: usize,
        height: usize,
    },

    #[error("stack height at {pc} is {found} on one path and {expected} on another")]
    HeightMismatch {
        pc: usize,
        expected: usize,
        found: usize,
    },

    #[error("program ends with {height} value(s) left on the stack")]
    Unbalanced { height: usize },
}

/// Splits a code stream into instructions.
pub fn decode(code: &[u32]) -> Result<Vec<Instr>, VerifyError> {
    let mut instrs = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let op = Opcode::from_u32(code[pc]).ok_or(VerifyError::UnknownOpcode {
            pc,
            code: code[pc],
        })?;
        let end = pc + 1 + op.arity();
        if end > code.len() {
            return Err(VerifyError::Truncated { pc, op });
        }
        instrs.push(Instr {
            addr: pc,
            op,
            operands: code[pc + 1..end].to_vec(),
        });
        pc = end;
    }
    Ok(instrs)
}

/// How an instruction moves the operand stack and where control goes next.
struct Effect {
    pops: usize,
    pushes: usize,
    jump: Option<usize>,
    falls_through: bool,
}

impl Effect {
    fn stack(pops: usize, pushes: usize) -> Self {
        Effect {
            pops,
            pushes,
            jump: None,
            falls_through: true,
        }
    }
}

fn effect(
    bc: &ProgramBc,
    externals: &[ExternalSig],
    instr: &Instr,
) -> Result<Effect, VerifyError> {
    use Opcode::*;
    let pc = instr.addr;
    let op = instr.op;
    let arg = |i: usize| instr.operands[i] as usize;

    let constant = |index: usize| {
        bc.constants.get(index).ok_or(VerifyError::BadConstant {
            pc,
            op,
            index,
            reason: "out of range",
        })
    };

    Ok(match op {
        LoadConst => {
            constant(arg(0))?;
            Effect::stack(0, 1)
        }
        LoadNull | LoadTrue | LoadFalse | LoadVar => Effect::stack(0, 1),
        StoreVar | PrintItem | Pop => Effect::stack(1, 0),
        PrintNewline | LeaveScope => Effect::stack(0, 0),
        EnterScope => {
            // frame size must agree with the recorded layout
            let size = arg(0);
            let known = bc.scopes.iter().any(|s| {
                matches!(s.kind, ScopeKind::Block) && s.start as usize == pc && s.names.len() == size
            });
            if !known {
                return Err(VerifyError::BadScope { pc, size });
            }
            Effect::stack(0, 0)
        }

        Jmp => Effect {
            pops: 0,
            pushes: 0,
            jump: Some(arg(0)),
            falls_through: false,
        },
        JmpTrue | JmpFalse => Effect {
            pops: 1,
            pushes: 0,
            jump: Some(arg(0)),
            falls_through: true,
        },

        Return => Effect {
            pops: 0,
            pushes: 0,
            jump: None,
            falls_through: false,
        },
        ReturnValue => Effect {
            pops: 1,
            pushes: 0,
            jump: None,
            falls_through: false,
        },

        Call => {
            let id = arg(0);
            let f = bc
                .function(id)
                .ok_or(VerifyError::UnknownFunction { pc, op, id })?;
            Effect::stack(f.arity(), 1)
        }
        CallValue => Effect::stack(arg(0) + 1, 1),
        CallPrimitive => {
            let index = arg(0);
            let Constant::Str(name) = constant(index)? else {
                return Err(VerifyError::BadConstant {
                    pc,
                    op,
                    index,
                    reason: "not a name",
                });
            };
            let sig = externals
                .iter()
                .find(|e| &e.name == name)
                .ok_or_else(|| VerifyError::UnknownExternal {
                    pc,
                    name: name.clone(),
                })?;
            Effect::stack(sig.arity, 1)
        }

        UnaryNeg | UnaryNot => Effect::stack(1, 1),
        BinaryAdd | BinarySub | BinaryMul | BinaryDiv | BinaryMod | BinaryPow | BinaryEq
        | BinaryNe | BinaryLt | BinaryGe => Effect::stack(2, 1),
    })
}

/// Checks that a program is well formed before it is run.
///
/// Every operand must be patched and in range, and the operand stack height
/// must be the same on every path into an instruction. The top level starts
/// at height 0 and must end at height 0; each function body is checked on
/// its own, starting at height 0 at its entry.
pub fn verify(bc: &ProgramBc, externals: &[ExternalSig]) -> Result<(), VerifyError> {
    let instrs = decode(&bc.code)?;

    let len = bc.code.len();
    // index of the instruction starting at each address
    let mut at: Vec<Option<usize>> = vec![None; len + 1];
    for (i, instr) in instrs.iter().enumerate() {
        at[instr.addr] = Some(i);
        if instr.operands.contains(&PLACEHOLDER) {
            return Err(VerifyError::Unpatched {
                pc: instr.addr,
                op: instr.op,
            });
        }
    }

    let mut roots = vec![0usize];
    for f in &bc.functions {
        let entry = f.entry as usize;
        if entry >= len || at[entry].is_none() {
            return Err(VerifyError::BadFunction {
                name: f.name.clone(),
                entry: f.entry,
            });
        }
        roots.push(entry);
    }

    let mut heights: Vec<Option<usize>> = vec![None; len + 1];
    let mut work: Vec<(usize, usize)> = roots.into_iter().map(|r| (r, 0)).collect();

    while let Some((pc, height)) = work.pop() {
        if let Some(expected) = heights[pc] {
            if expected != height {
                return Err(VerifyError::HeightMismatch {
                    pc,
                    expected,
                    found: height,
                });
            }
            continue;
        }
        heights[pc] = Some(height);

        if pc == len {
            if height != 0 {
                return Err(VerifyError::Unbalanced { height });
            }
            continue;
        }

        let Some(index) = at[pc] else {
            continue;
        };
        let instr = &instrs[index];
        let e = effect(bc, externals, instr)?;

        if height < e.pops {
            return Err(VerifyError::Underflow {
                pc,
                op: instr.op,
                needed: e.pops,
                height,
            });
        }
        let after = height - e.pops + e.pushes;

        if let Some(target) = e.jump {
            let valid = target == len || at.get(target).is_some_and(|i| i.is_some());
            if !valid {
                return Err(VerifyError::BadTarget {
                    pc,
                    op: instr.op,
                    target,
                });
            }
            work.push((target, after));
        }
        if e.falls_through {
            work.push((instr.next(), after));
        }
    }

    tracing::trace!(instructions = instrs.len(), "verified bytecode");
    Ok(())
}
