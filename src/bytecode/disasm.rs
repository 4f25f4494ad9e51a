use crate::bytecode::ir::{Constant, ProgramBc, ScopeKind, ScopeLayout};
use crate::bytecode::op::Opcode;
use std::cmp::Reverse;
use std::fmt::Write;

/// Print disassembly of a bytecode program, with its constant pool and
/// function table.
pub fn print_bc(bc: &ProgramBc) {
    println!("=== BYTECODE PROGRAM ===\n");

    println!("constants ({}):", bc.constants.len());
    for (i, c) in bc.constants.iter().enumerate() {
        println!("  [{:>3}] {}", i, c);
    }
    println!();

    println!("functions ({}):", bc.functions.len());
    for f in &bc.functions {
        println!(
            "  #{:<3} {}({})  {:04}..{:04}",
            f.id,
            f.name,
            f.params.join(", "),
            f.entry,
            f.end
        );
    }
    println!();

    println!("════════════════════════════════════════");
    println!(" code: {} words", bc.code.len());
    println!("════════════════════════════════════════");
    for line in disassemble(bc).lines() {
        let addr = line.get(..4).and_then(|a| a.parse::<u32>().ok());
        if let Some(f) = bc.functions.iter().find(|f| Some(f.entry) == addr) {
            println!("      ┌── fun {}({})", f.name, f.params.join(", "));
        }
        println!("{}", line);
    }
}

/// Return disassembly as a String: one line per instruction,
/// `NNNN\tNAME[ operand ...]`, followed by a `; comment` where an operand
/// can be named.
pub fn disassemble(bc: &ProgramBc) -> String {
    let mut out = String::new();
    let code = &bc.code;
    let mut pc = 0;

    while pc < code.len() {
        let Some(op) = Opcode::from_u32(code[pc]) else {
            let _ = writeln!(out, "{:04}\t??? {}", pc, code[pc]);
            pc += 1;
            continue;
        };

        let end = (pc + 1 + op.arity()).min(code.len());
        let operands = &code[pc + 1..end];

        let _ = write!(out, "{:04}\t{}", pc, op.name());
        for operand in operands {
            let _ = write!(out, " {}", operand);
        }
        if operands.len() < op.arity() {
            let _ = write!(out, " <truncated>");
        } else if let Some(note) = annotate(bc, pc, op, operands) {
            let _ = write!(out, "\t; {}", note);
        }
        out.push('\n');
        pc = end;
    }

    out
}

fn annotate(bc: &ProgramBc, pc: usize, op: Opcode, operands: &[u32]) -> Option<String> {
    let arg = |i: usize| operands[i] as usize;
    match op {
        Opcode::LoadConst => bc.constants.get(arg(0)).map(|c| c.to_string()),
        Opcode::CallPrimitive => match bc.constants.get(arg(0)) {
            Some(Constant::Str(name)) => Some(name.clone()),
            _ => None,
        },
        Opcode::Call => bc.function(arg(0)).map(|f| f.name.clone()),
        Opcode::LoadVar | Opcode::StoreVar => {
            let chain = scope_chain_at(bc, pc);
            let depth = arg(0);
            let frame = chain.len().checked_sub(depth + 1).map(|i| chain[i])?;
            frame.names.get(arg(1)).cloned()
        }
        _ => None,
    }
}

/// The static frame chain live at `pc`, outermost first, cut at the
/// innermost function's parameter frame.
fn scope_chain_at(bc: &ProgramBc, pc: usize) -> Vec<&ScopeLayout> {
    let mut live: Vec<&ScopeLayout> = bc.scopes.iter().filter(|s| s.contains(pc)).collect();
    // A function's parameter frame and its body block start at the same
    // address; the parameter frame is the outer one.
    live.sort_by_key(|s| (s.start, Reverse(s.end), matches!(s.kind, ScopeKind::Block)));

    match live
        .iter()
        .rposition(|s| matches!(s.kind, ScopeKind::Params { .. }))
    {
        Some(i) => live.split_off(i),
        None => live,
    }
}
