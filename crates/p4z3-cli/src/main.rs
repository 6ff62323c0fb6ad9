//! `p4z3` command-line driver.
//!
//! Loads a [`p4z3_ast::Program`] from a JSON file (parsing, type
//! resolution, and the SMT backend proper are out of this engine's scope,
//! §1/§6 — this binary only wires a pre-built `Program` to the evaluator)
//! and runs every entry point, printing the resulting `ControlState` as a
//! flattened symbolic-expression map.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::{Parser, Subcommand};

use p4z3_ast::{Program, SourceLocation};
use p4z3_core::interpreter::eval;
use p4z3_core::{evaluate_entry_point, EvaluatorConfig, State, Value};
use p4z3_smt::{Sort, Term, TermContext, TermNode};

#[derive(Parser)]
#[command(name = "p4z3", about = "Symbolic evaluator for P4-family parsers and controls")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every entry point in a program, printing each one's
    /// resulting ControlState.
    Eval {
        /// Path to a JSON-serialized `p4z3_ast::Program`.
        #[arg(short, long)]
        program: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Eval { program } => run_eval(&program),
    };
    process::exit(exit_code);
}

fn run_eval(path: &PathBuf) -> i32 {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(err) => {
            eprintln!("failed to read {}: {err}", path.display());
            return 1;
        }
    };
    let program: Program = match serde_json::from_str(&text) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("failed to parse {}: {err}", path.display());
            return 1;
        }
    };

    let ctx = Rc::new(TermContext::new());
    let mut had_error = false;

    for entry in program.entry_points() {
        tracing::info!(entry = %entry.name, "evaluating entry point");
        let mut state = State::new(Rc::clone(&ctx), EvaluatorConfig::default());
        if let Err(err) = bind_fresh_inputs(&program, &mut state, entry) {
            eprintln!("{}: {err}", entry.name);
            had_error = true;
            continue;
        }
        match evaluate_entry_point(&program, entry, &mut state) {
            Ok(Value::ControlState(vars)) => {
                println!("{}:", entry.name);
                for (name, term) in &vars {
                    println!("  {name} = {}", render_term(&ctx, term));
                }
            }
            Ok(other) => println!("{}: {other:?}", entry.name),
            Err(err) => {
                eprintln!("{}: {err}", entry.name);
                had_error = true;
            }
        }
    }

    if had_error {
        1
    } else {
        0
    }
}

/// Seeds every parameter of the entry point's callable with a fresh,
/// uniquely-named symbolic value, matching this engine's job of producing
/// expressions over symbolic program inputs rather than concrete ones.
fn bind_fresh_inputs(program: &Program, state: &mut State, entry: &p4z3_ast::EntryPoint) -> Result<(), p4z3_core::EvalError> {
    let decl = program.get(entry.callable).map_err(|e| p4z3_core::EvalError::TypeNotFound { name: e.to_string(), loc: SourceLocation::synthetic() })?;
    let callable = match decl {
        p4z3_ast::Decl::Function(c) => c,
        _ => return Ok(()),
    };
    for param in &callable.params {
        let value = eval::undefined_value_for(state, program, &param.ty, SourceLocation::synthetic())?;
        let resolved = program.resolve_type(&param.ty).map_err(|e| p4z3_core::EvalError::TypeNotFound { name: e.to_string(), loc: SourceLocation::synthetic() })?;
        state.declare_var(&param.name, value, resolved);
    }
    Ok(())
}

fn render_term(ctx: &TermContext, term: &Term) -> String {
    let simplified = ctx.simplify(term);
    render(&simplified)
}

fn render(term: &Term) -> String {
    match term.as_ref() {
        TermNode::BoolConst(b) => b.to_string(),
        TermNode::BvConst { width, value } => format!("(_ bv{value} {width})"),
        TermNode::IntConst(v) => v.to_string(),
        TermNode::Symbol { name, sort } => match sort {
            Sort::Bool | Sort::Int => name.clone(),
            Sort::Bv(w) => format!("{name}:bv{w}"),
        },
        TermNode::Not(t) => format!("(not {})", render(t)),
        TermNode::BvNot(t) => format!("(bvnot {})", render(t)),
        TermNode::Neg(t) => format!("(bvneg {})", render(t)),
        TermNode::IntNeg(t) => format!("(- {})", render(t)),
        TermNode::Bin { op, lhs, rhs } => format!("({op:?} {} {})", render(lhs), render(rhs)),
        TermNode::Ite { cond, then_branch, else_branch } => {
            format!("(ite {} {} {})", render(cond), render(then_branch), render(else_branch))
        }
        TermNode::ZeroExtend { term, extra } => format!("((_ zero_extend {extra}) {})", render(term)),
        TermNode::SignExtend { term, extra } => format!("((_ sign_extend {extra}) {})", render(term)),
        TermNode::Extract { term, hi, lo } => format!("((_ extract {hi} {lo}) {})", render(term)),
        TermNode::Concat { lhs, rhs } => format!("(concat {} {})", render(lhs), render(rhs)),
        TermNode::IntToBv { term, width } => format!("((_ int2bv {width}) {})", render(term)),
        TermNode::BvToInt { term } => format!("(bv2int {})", render(term)),
    }
}
