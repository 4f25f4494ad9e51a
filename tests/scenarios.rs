use cilly::bytecode::compile_error::CompileError;
use cilly::bytecode::image;
use cilly::pipeline::{self, Error};
use cilly::runtime::{Externals, VmStats, turtle};
use cilly::VmConfig;
use std::cell::RefCell;
use std::rc::Rc;

fn run_with(src: &str, externals: &Externals) -> (String, VmStats) {
    let mut out = Vec::new();
    let stats = pipeline::run_source(src, externals, &mut out)
        .unwrap_or_else(|e| panic!("{} error: {}", e.kind(), e));
    (String::from_utf8(out).unwrap(), stats)
}

fn run_src(src: &str) -> String {
    run_with(src, &Externals::new()).0
}

fn run_err(src: &str) -> Error {
    pipeline::run_source(src, &Externals::new(), Vec::new()).unwrap_err()
}

// ============================================================
// Scenarios
// ============================================================

#[test]
fn scenario_precedence() {
    assert_eq!(run_src("print(1 + 2 * 3);"), "7\n");
}

#[test]
fn scenario_assignment() {
    assert_eq!(run_src("var x = 10; x = x + 5; print(x);"), "15\n");
}

#[test]
fn scenario_if_else() {
    assert_eq!(run_src("if (1 > 2) print(3); else print(4);"), "4\n");
}

#[test]
fn scenario_nested_scopes() {
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
    assert_eq!(run_src(src), "inner x1 300\nmiddle x1 200\nouter x1 100\n");
}

#[test]
fn scenario_mutual_recursion() {
    let src = r#"
        define odd = fun(n) {
            if (n == 0) return false;
            return even(n - 1);
        };
        define even = fun(n) {
            if (n == 0) return true;
            return odd(n - 1);
        };
        print("even(3)=", even(3));
        print("odd(3)=", odd(3));
    "#;
    assert_eq!(run_src(src), "even(3)= false\nodd(3)= true\n");
}

// ============================================================
// Properties
// ============================================================

#[test]
fn test_pipeline_is_deterministic() {
    let src = "define f = fun(a, b) { return a * b + 1; }; var i = 0; while (i < 3) { print(f(i, 2.5)); i = i + 1; }";
    let a = pipeline::compile(src, &Externals::new()).unwrap();
    let b = pipeline::compile(src, &Externals::new()).unwrap();
    assert_eq!(a, b);
    assert_eq!(run_src(src), run_src(src));
}

#[test]
fn test_inner_variable_is_gone_after_block() {
    let err = run_err("{ var inner = 1; } print(inner);");
    assert_eq!(err.kind(), "compile");
    assert!(
        matches!(err, Error::Compile(CompileError::UndefinedName { ref name }) if name == "inner"),
        "err = {}",
        err
    );
}

#[test]
fn test_short_circuit_with_host_side_effects() {
    let hits = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&hits);
    let mut ext = Externals::new();
    ext.register("hit", 0, move |_| {
        *counter.borrow_mut() += 1;
        Ok(())
    });

    let src = r#"
        var ok = false && hit();
        var also = true || hit();
        print(ok, also);
    "#;
    let (out, _) = run_with(src, &ext);
    assert_eq!(out, "false true\n");
    assert_eq!(*hits.borrow(), 0);
}

#[test]
fn test_stacks_balance_after_calls() {
    let src = r#"
        define fib = fun(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); };
        var i = 0;
        while (i < 5) { fib(i); i = i + 1; }
        print(fib(10));
    "#;
    let (out, stats) = run_with(src, &Externals::new());
    assert_eq!(out, "55\n");
    assert_eq!(stats.calls.pushes, stats.calls.pops);
    assert_eq!(stats.operand.pushes, stats.operand.pops);
}

#[test]
fn test_call_depth_limit_is_a_runtime_error() {
    let src = "define down = fun(n) { return down(n + 1); }; down(0);";
    let bc = pipeline::compile(src, &Externals::new()).unwrap();
    let config = VmConfig::default().with_max_call_depth(50);
    let err = pipeline::run(&bc, &Externals::new(), config, Vec::new()).unwrap_err();
    assert_eq!(err.kind(), "runtime");
    assert!(err.to_string().contains("limit"), "msg = {}", err);
}

#[test]
fn test_turtle_program_runs_headless() {
    let mut ext = Externals::new();
    let turtle = turtle::register(&mut ext, false);
    let src = r#"
        define polygon = fun(sides, size) {
            var i = 0;
            while (i < sides) {
                forward(size);
                left(360 / sides);
                i = i + 1;
            }
        };
        pencolor("blue");
        polygon(6, 10);
        penup();
        forward(100);
    "#;
    let (out, _) = run_with(src, &ext);
    assert_eq!(out, "");

    let t = turtle.borrow();
    assert_eq!(t.segments.len(), 6);
    assert!(t.segments.iter().all(|s| s.color == "blue"));
    assert!(!t.pen_down);
}

#[test]
fn test_external_arity_is_checked_at_compile_time() {
    let mut ext = Externals::new();
    turtle::register(&mut ext, false);
    let err = pipeline::run_source("forward(1, 2);", &ext, Vec::new()).unwrap_err();
    assert_eq!(err.kind(), "compile");
}

#[test]
fn test_image_round_trip_runs_the_same() {
    let src = r#"
        define greet = fun(who) { return "hello " + who; };
        print(greet("cilly"), 7 / 2, -7 % 3);
    "#;
    let ext = Externals::new();
    let bc = pipeline::compile(src, &ext).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greet.cbc");
    image::save(&path, &bc).unwrap();
    let loaded = pipeline::load_image(&path, &ext).unwrap();
    assert_eq!(loaded, bc);

    let mut out = Vec::new();
    pipeline::run(&loaded, &ext, VmConfig::default(), &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), run_src(src));
}

#[test]
fn test_image_needing_missing_external_fails_verification() {
    let mut ext = Externals::new();
    turtle::register(&mut ext, false);
    let bc = pipeline::compile("right(90);", &ext).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("turn.cbc");
    image::save(&path, &bc).unwrap();

    let err = pipeline::load_image(&path, &Externals::new()).unwrap_err();
    assert_eq!(err.kind(), "verify");
}
