//! Head-less turtle externals.
//!
//! Cilly's demo programs drive a turtle through `forward`, `left`, `penup`
//! and friends. This module registers those externals against an in-memory
//! turtle that records the segments it draws, and reports each call to
//! stderr when `echo` is on.

use crate::lang::node::Number;
use crate::lang::value::Value;
use crate::runtime::externals::Externals;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub from: (f64, f64),
    pub to: (f64, f64),
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turtle {
    pub x: f64,
    pub y: f64,
    /// Degrees, counter-clockwise from the positive x axis.
    pub heading: f64,
    pub pen_down: bool,
    pub color: String,
    pub speed: f64,
    pub segments: Vec<Segment>,
}

impl Default for Turtle {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            pen_down: true,
            color: "black".to_string(),
            speed: 0.0,
            segments: Vec::new(),
        }
    }
}

impl Turtle {
    fn forward(&mut self, distance: f64) {
        let rad = self.heading.to_radians();
        let from = (self.x, self.y);
        self.x += distance * rad.cos();
        self.y += distance * rad.sin();
        if self.pen_down {
            self.segments.push(Segment {
                from,
                to: (self.x, self.y),
                color: self.color.clone(),
            });
        }
    }

    fn turn(&mut self, degrees: f64) {
        self.heading = (self.heading + degrees).rem_euclid(360.0);
    }
}

fn number(name: &str, value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => Ok(Number::as_f64(*n)),
        other => Err(format!("{} expects a number, got {}", name, other.type_name())),
    }
}

/// Registers the turtle externals and returns the shared turtle state.
pub fn register(externals: &mut Externals, echo: bool) -> Rc<RefCell<Turtle>> {
    let turtle = Rc::new(RefCell::new(Turtle::default()));

    let log = move |name: &str, args: &[Value]| {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        tracing::info!(call = name, args = %args.join(", "), "turtle");
        if echo {
            eprintln!("turtle: {}({})", name, args.join(", "));
        }
    };

    type Action = fn(&mut Turtle, &[Value]) -> Result<(), String>;
    let commands: [(&str, usize, Action); 8] = [
        ("forward", 1, |t, a| {
            t.forward(number("forward", &a[0])?);
            Ok(())
        }),
        ("backward", 1, |t, a| {
            t.forward(-number("backward", &a[0])?);
            Ok(())
        }),
        ("left", 1, |t, a| {
            t.turn(number("left", &a[0])?);
            Ok(())
        }),
        ("right", 1, |t, a| {
            t.turn(-number("right", &a[0])?);
            Ok(())
        }),
        ("penup", 0, |t, _| {
            t.pen_down = false;
            Ok(())
        }),
        ("pendown", 0, |t, _| {
            t.pen_down = true;
            Ok(())
        }),
        ("pencolor", 1, |t, a| {
            t.color = a[0].to_string();
            Ok(())
        }),
        ("speed", 1, |t, a| {
            t.speed = number("speed", &a[0])?;
            Ok(())
        }),
    ];

    for (name, arity, action) in commands {
        let state = Rc::clone(&turtle);
        externals.register(name, arity, move |args| {
            log(name, args);
            action(&mut state.borrow_mut(), args)
        });
    }

    turtle
}
