use crate::bytecode::compile::ExternalSig;
use crate::lang::value::Value;
use std::collections::BTreeMap;

/// Host callback. Receives the arguments in call order; an `Err` aborts the
/// run with its message.
pub type ExternalFn = Box<dyn Fn(&[Value]) -> Result<(), String>>;

pub struct External {
    pub arity: usize,
    callback: ExternalFn,
}

impl External {
    pub fn call(&self, args: &[Value]) -> Result<(), String> {
        (self.callback)(args)
    }
}

impl std::fmt::Debug for External {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("External")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Registry of host externals, keyed by name.
///
/// The same registry feeds the compiler (through [`Externals::signatures`])
/// and the VM, so a program only ever calls what it was compiled against.
#[derive(Debug, Default)]
pub struct Externals {
    entries: BTreeMap<String, External>,
}

impl Externals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an external.
    pub fn register<F>(&mut self, name: impl Into<String>, arity: usize, callback: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<(), String> + 'static,
    {
        self.entries.insert(
            name.into(),
            External {
                arity,
                callback: Box::new(callback),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&External> {
        self.entries.get(name)
    }

    /// Name and arity of every external, sorted by name.
    pub fn signatures(&self) -> Vec<ExternalSig> {
        self.entries
            .iter()
            .map(|(name, ext)| ExternalSig::new(name.clone(), ext.arity))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
