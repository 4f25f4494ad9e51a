/// Resource limits for one VM run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of active calls (the call stack's depth).
    pub max_call_depth: usize,
    /// Maximum number of values on the operand stack.
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_stack_size: 10_000,
        }
    }
}

impl VmConfig {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_stack_size(mut self, size: usize) -> Self {
        self.max_stack_size = size;
        self
    }
}
