/// Push/pop counters and high-water mark of one stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackStats {
    pub pushes: usize,
    pub pops: usize,
    pub max_depth: usize,
}

impl std::fmt::Display for StackStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pushes={} pops={} max_depth={}",
            self.pushes, self.pops, self.max_depth
        )
    }
}

/// A LIFO stack that records how it was used.
#[derive(Debug, Clone)]
pub struct InstrumentedStack<T> {
    items: Vec<T>,
    stats: StackStats,
}

impl<T> Default for InstrumentedStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InstrumentedStack<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            stats: StackStats::default(),
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.stats.pushes += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.items.len());
    }

    /// Pops the top item. Popping an empty stack is not counted.
    pub fn pop(&mut self) -> Option<T> {
        let item = self.items.pop()?;
        self.stats.pops += 1;
        Some(item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn stats(&self) -> StackStats {
        self.stats
    }
}
