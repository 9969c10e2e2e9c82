/// Current question index, kept inside `0..count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    index: usize,
    count: usize,
}

impl Navigator {
    pub fn new(count: usize) -> Self {
        Self { index: 0, count }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_last(&self) -> bool {
        self.count > 0 && self.index == self.count - 1
    }

    pub fn can_retreat(&self) -> bool {
        self.index > 0
    }

    /// Moves to the next question. Returns `false` at the last one.
    pub fn advance(&mut self) -> bool {
        if self.index + 1 < self.count {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Moves to the previous question. Returns `false` at the first one.
    pub fn retreat(&mut self) -> bool {
        if self.can_retreat() {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    /// `(index + 1) / count` as a percentage.
    pub fn progress_percent(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.index + 1) as f64 / self.count as f64 * 100.0
        }
    }
}
