/// Per-frame allowance for deferred work, in abstract units.
///
/// The render thread spends it on things like terrain tile builds so a single
/// `lock` never stalls a frame on an unbounded amount of mesh generation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameBudget {
    limit: u32,
    spent: u32,
}

impl FrameBudget {
    pub fn new(units: u32) -> Self {
        Self {
            limit: units,
            spent: 0,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(u32::MAX)
    }

    pub fn spent_units(&self) -> u32 {
        self.spent
    }

    pub fn remaining_units(&self) -> u32 {
        self.limit - self.spent
    }

    pub fn is_exhausted(&self) -> bool {
        self.spent >= self.limit
    }

    /// Returns `false` and leaves the budget untouched when `units` exceeds
    /// what remains.
    pub fn try_consume(&mut self, units: u32) -> bool {
        if self.remaining_units() < units {
            return false;
        }
        self.spent += units;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::FrameBudget;

    #[test]
    fn consumes_until_exhausted() {
        let mut b = FrameBudget::new(3);
        assert!(b.try_consume(2));
        assert!(!b.try_consume(2));
        assert_eq!((b.spent_units(), b.remaining_units()), (2, 1));
        assert!(b.try_consume(1));
        assert!(b.is_exhausted());
    }

    #[test]
    fn zero_budget_allows_free_work_only() {
        let mut b = FrameBudget::new(0);
        assert!(b.is_exhausted());
        assert!(b.try_consume(0));
        assert!(!b.try_consume(1));
    }
}
