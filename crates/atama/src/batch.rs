use crate::stack::ChangeStack;

/// Depth counter for nested freezes. Dispatch is deferred while the depth is
/// above zero and the deferred changes are handed back when it returns to
/// zero.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    depth: usize,
    pending: Vec<ChangeStack>,
}

impl Batch {
    pub(crate) fn enter(&mut self) {
        self.depth += 1;
    }

    /// Leave one level. Returns the deferred changes once the outermost level
    /// is left and something changed inside it.
    pub(crate) fn exit(&mut self) -> Option<Vec<ChangeStack>> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 || self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn defer(&mut self, stack: ChangeStack) {
        self.pending.push(stack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_levels_release_once() {
        let mut batch = Batch::default();
        batch.enter();
        batch.enter();
        batch.defer(ChangeStack::default());
        assert!(batch.exit().is_none());
        assert!(batch.is_active());
        batch.defer(ChangeStack::default());
        assert_eq!(batch.exit().map(|p| p.len()), Some(2));
        assert!(!batch.is_active());
    }

    #[test]
    fn test_quiet_batch_releases_nothing() {
        let mut batch = Batch::default();
        batch.enter();
        assert!(batch.exit().is_none());
    }
}
