//! Cycle guards for recursive tree transfer.

use dashmap::DashSet;
use wherry_vfs::FileId;

/// The chain of directory identities currently being descended into, one
/// per active recursion frame.
///
/// A source directory whose identity is already on the chain is a symlink
/// pointing back into its own ancestry; descending would never terminate.
/// Entries are pushed before descending and popped on return, so the chain
/// always mirrors recursion depth.
#[derive(Debug, Default)]
pub struct AncestorChain {
    stack: Vec<FileId>,
}

impl AncestorChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is an ancestor of the current descent.
    pub fn contains(&self, id: &FileId) -> bool {
        self.stack.contains(id)
    }

    /// Push the identity being entered.
    pub fn push(&mut self, id: FileId) {
        self.stack.push(id);
    }

    /// Pop on return from a recursion frame.
    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// Current recursion depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Identities of destination directories created during this operation.
///
/// A source directory found here was created by this very run: copying it
/// again would mean the tree is being copied into itself.
#[derive(Debug, Default)]
pub(crate) struct DestDirRegistry {
    seen: DashSet<FileId>,
}

impl DestDirRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a directory this run just created.
    pub fn record(&self, id: FileId) {
        self.seen.insert(id);
    }

    /// Whether `id` was created by this run.
    pub fn contains(&self, id: &FileId) -> bool {
        self.seen.contains(id)
    }

    /// Forget everything, at top-level item boundaries.
    pub fn clear(&self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_a_stack() {
        let mut chain = AncestorChain::new();
        let a = FileId::new(0, 1, 10);
        let b = FileId::new(0, 1, 11);

        chain.push(a);
        chain.push(b);
        assert_eq!(chain.depth(), 2);
        assert!(chain.contains(&a));
        assert!(chain.contains(&b));

        chain.pop();
        assert!(!chain.contains(&b));
        assert!(chain.contains(&a));
    }

    #[test]
    fn registry_remembers_created_dirs() {
        let reg = DestDirRegistry::new();
        let id = FileId::new(0, 1, 10);
        assert!(!reg.contains(&id));
        reg.record(id);
        assert!(reg.contains(&id));
        reg.clear();
        assert!(!reg.contains(&id));
    }
}
