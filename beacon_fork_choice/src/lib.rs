//! LMD-GHOST fork-choice store.
//!
//! The block tree is a DAG by construction but untrusted input could introduce cycles, so it is
//! owned as an arena: nodes are keyed by their 32-byte root in a single map, `children` are lists
//! of ids, and every traversal (ancestor walk, prune) carries a cycle guard rather than trusting
//! parent pointers blindly.

use std::collections::HashMap;

use error_utils::{Classified, ErrorClass};
use log::{debug, info};
use thiserror::Error;
use types::{
    primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256},
    types::Checkpoint,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("block {0:?} is already in the store")]
    DuplicateBlock(H256),
    #[error("block's parent {0:?} is not in the store")]
    UnknownParent(H256),
    #[error("attestation is stale relative to the validator's latest message")]
    Stale,
    #[error("attestation targets a block not in the store")]
    UnknownBlock,
    #[error("store has no blocks")]
    EmptyStore,
}

impl Classified for Error {
    fn class(&self) -> ErrorClass {
        match self {
            Self::DuplicateBlock(_) | Self::Stale | Self::UnknownBlock => ErrorClass::Consistency,
            Self::UnknownParent(_) => ErrorClass::Admission,
            Self::EmptyStore => ErrorClass::Invariant,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub root: H256,
    pub parent_root: H256,
    pub slot: Slot,
    pub state_root: H256,
    pub children: Vec<H256>,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
}

#[derive(Clone, Copy, Debug)]
struct LatestMessage {
    target_root: H256,
    target_epoch: Epoch,
    weight: Gwei,
}

pub struct ForkChoiceStore {
    nodes: HashMap<H256, Node>,
    latest_messages: HashMap<ValidatorIndex, LatestMessage>,
    justified: Checkpoint,
    finalized: Checkpoint,
    best_justified: Checkpoint,
    head_cache: Option<H256>,
}

impl ForkChoiceStore {
    /// Seeds the store with a root block (genesis or a weak-subjectivity checkpoint). Later
    /// blocks are added through `on_block` and must chain back to this root.
    pub fn new(root: H256, slot: Slot, state_root: H256, justified: Checkpoint, finalized: Checkpoint) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                root,
                parent_root: root,
                slot,
                state_root,
                children: Vec::new(),
                justified_epoch: justified.epoch,
                finalized_epoch: finalized.epoch,
            },
        );
        Self {
            nodes,
            latest_messages: HashMap::new(),
            justified,
            finalized,
            best_justified: justified,
            head_cache: None,
        }
    }

    pub fn contains(&self, root: &H256) -> bool {
        self.nodes.contains_key(root)
    }

    pub fn node(&self, root: &H256) -> Option<&Node> {
        self.nodes.get(root)
    }

    pub fn on_block(
        &mut self,
        root: H256,
        parent_root: H256,
        slot: Slot,
        state_root: H256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        if self.nodes.contains_key(&root) {
            return Err(Error::DuplicateBlock(root));
        }
        if !self.nodes.contains_key(&parent_root) {
            return Err(Error::UnknownParent(parent_root));
        }

        self.nodes.get_mut(&parent_root).expect("checked above").children.push(root);
        self.nodes.insert(
            root,
            Node {
                root,
                parent_root,
                slot,
                state_root,
                children: Vec::new(),
                justified_epoch,
                finalized_epoch,
            },
        );

        if justified_epoch > self.best_justified.epoch {
            self.best_justified = Checkpoint::new(justified_epoch, root);
        }
        debug!("block {:?} accepted at slot {}, parent {:?}", root, slot, parent_root);
        self.head_cache = None;
        Ok(())
    }

    pub fn on_attestation(
        &mut self,
        validator: ValidatorIndex,
        target_root: H256,
        target_epoch: Epoch,
        weight: Gwei,
    ) -> Result<(), Error> {
        if !self.nodes.contains_key(&target_root) {
            return Err(Error::UnknownBlock);
        }
        if let Some(existing) = self.latest_messages.get(&validator) {
            if existing.target_epoch >= target_epoch {
                return Err(Error::Stale);
            }
        }
        self.latest_messages.insert(
            validator,
            LatestMessage {
                target_root,
                target_epoch,
                weight,
            },
        );
        self.head_cache = None;
        Ok(())
    }

    pub fn set_justified(&mut self, checkpoint: Checkpoint) {
        self.justified = checkpoint;
        self.head_cache = None;
    }

    pub fn set_finalized(&mut self, checkpoint: Checkpoint) {
        self.finalized = checkpoint;
        self.head_cache = None;
    }

    pub fn justified(&self) -> Checkpoint {
        self.justified
    }

    pub fn finalized(&self) -> Checkpoint {
        self.finalized
    }

    /// A block is viable for head selection iff the finalized root is one of its ancestors.
    /// Conservative fallback: if nothing is viable (e.g. the finalized checkpoint is unset),
    /// every block is treated as viable rather than returning an empty head.
    fn is_viable(&self, mut root: H256) -> bool {
        if self.finalized.is_none() {
            return true;
        }
        let mut guard = self.nodes.len() + 1;
        loop {
            if root == self.finalized.root {
                return true;
            }
            let Some(node) = self.nodes.get(&root) else {
                return false;
            };
            if node.parent_root == root || guard == 0 {
                return false;
            }
            root = node.parent_root;
            guard -= 1;
        }
    }

    pub fn get_head(&mut self) -> Result<H256, Error> {
        if let Some(cached) = self.head_cache {
            return Ok(cached);
        }
        if self.nodes.is_empty() {
            return Err(Error::EmptyStore);
        }

        let start = if self.nodes.contains_key(&self.justified.root) {
            self.justified.root
        } else {
            self.nodes
                .values()
                .find(|node| node.parent_root == node.root)
                .map(|node| node.root)
                .ok_or(Error::EmptyStore)?
        };

        let any_viable = self.nodes.keys().any(|&root| self.is_viable(root));

        let mut weights: HashMap<H256, Gwei> = self.nodes.keys().map(|&root| (root, 0)).collect();
        for message in self.latest_messages.values() {
            if let Some(weight) = weights.get_mut(&message.target_root) {
                *weight += message.weight;
            }
        }

        let mut by_slot_desc: Vec<&Node> = self.nodes.values().collect();
        by_slot_desc.sort_by(|a, b| b.slot.cmp(&a.slot));
        for node in by_slot_desc {
            if node.parent_root == node.root {
                continue;
            }
            let weight = *weights.get(&node.root).unwrap_or(&0);
            if let Some(parent_weight) = weights.get_mut(&node.parent_root) {
                *parent_weight += weight;
            }
        }

        let mut head = start;
        loop {
            let node = self.nodes.get(&head).expect("head always points at a live node");
            let next = node
                .children
                .iter()
                .filter(|&&child| !any_viable || self.is_viable(child))
                .map(|&child| (*weights.get(&child).unwrap_or(&0), child))
                .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
            match next {
                Some((_, child)) => head = child,
                None => break,
            }
        }

        debug!("head recomputed: {:?}", head);
        self.head_cache = Some(head);
        Ok(head)
    }

    /// Deletes every node that is not a descendant of the finalized root, returning the number of
    /// nodes removed. The new root's parent pointer is cleared (set to itself).
    pub fn prune_before_finalized(&mut self) -> usize {
        let root = self.finalized.root;
        if !self.nodes.contains_key(&root) {
            return 0;
        }

        let mut keep = std::collections::HashSet::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if !keep.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().copied());
            }
        }

        let before = self.nodes.len();
        self.nodes.retain(|root, _| keep.contains(root));
        if let Some(new_root) = self.nodes.get_mut(&root) {
            new_root.parent_root = root;
        }
        self.latest_messages.retain(|_, message| keep.contains(&message.target_root));
        self.head_cache = None;
        let removed = before - self.nodes.len();
        info!("pruned {} nodes before finalized root {:?}", removed, root);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn head_picks_heaviest_leaf() {
        let root = hash(0);
        let mut store = ForkChoiceStore::new(root, 0, H256::zero(), Checkpoint::new(0, root), Checkpoint::new(0, root));

        let b = hash(1);
        let c = hash(2);
        let d = hash(3);
        let e = hash(4);
        store.on_block(b, root, 1, H256::zero(), 0, 0).unwrap();
        store.on_block(c, root, 1, H256::zero(), 0, 0).unwrap();
        store.on_block(d, c, 2, H256::zero(), 0, 0).unwrap();
        store.on_block(e, c, 2, H256::zero(), 0, 0).unwrap();

        store.on_attestation(0, d, 1, 3).unwrap();
        store.on_attestation(1, e, 1, 4).unwrap();
        store.on_attestation(2, c, 1, 5).unwrap();

        assert_eq!(store.get_head().unwrap(), e);
    }

    #[test]
    fn tie_break_favors_lexicographically_smaller_hash() {
        let root = hash(0);
        let mut store = ForkChoiceStore::new(root, 0, H256::zero(), Checkpoint::new(0, root), Checkpoint::new(0, root));
        let small = hash(0x02);
        let large = hash(0x10);
        store.on_block(small, root, 1, H256::zero(), 0, 0).unwrap();
        store.on_block(large, root, 1, H256::zero(), 0, 0).unwrap();
        store.on_attestation(0, small, 1, 10).unwrap();
        store.on_attestation(1, large, 1, 10).unwrap();
        assert_eq!(store.get_head().unwrap(), small);
    }

    #[test]
    fn head_is_stable_without_mutation() {
        let root = hash(0);
        let mut store = ForkChoiceStore::new(root, 0, H256::zero(), Checkpoint::new(0, root), Checkpoint::new(0, root));
        store.on_block(hash(1), root, 1, H256::zero(), 0, 0).unwrap();
        let first = store.get_head().unwrap();
        let second = store.get_head().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_and_stale_are_consistency_class_but_unknown_parent_is_admission() {
        let root = hash(0);
        assert_eq!(Error::DuplicateBlock(root).class(), ErrorClass::Consistency);
        assert_eq!(Error::Stale.class(), ErrorClass::Consistency);
        assert_eq!(Error::UnknownBlock.class(), ErrorClass::Consistency);
        assert_eq!(Error::UnknownParent(root).class(), ErrorClass::Admission);
        assert_eq!(Error::EmptyStore.class(), ErrorClass::Invariant);
    }

    #[test]
    fn duplicate_block_is_rejected() {
        let root = hash(0);
        let mut store = ForkChoiceStore::new(root, 0, H256::zero(), Checkpoint::new(0, root), Checkpoint::new(0, root));
        assert_eq!(
            store.on_block(root, root, 0, H256::zero(), 0, 0),
            Err(Error::DuplicateBlock(root))
        );
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let root = hash(0);
        let mut store = ForkChoiceStore::new(root, 0, H256::zero(), Checkpoint::new(0, root), Checkpoint::new(0, root));
        let orphan_parent = hash(9);
        assert_eq!(
            store.on_block(hash(1), orphan_parent, 1, H256::zero(), 0, 0),
            Err(Error::UnknownParent(orphan_parent))
        );
    }

    #[test]
    fn stale_attestation_is_rejected() {
        let root = hash(0);
        let mut store = ForkChoiceStore::new(root, 0, H256::zero(), Checkpoint::new(0, root), Checkpoint::new(0, root));
        store.on_attestation(0, root, 5, 1).unwrap();
        assert_eq!(store.on_attestation(0, root, 5, 1), Err(Error::Stale));
    }

    #[test]
    fn prune_drops_non_descendants_and_resets_parent() {
        let root = hash(0);
        let mut store = ForkChoiceStore::new(root, 0, H256::zero(), Checkpoint::new(0, root), Checkpoint::new(0, root));
        let keep = hash(1);
        let drop = hash(2);
        store.on_block(keep, root, 1, H256::zero(), 0, 0).unwrap();
        store.on_block(drop, root, 1, H256::zero(), 0, 0).unwrap();
        store.set_finalized(Checkpoint::new(1, keep));

        let removed = store.prune_before_finalized();
        assert_eq!(removed, 2); // root and `drop` are no longer reachable from `keep`.
        assert!(store.contains(&keep));
        assert!(!store.contains(&drop));
        assert_eq!(store.node(&keep).unwrap().parent_root, keep);
    }
}
