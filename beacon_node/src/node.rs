//! The top-level coordinator.
//!
//! `BeaconNode` owns one instance of every component behind its own `parking_lot::RwLock` (never
//! a global), and is the only place in the workspace allowed to hold two component locks at once
//! — and then only sequentially, never nested across a call into another component (spec §5/§9).
//! Control flow here mirrors spec §2: the driving loop calls `on_slot_start` as the slot clock
//! ticks, attestations and blocks arrive through `accept_attestation`/`accept_block`, the current
//! head is read through `head`, and a proposer assembles a block through `assemble_block`.

use std::collections::HashMap;

use error_utils::{Classified, ErrorClass};
use log::{debug, info, warn};
use parking_lot::RwLock;
use thiserror::Error;

use attestation_pool::AttestationPool;
use beacon_fork_choice::{Error as ForkChoiceError, ForkChoiceStore};
use crypto::{Keccak256, Sha256, SignatureScheme};
use equivocation::{Evidence, EquivocationDetector, SlashingPool};
use helper_functions::misc::compute_epoch_at_slot;
use parallel_aggregator::{AggregateOutcome, AggregatorConfig, ParallelAggregator};
use proposer_selection::{Error as ProposerError, ProposerSelection};
use sync_committee::SyncCommitteeManager;
use transition_functions::epoch_transition;
use types::{
    config::Config,
    primitives::{Epoch, Gwei, PublicKeyBytes, Slot, ValidatorIndex, H256},
    types::{Attestation, Checkpoint, SignedBeaconBlockHeader},
    BeaconState,
};
use validator_registry::ValidatorRegistry;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Pool(#[from] attestation_pool::Error),
    #[error(transparent)]
    ForkChoice(#[from] ForkChoiceError),
    #[error(transparent)]
    Proposer(#[from] ProposerError),
}

/// A proposer's view of what to put in a block at `slot`: the best attestations the pool has to
/// offer, every pending slashing record, and the validator selected to propose.
pub struct BlockProposal {
    pub slot: Slot,
    pub proposer: ValidatorIndex,
    pub parent_root: H256,
    pub attestations: Vec<Attestation>,
    pub slashings: Vec<Evidence>,
}

pub struct BeaconNode {
    config: Config,
    state: RwLock<BeaconState>,
    registry: RwLock<ValidatorRegistry>,
    pool: RwLock<AttestationPool>,
    fork_choice: RwLock<ForkChoiceStore>,
    equivocation: RwLock<EquivocationDetector>,
    slashings: RwLock<SlashingPool>,
    proposer_selection: RwLock<ProposerSelection>,
    sync_committee: RwLock<SyncCommitteeManager>,
    aggregator: ParallelAggregator,
}

impl BeaconNode {
    /// Seeds the fork-choice store and justified/finalized checkpoints from `genesis_state`'s own
    /// state root, which stands in for the genesis block's identity absent a block-body hash
    /// (block encoding is out of scope, see the top-level Non-goals).
    pub fn new(config: Config, genesis_state: BeaconState) -> Self {
        let genesis_root = genesis_state.state_root(&config);
        let genesis_checkpoint = Checkpoint::new(0, genesis_root);

        Self {
            fork_choice: RwLock::new(ForkChoiceStore::new(
                genesis_root,
                genesis_state.slot,
                genesis_root,
                genesis_checkpoint,
                genesis_checkpoint,
            )),
            registry: RwLock::new(ValidatorRegistry::new(config.clone())),
            pool: RwLock::new(AttestationPool::new(config.clone())),
            equivocation: RwLock::new(EquivocationDetector::new(config.clone())),
            slashings: RwLock::new(SlashingPool::new(config.clone())),
            proposer_selection: RwLock::new(ProposerSelection::new(true)),
            sync_committee: RwLock::new(SyncCommitteeManager::new(config.clone())),
            aggregator: ParallelAggregator::new(AggregatorConfig::default()),
            state: RwLock::new(genesis_state),
            config,
        }
    }

    pub fn head_state(&self) -> BeaconState {
        self.state.read().snapshot()
    }

    /// Registers a new validator. Touches `state` and `registry` together since the registry
    /// indexes into the state it mutates; this is the coordinator, so holding both locks at once
    /// is allowed as long as the call never nests into another component (it doesn't here).
    pub fn register_validator(
        &self,
        pubkey: PublicKeyBytes,
        withdrawal_credentials: H256,
        effective_balance: Gwei,
        balance: Gwei,
    ) -> ValidatorIndex {
        let mut state = self.state.write();
        let mut registry = self.registry.write();
        registry.register(&mut state, pubkey, withdrawal_credentials, effective_balance, balance)
    }

    /// Advances the pool's notion of "now", prunes stale equivocation history, and runs the full
    /// epoch-transition pipeline at epoch boundaries, in that order (spec §2, §4.7).
    pub fn on_slot_start(&self, slot: Slot) {
        info!("slot {} started", slot);
        self.pool.write().set_current_slot(slot);
        self.equivocation.write().prune_old(slot);

        if slot > 0 && slot % self.config.slots_per_epoch == 0 {
            self.process_epoch_transition();
        }
    }

    fn process_epoch_transition(&self) {
        let (finalized, current_justified, current_epoch, seed) = {
            let mut state = self.state.write();
            let mut registry = self.registry.write();
            epoch_transition::process_epoch(&self.config, &mut state, &mut registry);
            let current_epoch = state.current_epoch(&self.config);
            let seed = state.randao_mix(current_epoch);
            (
                state.finalized_checkpoint,
                state.current_justified_checkpoint,
                current_epoch,
                seed,
            )
        };

        self.pool.write().set_justified(current_justified);
        {
            let mut fork_choice = self.fork_choice.write();
            fork_choice.set_justified(current_justified);
            fork_choice.set_finalized(finalized);
            let pruned = fork_choice.prune_before_finalized();
            info!(
                "epoch {} transition complete: finalized={:?}, pruned {} fork-choice nodes",
                current_epoch, finalized, pruned
            );
        }

        if self.sync_committee.read().should_rotate(current_epoch) {
            self.rotate_sync_committee(current_epoch, seed);
        }
    }

    fn rotate_sync_committee(&self, epoch: Epoch, seed: H256) {
        let (active, balance_of): (Vec<ValidatorIndex>, HashMap<ValidatorIndex, Gwei>) = {
            let state = self.state.read();
            let registry = self.registry.read();
            let active = registry.active_indices(&state, epoch);
            let balances = active
                .iter()
                .map(|&index| (index, state.validator(index).expect("active index is in range").effective_balance))
                .collect();
            (active, balances)
        };

        let members = sync_committee::select_committee(
            &self.config,
            &active,
            |index| *balance_of.get(&index).unwrap_or(&0),
            seed,
            &Keccak256,
            &Sha256,
        );
        let count = members.len();
        self.sync_committee.write().rotate(members);
        info!("sync committee rotated at epoch {}: {} members", epoch, count);
    }

    /// Validates and admits an attestation: checks it for equivocation, adds it to the pool
    /// (aggregating with any compatible candidate already held), and records its validator's
    /// latest message in fork-choice. Consistency errors (stale latest message, target not yet in
    /// the tree) are logged, not propagated, per the error-handling design (spec §7).
    pub fn accept_attestation(
        &self,
        attestation: Attestation,
        validator_index: ValidatorIndex,
        weight: Gwei,
        signatures: &dyn SignatureScheme,
    ) -> Result<(), Error> {
        if let Some(evidence) =
            self.equivocation.write().check_attestation(attestation.data.clone(), validator_index, &Keccak256)
        {
            warn!("equivocation detected from validator {}: {:?}", validator_index, evidence);
            if self.slashings.write().insert(evidence, attestation.data.slot).is_err() {
                debug!("validator {} already has a pending slashing record", validator_index);
            }
        }

        self.pool.write().add(attestation.clone(), &Keccak256, signatures)?;

        let target = attestation.data.target;
        match self.fork_choice.write().on_attestation(validator_index, target.root, target.epoch, weight) {
            Ok(()) => {}
            Err(err) if err.class() == ErrorClass::Consistency => {
                debug!("attestation not applied to fork choice: {:?}", err);
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Admits a block header into the fork-choice tree, checking it for double-proposal first. A
    /// duplicate block is logged and ignored rather than propagated (consistency error, spec §7).
    pub fn accept_block(
        &self,
        root: H256,
        header: SignedBeaconBlockHeader,
        state_root: H256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        let slot = header.message.slot;
        let proposer = header.message.proposer_index;
        let parent_root = header.message.parent_root;

        if let Some(evidence) = self.equivocation.write().check_proposal(slot, proposer, root, header) {
            warn!("equivocation detected from proposer {}: {:?}", proposer, evidence);
            if self.slashings.write().insert(evidence, slot).is_err() {
                debug!("proposer {} already has a pending slashing record", proposer);
            }
        }

        match self.fork_choice.write().on_block(root, parent_root, slot, state_root, justified_epoch, finalized_epoch) {
            Ok(()) => Ok(()),
            Err(err) if err.class() == ErrorClass::Consistency => {
                debug!("block not applied to fork choice: {:?}", err);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn head(&self) -> Result<H256, ForkChoiceError> {
        self.fork_choice.write().get_head()
    }

    /// Assembles everything a proposer needs for `slot`: the best attestations the pool has to
    /// offer, every pending slashing record, and the proposer selected for the slot (auction
    /// winner if one was run, VRF fallback otherwise).
    pub fn assemble_block(&self, slot: Slot, parent_root: H256, max_attestations: usize) -> Result<BlockProposal, Error> {
        let epoch = compute_epoch_at_slot(&self.config, slot);

        let attestations = self.pool.read().get_for_block(slot, max_attestations);
        let slashings = self
            .slashings
            .read()
            .records_for_block()
            .into_iter()
            .map(|record| record.evidence.clone())
            .collect();

        let (active, randao_mix, balance_of): (Vec<ValidatorIndex>, H256, HashMap<ValidatorIndex, Gwei>) = {
            let state = self.state.read();
            let registry = self.registry.read();
            let active = registry.active_indices(&state, epoch);
            let balances = active
                .iter()
                .map(|&index| (index, state.validator(index).expect("active index is in range").effective_balance))
                .collect();
            (active, state.randao_mix(epoch), balances)
        };

        let proposer = self.proposer_selection.write().select_proposer(
            slot,
            &active,
            |index| *balance_of.get(&index).unwrap_or(&0),
            randao_mix,
            &self.config,
            &Sha256,
        )?;

        Ok(BlockProposal { slot, proposer, parent_root, attestations, slashings })
    }

    /// Merges a batch of attestations sharing one data key on the aggregator's worker pool, for
    /// callers with throughput needs the pool's own in-place aggregation doesn't cover (e.g. a
    /// gossip-layer pre-aggregation step feeding `accept_attestation`).
    pub fn aggregate_batch(&self, attestations: &[Attestation], signatures: &dyn SignatureScheme) -> AggregateOutcome {
        self.aggregator.aggregate(attestations, signatures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::NullSignatureScheme;
    use types::{
        primitives::{FAR_FUTURE_EPOCH, SignatureBytes},
        types::{AggregationBits, AttestationData, BeaconBlockHeader},
    };

    fn node_with_validators(count: u64) -> BeaconNode {
        let config = Config::minimal();
        let state = BeaconState::new(0);
        let node = BeaconNode::new(config, state);
        for i in 0..count {
            let index = node.register_validator(
                PublicKeyBytes([i as u8; 48]),
                H256::zero(),
                32_000_000_000,
                32_000_000_000,
            );
            let mut state = node.state.write();
            state.validators[index as usize].activation_epoch = 0;
            state.validators[index as usize].exit_epoch = FAR_FUTURE_EPOCH;
        }
        node
    }

    fn attestation(slot: Slot, target_root: H256, target_epoch: Epoch) -> Attestation {
        Attestation {
            data: AttestationData {
                slot,
                committee_index: 0,
                beacon_block_root: target_root,
                source: Checkpoint::new(0, H256::zero()),
                target: Checkpoint::new(target_epoch, target_root),
            },
            aggregation_bits: AggregationBits::from_vec(vec![0b0000_0001]),
            signature: SignatureBytes(vec![1]),
        }
    }

    #[test]
    fn genesis_head_is_genesis_root() {
        let node = node_with_validators(4);
        let genesis_root = node.state.read().state_root(&Config::minimal());
        assert_eq!(node.head().unwrap(), genesis_root);
    }

    #[test]
    fn accepted_block_becomes_head_once_attested() {
        let node = node_with_validators(4);
        node.on_slot_start(1);
        let genesis_root = node.state.read().state_root(&Config::minimal());

        let block_root = H256::repeat_byte(1);
        let header = SignedBeaconBlockHeader {
            message: BeaconBlockHeader {
                slot: 1,
                proposer_index: 0,
                parent_root: genesis_root,
                state_root: H256::zero(),
                body_root: H256::zero(),
            },
            signature: SignatureBytes(vec![1]),
        };
        node.accept_block(block_root, header, H256::zero(), 0, 0).unwrap();
        node.accept_attestation(attestation(1, block_root, 0), 0, 10, &NullSignatureScheme).unwrap();

        assert_eq!(node.head().unwrap(), block_root);
    }

    #[test]
    fn double_proposal_is_recorded_as_a_pending_slashing() {
        let node = node_with_validators(1);
        let genesis_root = node.state.read().state_root(&Config::minimal());
        let header = |parent| SignedBeaconBlockHeader {
            message: BeaconBlockHeader {
                slot: 1,
                proposer_index: 0,
                parent_root: genesis_root,
                state_root: H256::zero(),
                body_root: parent,
            },
            signature: SignatureBytes(vec![1]),
        };
        node.accept_block(H256::repeat_byte(1), header(H256::zero()), H256::zero(), 0, 0).unwrap();
        node.accept_block(H256::repeat_byte(2), header(H256::repeat_byte(9)), H256::zero(), 0, 0).unwrap();
        assert_eq!(node.slashings.read().len(), 1);
    }

    #[test]
    fn duplicate_block_is_ignored_without_error() {
        let node = node_with_validators(1);
        let genesis_root = node.state.read().state_root(&Config::minimal());
        let header = SignedBeaconBlockHeader {
            message: BeaconBlockHeader {
                slot: 1,
                proposer_index: 0,
                parent_root: genesis_root,
                state_root: H256::zero(),
                body_root: H256::zero(),
            },
            signature: SignatureBytes(vec![1]),
        };
        let root = H256::repeat_byte(1);
        node.accept_block(root, header.clone(), H256::zero(), 0, 0).unwrap();
        assert!(node.accept_block(root, header, H256::zero(), 0, 0).is_ok());
    }

    #[test]
    fn assemble_block_selects_a_proposer_from_the_active_set() {
        let node = node_with_validators(4);
        node.on_slot_start(1);
        let proposal = node.assemble_block(1, H256::zero(), 10).unwrap();
        assert!((0..4).contains(&proposal.proposer));
    }

    #[test]
    fn epoch_boundary_triggers_transition_and_advances_justified_epoch_state() {
        let node = node_with_validators(4);
        // Slot 0 is not a boundary (guarded by `slot > 0`); slots_per_epoch is 8 under `minimal`.
        node.on_slot_start(0);
        node.on_slot_start(8);
        // No assertion on finalization here (two epochs of empty participation cannot justify);
        // this only exercises that crossing the boundary does not panic and still serves a head.
        assert!(node.head().is_ok());
    }
}
