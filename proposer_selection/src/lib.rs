//! Proposer selection: a sealed-bid auction with a deterministic VRF-style fallback.
//!
//! `ProposerSelection::select_proposer` is the single entry point the coordinator calls; it
//! resolves the auction-vs-fallback ordering so callers never have to.

pub mod auction;
pub mod vrf;

pub use auction::{Bid, ClearingResult, Error, SealedBidAuction};
pub use vrf::deterministic_proposer;

use crypto::Sha256Hasher;
use types::{
    config::Config,
    primitives::{Gwei, Slot, ValidatorIndex, H256},
};

/// Not internally locked; the coordinator wraps one instance in a `parking_lot::RwLock` per the
/// single-lock-per-component rule.
pub struct ProposerSelection {
    auction: SealedBidAuction,
    fallback_enabled: bool,
}

impl ProposerSelection {
    pub fn new(fallback_enabled: bool) -> Self {
        Self {
            auction: SealedBidAuction::new(),
            fallback_enabled,
        }
    }

    pub fn open_auction(&mut self, slot: Slot) -> Result<(), Error> {
        self.auction.open_auction(slot)
    }

    pub fn submit_bid(&mut self, bid: Bid) -> Result<(), Error> {
        self.auction.submit_bid(bid)
    }

    /// Resolves the proposer for `slot`. An auction that closes with any bids is authoritative —
    /// the deterministic fallback only runs when the auction was never opened, or closed with
    /// `NO_BIDS` and `fallback_enabled` is set; a `NO_BIDS` close with fallback disabled is
    /// propagated so the coordinator can decide how to handle an unproposed slot.
    pub fn select_proposer(
        &mut self,
        slot: Slot,
        active: &[ValidatorIndex],
        effective_balance_of: impl Fn(ValidatorIndex) -> Gwei,
        randao_mix: H256,
        config: &Config,
        hasher: &dyn Sha256Hasher,
    ) -> Result<ValidatorIndex, Error> {
        if !self.auction.is_open(slot) {
            return Ok(deterministic_proposer(
                active,
                effective_balance_of,
                randao_mix,
                slot,
                config.max_effective_balance,
                hasher,
            ));
        }
        match self.auction.close_auction(slot) {
            Ok(result) => Ok(result.winner),
            Err(Error::NoBids) if self.fallback_enabled => Ok(deterministic_proposer(
                active,
                effective_balance_of,
                randao_mix,
                slot,
                config.max_effective_balance,
                hasher,
            )),
            Err(err) => Err(err),
        }
    }
}
