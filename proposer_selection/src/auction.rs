//! Sealed-bid (Vickrey) proposer auction: one instance per slot, opened and closed exactly once.

use std::collections::{HashMap, HashSet};

use error_utils::{Classified, ErrorClass};
use thiserror::Error;
use types::primitives::{Gwei, SignatureBytes, Slot, ValidatorIndex, H256};

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Bid {
    pub bidder_index: ValidatorIndex,
    pub slot: Slot,
    pub amount_gwei: Gwei,
    pub block_commitment: H256,
    pub signature: SignatureBytes,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClearingResult {
    pub slot: Slot,
    pub winner: ValidatorIndex,
    pub winning_bid: Gwei,
    pub clearing_price: Gwei,
    pub block_commitment: H256,
    pub bid_count: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("bidder has already submitted a bid for this slot")]
    DuplicateBid,
    #[error("a zero-amount bid is not accepted")]
    ZeroBid,
    #[error("no open auction for this slot")]
    AuctionNotOpen,
    #[error("an auction is already open for this slot")]
    AlreadyOpen,
    #[error("auction closed with no bids")]
    NoBids,
}

impl Classified for Error {
    fn class(&self) -> ErrorClass {
        match self {
            Self::DuplicateBid | Self::AlreadyOpen => ErrorClass::Consistency,
            Self::ZeroBid => ErrorClass::Validation,
            Self::AuctionNotOpen | Self::NoBids => ErrorClass::Admission,
        }
    }
}

#[derive(Default)]
struct Auction {
    bids: Vec<Bid>,
    bidders: HashSet<ValidatorIndex>,
    closed: bool,
}

pub struct SealedBidAuction {
    auctions: HashMap<Slot, Auction>,
}

impl SealedBidAuction {
    pub fn new() -> Self {
        Self { auctions: HashMap::new() }
    }

    pub fn open_auction(&mut self, slot: Slot) -> Result<(), Error> {
        if self.auctions.contains_key(&slot) {
            return Err(Error::AlreadyOpen);
        }
        self.auctions.insert(slot, Auction::default());
        Ok(())
    }

    pub fn is_open(&self, slot: Slot) -> bool {
        self.auctions.get(&slot).is_some_and(|auction| !auction.closed)
    }

    pub fn submit_bid(&mut self, bid: Bid) -> Result<(), Error> {
        if bid.amount_gwei == 0 {
            return Err(Error::ZeroBid);
        }
        let auction = self.auctions.get_mut(&bid.slot).ok_or(Error::AuctionNotOpen)?;
        if auction.closed {
            return Err(Error::AuctionNotOpen);
        }
        if !auction.bidders.insert(bid.bidder_index) {
            return Err(Error::DuplicateBid);
        }
        auction.bids.push(bid);
        Ok(())
    }

    /// Sorts bids descending; winner is the top bid, clearing price is the second-highest
    /// (Vickrey) or the winner's own bid when it was the only one.
    pub fn close_auction(&mut self, slot: Slot) -> Result<ClearingResult, Error> {
        let auction = self.auctions.get_mut(&slot).ok_or(Error::AuctionNotOpen)?;
        if auction.closed {
            return Err(Error::AuctionNotOpen);
        }
        auction.closed = true;
        if auction.bids.is_empty() {
            return Err(Error::NoBids);
        }

        let mut sorted = auction.bids.clone();
        sorted.sort_by(|a, b| b.amount_gwei.cmp(&a.amount_gwei));
        let winner = sorted[0].clone();
        let clearing_price = sorted.get(1).map_or(winner.amount_gwei, |bid| bid.amount_gwei);

        Ok(ClearingResult {
            slot,
            winner: winner.bidder_index,
            winning_bid: winner.amount_gwei,
            clearing_price,
            block_commitment: winner.block_commitment,
            bid_count: sorted.len(),
        })
    }
}

impl Default for SealedBidAuction {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(bidder_index: ValidatorIndex, slot: Slot, amount_gwei: Gwei) -> Bid {
        Bid {
            bidder_index,
            slot,
            amount_gwei,
            block_commitment: H256::zero(),
            signature: SignatureBytes(vec![1; 96]),
        }
    }

    #[test]
    fn clearing_price_is_second_highest_bid() {
        let mut auction = SealedBidAuction::new();
        auction.open_auction(10).unwrap();
        auction.submit_bid(bid(1, 10, 100)).unwrap();
        auction.submit_bid(bid(2, 10, 250)).unwrap();
        auction.submit_bid(bid(3, 10, 50)).unwrap();
        let result = auction.close_auction(10).unwrap();
        assert_eq!(result.winner, 2);
        assert_eq!(result.winning_bid, 250);
        assert_eq!(result.clearing_price, 100);
        assert_eq!(result.bid_count, 3);
    }

    #[test]
    fn single_bid_clears_at_its_own_price() {
        let mut auction = SealedBidAuction::new();
        auction.open_auction(10).unwrap();
        auction.submit_bid(bid(1, 10, 100)).unwrap();
        let result = auction.close_auction(10).unwrap();
        assert_eq!(result.clearing_price, 100);
    }

    #[test]
    fn duplicate_bid_from_same_bidder_rejected() {
        let mut auction = SealedBidAuction::new();
        auction.open_auction(10).unwrap();
        auction.submit_bid(bid(1, 10, 100)).unwrap();
        assert_eq!(auction.submit_bid(bid(1, 10, 200)), Err(Error::DuplicateBid));
    }

    #[test]
    fn zero_bid_rejected() {
        let mut auction = SealedBidAuction::new();
        auction.open_auction(10).unwrap();
        assert_eq!(auction.submit_bid(bid(1, 10, 0)), Err(Error::ZeroBid));
    }

    #[test]
    fn closing_with_no_bids_reports_no_bids() {
        let mut auction = SealedBidAuction::new();
        auction.open_auction(10).unwrap();
        assert_eq!(auction.close_auction(10), Err(Error::NoBids));
    }
}
