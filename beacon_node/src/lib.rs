pub mod node;

pub use node::{BeaconNode, BlockProposal, Error};
