//! Transaction functionality
//!
//! This module provides currency conversion, payment submission through the
//! linked wallet, and the local ledger of payments and deposits.

mod conversion;
mod ledger;
mod submitter;

pub use conversion::*;
pub use ledger::*;
pub use submitter::*;
