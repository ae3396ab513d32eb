pub mod wallet;

pub use wallet::{
    AppendOutcome, EntryCategory, LedgerEntry, NewLedgerEntry, OwnerKind, PLATFORM_WALLET_ID,
};
