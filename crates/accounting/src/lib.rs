//! Payables journal (double-entry, event-sourced).
//!
//! Receiving settlement posts one balanced entry per received purchase order:
//! inventory is debited, and cash, bank or accounts payable is credited
//! depending on how the supplier is paid.

pub mod ledger;

pub use ledger::{
    Account, AccountKind, JournalCommand, JournalEntryLine, JournalEntryPosted, Ledger, LedgerEvent,
    LedgerId, PostJournalEntry,
};
