use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use procureflow_core::{Aggregate, AggregateId, AggregateRoot, Amount, BusinessId, DomainError};
use procureflow_events::Event;

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Account identifier + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn cash() -> Self {
        Self::new("1000", "Cash", AccountKind::Asset)
    }

    /// Bank account the transfer is paid from; one sub-account per source.
    pub fn bank(source_account: &str) -> Self {
        Self::new(
            format!("1100:{source_account}"),
            format!("Bank {source_account}"),
            AccountKind::Asset,
        )
    }

    pub fn inventory() -> Self {
        Self::new("1300", "Inventory", AccountKind::Asset)
    }

    pub fn accounts_payable() -> Self {
        Self::new("2000", "Accounts Payable", AccountKind::Liability)
    }
}

/// One side of a journal entry (immutable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account: Account,
    /// Positive amount.
    pub amount: Amount,
    /// true = debit, false = credit.
    pub is_debit: bool,
}

impl JournalEntryLine {
    pub fn debit(account: Account, amount: Amount) -> Self {
        Self {
            account,
            amount,
            is_debit: true,
        }
    }

    pub fn credit(account: Account, amount: Amount) -> Self {
        Self {
            account,
            amount,
            is_debit: false,
        }
    }
}

/// Ledger identifier (aggregate id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The single purchasing ledger every business posts receipts to.
    pub fn purchasing() -> Self {
        Self(AggregateId::from("LEDGER-purchasing"))
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Ledger (double-entry journal).
///
/// The ledger holds no balances; it tracks identity, ownership and which
/// source documents were already posted. Balances are derived from
/// `JournalEntryPosted` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    business_id: Option<BusinessId>,
    posted_references: BTreeSet<String>,
    version: u64,
    created: bool,
}

impl Ledger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            business_id: None,
            posted_references: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> &LedgerId {
        &self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn has_posted(&self, reference: &str) -> bool {
        self.posted_references.contains(reference)
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub business_id: BusinessId,
    pub ledger_id: LedgerId,
    pub entry_id: Uuid,
    /// Source document (purchase order id); posted at most once.
    pub reference: String,
    pub lines: Vec<JournalEntryLine>,
    /// Payment due date for entries that open a payable.
    pub due_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    PostJournalEntry(PostJournalEntry),
}

/// Event: JournalEntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub business_id: BusinessId,
    pub ledger_id: LedgerId,
    pub entry_id: Uuid,
    pub reference: String,
    pub lines: Vec<JournalEntryLine>,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    JournalEntryPosted(JournalEntryPosted),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::JournalEntryPosted(_) => "accounting.ledger.journal_entry_posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::JournalEntryPosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = JournalCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::JournalEntryPosted(e) => {
                self.id = e.ledger_id.clone();
                if self.business_id.is_none() {
                    self.business_id = Some(e.business_id);
                    self.created = true;
                }
                self.posted_references.insert(e.reference.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::PostJournalEntry(cmd) => self.handle_post(cmd),
        }
    }
}

impl Ledger {
    fn ensure_business(&self, business_id: BusinessId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        Ok(())
    }

    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_business(cmd.business_id)?;

        if self.posted_references.contains(&cmd.reference) {
            return Ok(vec![]);
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("journal entry must have lines"));
        }

        let mut debit_total = Decimal::ZERO;
        let mut credit_total = Decimal::ZERO;

        for line in &cmd.lines {
            if line.amount <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "amount for account {} must be positive",
                    line.account.code
                )));
            }
            if line.is_debit {
                debit_total += line.amount;
            } else {
                credit_total += line.amount;
            }
        }

        if debit_total != credit_total {
            return Err(DomainError::invariant("debits must equal credits"));
        }

        Ok(vec![LedgerEvent::JournalEntryPosted(JournalEntryPosted {
            business_id: cmd.business_id,
            ledger_id: cmd.ledger_id.clone(),
            entry_id: cmd.entry_id,
            reference: cmd.reference.clone(),
            lines: cmd.lines.clone(),
            due_date: cmd.due_date,
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn post(business_id: BusinessId, reference: &str, lines: Vec<JournalEntryLine>) -> JournalCommand {
        JournalCommand::PostJournalEntry(PostJournalEntry {
            business_id,
            ledger_id: LedgerId::purchasing(),
            entry_id: Uuid::now_v7(),
            reference: reference.to_string(),
            lines,
            due_date: None,
            occurred_at: Utc::now(),
            description: Some("goods received".to_string()),
        })
    }

    #[test]
    fn balanced_receipt_entry_is_posted() {
        let ledger = Ledger::empty(LedgerId::purchasing());
        let business_id = BusinessId::new();
        let lines = vec![
            JournalEntryLine::debit(Account::inventory(), d(10_000)),
            JournalEntryLine::credit(Account::accounts_payable(), d(10_000)),
        ];

        let events = ledger.handle(&post(business_id, "PO-1", lines.clone())).unwrap();
        assert_eq!(events.len(), 1);
        let LedgerEvent::JournalEntryPosted(e) = &events[0];
        assert_eq!(e.business_id, business_id);
        assert_eq!(e.reference, "PO-1");
        assert_eq!(e.lines, lines);
    }

    #[test]
    fn unbalanced_entry_is_rejected() {
        let ledger = Ledger::empty(LedgerId::purchasing());
        let lines = vec![
            JournalEntryLine::debit(Account::inventory(), d(100)),
            JournalEntryLine::credit(Account::cash(), d(90)),
        ];

        let err = ledger.handle(&post(BusinessId::new(), "PO-1", lines)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("debits must equal credits")));
    }

    #[test]
    fn reposting_the_same_reference_is_a_no_op() {
        let mut ledger = Ledger::empty(LedgerId::purchasing());
        let business_id = BusinessId::new();
        let cmd = post(
            business_id,
            "PO-7",
            vec![
                JournalEntryLine::debit(Account::inventory(), d(500)),
                JournalEntryLine::credit(Account::bank("BCA-001"), d(500)),
            ],
        );

        for ev in ledger.handle(&cmd).unwrap() {
            ledger.apply(&ev);
        }
        assert!(ledger.has_posted("PO-7"));
        assert!(ledger.handle(&cmd).unwrap().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Every posted entry nets to zero across its lines.
        #[test]
        fn debits_equal_credits_in_posted_events(
            amounts in prop::collection::vec(1i64..10_000_000i64, 1..10)
        ) {
            let business_id = BusinessId::new();
            let mut ledger = Ledger::empty(LedgerId::purchasing());
            let mut total = Decimal::ZERO;

            for (idx, amount) in amounts.into_iter().enumerate() {
                let cmd = post(
                    business_id,
                    &format!("PO-{idx}"),
                    vec![
                        JournalEntryLine::debit(Account::inventory(), d(amount)),
                        JournalEntryLine::credit(Account::accounts_payable(), d(amount)),
                    ],
                );
                for ev in ledger.handle(&cmd).unwrap() {
                    let LedgerEvent::JournalEntryPosted(je) = &ev;
                    for line in &je.lines {
                        if line.is_debit {
                            total += line.amount;
                        } else {
                            total -= line.amount;
                        }
                    }
                    ledger.apply(&ev);
                }
            }

            prop_assert_eq!(total, Decimal::ZERO);
        }
    }
}
