//! Local transaction ledger

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Ledger entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Outgoing value transfer
    Payment,
    /// Incoming funds
    Deposit,
}

/// Ledger entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, EntryStatus::Pending)
    }

    /// Only Pending entries may move, and only forward
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (EntryStatus::Pending, EntryStatus::Completed) | (EntryStatus::Pending, EntryStatus::Failed)
        )
    }
}

/// A payment or deposit as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub kind: EntryKind,
    /// Amount in display currency
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub counterparty: Option<String>,
    pub status: EntryStatus,
    pub tx_hash: Option<String>,
}

impl LedgerEntry {
    /// A submitted payment
    pub fn payment(amount: Decimal, counterparty: Option<String>, tx_hash: String) -> Self {
        Self::new(EntryKind::Payment, amount, counterparty, EntryStatus::Completed, Some(tx_hash))
    }

    /// A deposit awaiting settlement
    pub fn deposit(amount: Decimal, counterparty: Option<String>, tx_hash: Option<String>) -> Self {
        Self::new(EntryKind::Deposit, amount, counterparty, EntryStatus::Pending, tx_hash)
    }

    fn new(
        kind: EntryKind,
        amount: Decimal,
        counterparty: Option<String>,
        status: EntryStatus,
        tx_hash: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            timestamp: Utc::now(),
            counterparty,
            status,
            tx_hash,
        }
    }
}

/// Quick stats over the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Completed payments
    pub total_spent: Decimal,
    /// Completed deposits
    pub total_deposited: Decimal,
    pub entry_count: usize,
    pub pending_count: usize,
}

/// Append-only record of entries, most recent first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: VecDeque<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, most recent first
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LedgerEntry> {
        self.entries.front()
    }

    pub fn get(&self, id: Uuid) -> Option<&LedgerEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn prepend(&mut self, entry: LedgerEntry) {
        self.entries.push_front(entry);
    }

    /// Move a Pending entry to a final status
    pub fn transition(&mut self, id: Uuid, next: EntryStatus) -> Result<&LedgerEntry> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| Error::Ledger(format!("no entry {}", id)))?;

        if !entry.status.can_transition_to(next) {
            return Err(Error::Ledger(format!(
                "entry {} cannot move from {:?} to {:?}",
                id, entry.status, next
            )));
        }
        entry.status = next;
        Ok(entry)
    }

    /// Totals saturate at the largest representable amount
    pub fn summary(&self) -> LedgerSummary {
        self.entries.iter().fold(LedgerSummary::default(), |mut summary, entry| {
            summary.entry_count += 1;
            match (entry.kind, entry.status) {
                (EntryKind::Payment, EntryStatus::Completed) => {
                    summary.total_spent = summary.total_spent.saturating_add(entry.amount)
                }
                (EntryKind::Deposit, EntryStatus::Completed) => {
                    summary.total_deposited = summary.total_deposited.saturating_add(entry.amount)
                }
                (_, EntryStatus::Pending) => summary.pending_count += 1,
                _ => {}
            }
            summary
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_first() {
        let mut ledger = Ledger::new();
        let first = LedgerEntry::payment(Decimal::from(100), Some("Tutor".to_string()), "0x01".to_string());
        let second = LedgerEntry::deposit(Decimal::from(50), None, None);
        ledger.prepend(first.clone());
        ledger.prepend(second.clone());

        let ids: Vec<Uuid> = ledger.entries().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(ledger.latest().map(|e| e.id), Some(second.id));
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let mut ledger = Ledger::new();
        let deposit = LedgerEntry::deposit(Decimal::from(50), None, None);
        let id = deposit.id;
        ledger.prepend(deposit);

        assert!(ledger.transition(id, EntryStatus::Pending).is_err());
        assert_eq!(ledger.transition(id, EntryStatus::Completed).unwrap().status, EntryStatus::Completed);
        assert!(ledger.transition(id, EntryStatus::Pending).is_err());
        assert!(ledger.transition(id, EntryStatus::Failed).is_err());
        assert_eq!(ledger.get(id).unwrap().status, EntryStatus::Completed);
    }

    #[test]
    fn test_completed_payment_is_final() {
        let mut ledger = Ledger::new();
        let payment = LedgerEntry::payment(Decimal::from(10), None, "0x02".to_string());
        let id = payment.id;
        ledger.prepend(payment);

        for next in [EntryStatus::Pending, EntryStatus::Completed, EntryStatus::Failed] {
            assert!(ledger.transition(id, next).is_err());
        }
        assert!(ledger.transition(Uuid::new_v4(), EntryStatus::Failed).is_err());
    }

    #[test]
    fn test_summary() {
        let mut ledger = Ledger::new();
        ledger.prepend(LedgerEntry::payment(Decimal::from(100), None, "0x01".to_string()));
        ledger.prepend(LedgerEntry::payment(Decimal::new(2550, 2), None, "0x02".to_string()));
        let deposit = LedgerEntry::deposit(Decimal::from(300), None, None);
        let deposit_id = deposit.id;
        ledger.prepend(deposit);
        ledger.prepend(LedgerEntry::deposit(Decimal::from(5), None, None));

        let summary = ledger.summary();
        assert_eq!(summary.total_spent, Decimal::new(12550, 2));
        assert_eq!(summary.total_deposited, Decimal::ZERO);
        assert_eq!(summary.pending_count, 2);

        ledger.transition(deposit_id, EntryStatus::Completed).unwrap();
        let summary = ledger.summary();
        assert_eq!(summary.total_deposited, Decimal::from(300));
        assert_eq!(summary.entry_count, 4);
        assert_eq!(summary.pending_count, 1);
    }

    #[test]
    fn test_summary_saturates() {
        let mut ledger = Ledger::new();
        ledger.prepend(LedgerEntry::payment(Decimal::MAX, None, "0x01".to_string()));
        ledger.prepend(LedgerEntry::payment(Decimal::MAX, None, "0x02".to_string()));

        let summary = ledger.summary();
        assert_eq!(summary.total_spent, Decimal::MAX);
        assert_eq!(summary.entry_count, 2);
    }
}
