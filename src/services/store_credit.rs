//! Store-credit ledger.
//!
//! The service never reads a balance to write it back; every mutation is a
//! single call to the store's atomic adjustment, attempted once.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info};
use uuid::Uuid;

use super::notifications::EventPublisher;
use crate::domain::aggregates::{BalanceAdjustment, StoreCreditTransaction};
use crate::domain::events::{DomainEvent, StoreCreditEvent};
use crate::repository::StoreCreditRepository;
use crate::Result;

/// Row cap for transaction history.
pub const TRANSACTION_HISTORY_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct StoreCreditLedger {
    repo: Arc<dyn StoreCreditRepository>,
    events: EventPublisher,
}

impl StoreCreditLedger {
    pub fn new(repo: Arc<dyn StoreCreditRepository>, events: EventPublisher) -> Self { Self { repo, events } }

    pub async fn adjust_balance(&self, adjustment: BalanceAdjustment) -> Result<Decimal> {
        let new_balance = match self.repo.adjust_balance(&adjustment).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(user_id = %adjustment.user_id, amount = %adjustment.amount, error = %e, "store credit adjustment failed");
                return Err(e.into());
            }
        };
        info!(
            user_id = %adjustment.user_id,
            amount = %adjustment.amount,
            transaction_type = adjustment.transaction_type.as_str(),
            %new_balance,
            "store credit adjusted"
        );
        self.events
            .publish(vec![DomainEvent::StoreCredit(StoreCreditEvent::Adjusted {
                user_id: adjustment.user_id,
                amount: adjustment.amount,
                transaction_type: adjustment.transaction_type,
                new_balance,
            })])
            .await;
        Ok(new_balance)
    }

    pub async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<StoreCreditTransaction>> {
        Ok(self.repo.list_transactions(user_id, TRANSACTION_HISTORY_LIMIT).await?)
    }
}
