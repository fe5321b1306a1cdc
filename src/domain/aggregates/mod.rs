//! Aggregates module
pub mod affiliate;
pub mod code;
pub mod order;
pub mod sms_verification;
pub mod store_credit;

pub use affiliate::{Affiliate, AffiliateCode, AffiliateSummary, AffiliateTransaction, Removal};
pub use code::{resolve, AffiliateCodeRecord, AffiliateStatus, Code, CodeKind, CodeRejection, DiscountCode};
pub use order::{AppliedCode, LineItem, Order, OrderDraft, OrderError, OrderRow, OrderStatus, PaymentConfirmation, PaymentMethod, ShippingInfo};
pub use sms_verification::{AttemptState, SmsError, SmsVerification, MAX_ATTEMPTS};
pub use store_credit::{BalanceAdjustment, LedgerError, StoreCreditTransaction, TransactionType};
