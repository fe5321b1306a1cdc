//! Application services. Each one owns a slice of the repositories and is
//! cheap to clone into request handlers.

pub mod affiliates;
pub mod code_validation;
pub mod notifications;
pub mod orders;
pub mod pending_payments;
pub mod sms_verification;
pub mod store_credit;

pub use affiliates::{AffiliateService, NewAffiliate};
pub use code_validation::{CodeValidation, CodeValidationService, ValidCode};
pub use notifications::{EventPublisher, LogMailer, LogSmsGateway, Mailer, SmsGateway};
pub use orders::{OrderOutcome, OrderService};
pub use pending_payments::{PendingPaymentService, StashedCheckout};
pub use sms_verification::{SmsVerificationService, SmsVerified};
pub use store_credit::StoreCreditLedger;
