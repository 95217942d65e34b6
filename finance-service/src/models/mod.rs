//! Domain models for finance-service.

mod account;
mod audit;
mod booking;
mod closing;
mod commission;
mod expense;
mod operator_payment;
pub mod report;

pub use account::{
    AccountFilters, AccountType, BankTransfer, CreateAccountRequest, CreateTransferRequest,
    FinancialAccount, UpdateAccountRequest,
};
pub use audit::{AuditAction, AuditEntityType, CommissionAuditLog, NewAuditEntry};
pub use booking::{Booking, BookingTour};
pub use closing::{
    ClosingFilters, ClosingType, CloseCommissionsRequest, CloseOperatorPaymentsRequest,
    CommissionClosing, UndoClosingRequest, format_invoice_number,
};
pub use commission::{
    Commission, CommissionFilters, CommissionListRow, CommissionStatus, CommissionSummary,
    CommissionUniqueValues, DateFilterKind, TourOption, UpdateCommissionRequest,
    compute_commission_amount,
};
pub use expense::{
    CategoryBreakdown, CreateExpenseRequest, Expense, ExpenseCategory, ExpenseFilters,
    ExpensePaymentStatus, ExpenseSummary, ExpenseType, UpdateExpenseRequest,
};
pub use operator_payment::{
    LogisticStatus, OperatorFilters, OperatorPayment, OperatorPaymentListRow, OperatorSummary,
    OperatorUniqueValues, UpdateOperatorPaymentRequest, logistic_status_for_tour,
};
