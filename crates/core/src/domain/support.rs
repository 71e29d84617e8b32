//! Read-only support records that handlers consult.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::query::CustomerId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAccount {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub service_plan_id: Option<String>,
    pub account_status: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub plan_id: String,
    pub name: String,
    pub monthly_cost: Decimal,
    pub data_limit_gb: Option<Decimal>,
    pub voice_minutes: Option<i64>,
    pub sms_count: Option<i64>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub plan_id: String,
    pub term_months: i64,
    pub early_termination_fee: Decimal,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub customer_id: CustomerId,
    pub billing_period_start: String,
    pub billing_period_end: String,
    pub data_used_gb: Decimal,
    pub voice_minutes_used: i64,
    pub sms_count_used: i64,
    pub additional_charges: Decimal,
    pub total_bill_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIncident {
    pub area: String,
    pub status: String,
    pub updated_at: String,
    pub details: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgePassage {
    pub document: String,
    pub topic: Option<String>,
    pub content: String,
    pub score: u32,
}

/// Everything the billing handler needs about one customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: CustomerAccount,
    pub plan: Option<ServicePlan>,
    pub contract: Option<ContractTerms>,
    pub usage: Vec<UsageRecord>,
}

impl AccountSnapshot {
    pub fn latest_usage(&self) -> Option<&UsageRecord> {
        self.usage.first()
    }
}
