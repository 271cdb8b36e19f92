pub mod fair_policy;
pub mod interval_policy;
