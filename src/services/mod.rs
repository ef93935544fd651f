pub mod cost_estimate;

pub use cost_estimate::{estimate_job_cost, CostEstimate, UnitPricing};
