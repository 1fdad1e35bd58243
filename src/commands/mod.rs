pub mod age_audit;
pub mod batch;
pub mod report;
pub mod score;
