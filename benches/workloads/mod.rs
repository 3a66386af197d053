pub mod churn;
pub mod contention;
pub mod micro;
