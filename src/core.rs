pub mod aggregation;
pub mod bill;
pub mod calculator;
pub mod log;
pub mod month;
pub mod period;
pub mod schedule;
pub mod session;
pub mod splitter;
pub mod tariff;
