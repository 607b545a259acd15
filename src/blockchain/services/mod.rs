pub mod contract;
pub mod fees;
pub mod token;
