pub mod convert;
pub mod evaluate;
pub mod features;
pub mod filter;
pub mod plot;
