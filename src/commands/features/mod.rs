mod criteria;
mod encode;
mod run;
mod schemes;

pub use run::run;
