mod clean;
mod log;
mod run;
#[cfg(test)]
mod tests;
mod trec_eval;

pub use run::run;
