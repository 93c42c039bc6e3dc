pub mod execution_engine;
pub mod quote_engine;
