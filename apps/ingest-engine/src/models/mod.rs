//! Core domain models for the ingest engine.
//!
//! These types define the normalized coin record, the raw audit copy of each
//! extracted item, and the ETL bookkeeping rows (checkpoints and run history).

mod coin;
mod etl;

pub use coin::{Coin, CoinFilter, CoinPage, NewCoin, RawItem, RawRecord};
pub use etl::{Checkpoint, CheckpointStatus, CheckpointView, RunRecord, RunStatus, SourceStats};
