pub mod bag;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod merge;
pub mod net;
pub mod order;
pub mod policy;
pub mod sorted_diff;
pub mod spill_file;
mod store;

pub use bag::{BagKind, DefaultSpillBag, SpillBag};
pub use codec::{BincodeCodec, ElementCodec, SerdeCodec};
pub use config::SpillConfig;
pub use error::*;
pub use logging::init_tracing;
pub use merge::{MergeMode, MergeSequence};
pub use net::{DistinctSpillNet, NetRemainder};
pub use order::{Comparator, InsertionOrder, NaturalOrder, ReverseOrder};
pub use policy::{ByteThreshold, ConfiguredPolicy, CountThreshold, NeverSpill, ThresholdPolicy};
pub use sorted_diff::{sorted_difference, SortedDifference};
