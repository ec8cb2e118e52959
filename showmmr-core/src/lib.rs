//! Core domain types shared by the showmmr crates.

mod calendar;
mod heroes;
mod mode;
mod record;

pub use calendar::{
    format_local, local_time, utc_time, CROWNFALL_EPOCH, LOCAL_DATE_FORMAT,
    PARTY_MMR_REMOVAL_EPOCH,
};
pub use heroes::{hero_name, HEROES};
pub use mode::SyncMode;
pub use record::{MatchId, MatchRecord, SchemaError, SchemaVariant};
